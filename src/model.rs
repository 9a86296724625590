use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Identificador de un guild de Discord
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuildId(pub u64);

/// Identificador de un canal de voz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

/// Identificador del usuario que solicitó una pista
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for GuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for GuildId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<u64> for ChannelId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<u64> for UserId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Modo de repetición de la cola
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepeatMode {
    #[default]
    Off,
    One,
    All,
}

/// Severidad reportada por el servidor cuando una pista falla
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Common,
    Suspicious,
    Fault,
}

/// Discriminador de la respuesta del endpoint `loadtracks`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadType {
    TrackLoaded,
    PlaylistLoaded,
    SearchResult,
    NoMatches,
    LoadFailed,
}

/// Metadata de una pista tal como la entrega el servidor
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub identifier: String,
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    /// Duración en milisegundos
    pub length: u64,
    #[serde(default)]
    pub is_seekable: bool,
    #[serde(default)]
    pub is_stream: bool,
    #[serde(default)]
    pub position: u64,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub source_name: Option<String>,
}

/// Una pista reproducible.
///
/// El campo `id` es el blob opaco (base64) que emite el servidor y que hace
/// falta para reanudar la reproducción del lado del servidor. La igualdad se
/// define únicamente por ese identificador.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: String,
    pub info: TrackInfo,
    pub requester: UserId,
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Track {}

impl Track {
    /// Duración de la pista; `None` si es una transmisión en vivo
    pub fn duration(&self) -> Option<Duration> {
        if self.info.is_stream {
            None
        } else {
            Some(Duration::from_millis(self.info.length))
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.info.author {
            Some(author) => write!(f, "{} - {}", self.info.title, author),
            None => write!(f, "{}", self.info.title),
        }
    }
}

/// Lista de reproducción cargada desde el servidor
#[derive(Debug, Clone)]
pub struct Playlist {
    pub name: String,
    pub selected_track: i64,
    pub tracks: Vec<Track>,
    pub requester: UserId,
}

impl Playlist {
    /// Duración total de la lista; `None` si contiene alguna transmisión en vivo
    pub fn duration(&self) -> Option<Duration> {
        self.tracks
            .iter()
            .map(Track::duration)
            .try_fold(Duration::ZERO, |acc, d| d.map(|d| acc + d))
    }
}

/// Último estado de reproducción reportado por el servidor en `playerUpdate`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    /// Epoch en milisegundos
    #[serde(default)]
    pub time: i64,
    /// Posición en milisegundos
    #[serde(default)]
    pub position: u64,
    #[serde(default)]
    pub connected: bool,
}

impl PlayerState {
    /// Estado "nulo" usado antes del primer `playerUpdate`
    pub fn null() -> Self {
        Self {
            time: 0,
            position: 0,
            connected: false,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.time)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn position(&self) -> Duration {
        Duration::from_millis(self.position)
    }
}

impl Default for PlayerState {
    fn default() -> Self {
        Self::null()
    }
}

/// Estadísticas de memoria del nodo
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub free: u64,
    pub used: u64,
    pub allocated: u64,
    pub reservable: u64,
}

/// Estadísticas de CPU del nodo
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuStats {
    pub cores: u32,
    pub system_load: f64,
    pub lavalink_load: f64,
}

fn frame_not_reported() -> i64 {
    -1
}

/// Contadores de frames de audio; `-1` significa "no reportado"
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameStats {
    #[serde(default = "frame_not_reported")]
    pub sent: i64,
    #[serde(default = "frame_not_reported")]
    pub nulled: i64,
    #[serde(default = "frame_not_reported")]
    pub deficit: i64,
}

/// Instantánea de estadísticas de un nodo.
///
/// Se reemplaza completa con cada frame `stats` entrante; nunca se muta
/// parcialmente.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub uptime: u64,
    pub players: u32,
    pub playing_players: u32,
    pub memory: MemoryStats,
    pub cpu: CpuStats,
    #[serde(default)]
    pub frame_stats: Option<FrameStats>,
}

impl Stats {
    pub fn frames_sent(&self) -> i64 {
        self.frame_stats.as_ref().map_or(-1, |f| f.sent)
    }

    pub fn frames_nulled(&self) -> i64 {
        self.frame_stats.as_ref().map_or(-1, |f| f.nulled)
    }

    pub fn frames_deficit(&self) -> i64 {
        self.frame_stats.as_ref().map_or(-1, |f| f.deficit)
    }

    pub fn penalty(&self) -> Penalty {
        Penalty::from_stats(self)
    }
}

/// Puntuación de carga derivada de una instantánea de [`Stats`].
///
/// La fórmula debe coincidir exactamente con la del balanceador de Lavalink
/// para que la selección de nodo sea interoperable con otros clientes.
#[derive(Debug, Clone, Copy)]
pub struct Penalty {
    pub player_penalty: f64,
    pub cpu_penalty: f64,
    pub null_frame_penalty: f64,
    pub deficit_frame_penalty: f64,
    pub total: f64,
}

impl Penalty {
    pub fn from_stats(stats: &Stats) -> Self {
        let player_penalty = f64::from(stats.playing_players);
        let cpu_penalty = 1.05_f64.powf(100.0 * stats.cpu.system_load) * 10.0 - 10.0;

        let mut null_frame_penalty = 0.0;
        if stats.frames_nulled() != -1 {
            null_frame_penalty =
                (1.03_f64.powf(500.0 * (stats.frames_nulled() as f64 / 3000.0)) * 300.0 - 300.0)
                    * 2.0;
        }

        let mut deficit_frame_penalty = 0.0;
        if stats.frames_deficit() != -1 {
            deficit_frame_penalty =
                1.03_f64.powf(500.0 * (stats.frames_deficit() as f64 / 3000.0)) * 600.0 - 600.0;
        }

        let total = player_penalty + cpu_penalty + null_frame_penalty + deficit_frame_penalty;

        Self {
            player_penalty,
            cpu_penalty,
            null_frame_penalty,
            deficit_frame_penalty,
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stats(playing: u32, load: f64, nulled: i64, deficit: i64) -> Stats {
        Stats {
            uptime: 60_000,
            players: playing + 1,
            playing_players: playing,
            memory: MemoryStats {
                free: 512,
                used: 256,
                allocated: 1024,
                reservable: 2048,
            },
            cpu: CpuStats {
                cores: 4,
                system_load: load,
                lavalink_load: load / 2.0,
            },
            frame_stats: if nulled == -1 && deficit == -1 {
                None
            } else {
                Some(FrameStats {
                    sent: 3000,
                    nulled,
                    deficit,
                })
            },
        }
    }

    #[test]
    fn penalty_idle_node_is_zero() {
        let penalty = stats(0, 0.0, -1, -1).penalty();
        assert!(penalty.total.abs() < f64::EPSILON);
    }

    #[test]
    fn penalty_without_frame_stats_depends_only_on_players_and_load() {
        let penalty = stats(3, 0.25, -1, -1).penalty();
        let expected = 3.0 + (1.05_f64.powf(25.0) * 10.0 - 10.0);
        assert!((penalty.total - expected).abs() < 1e-9);
        assert_eq!(penalty.null_frame_penalty, 0.0);
        assert_eq!(penalty.deficit_frame_penalty, 0.0);
    }

    #[test]
    fn penalty_counts_nulled_frames_double() {
        let penalty = stats(0, 0.0, 300, -1).penalty();
        let expected = (1.03_f64.powf(500.0 * (300.0 / 3000.0)) * 300.0 - 300.0) * 2.0;
        assert!((penalty.null_frame_penalty - expected).abs() < 1e-9);
        assert!((penalty.total - expected).abs() < 1e-9);
    }

    #[test]
    fn stats_frame_fields_default_to_not_reported() {
        let parsed: Stats = serde_json::from_str(
            r#"{
                "uptime": 1000,
                "players": 2,
                "playingPlayers": 1,
                "memory": {"free": 1, "used": 2, "allocated": 3, "reservable": 4},
                "cpu": {"cores": 8, "systemLoad": 0.1, "lavalinkLoad": 0.05}
            }"#,
        )
        .expect("stats sin frameStats debe parsear");

        assert_eq!(parsed.frames_sent(), -1);
        assert_eq!(parsed.frames_nulled(), -1);
        assert_eq!(parsed.frames_deficit(), -1);
    }

    #[test]
    fn track_equality_is_by_opaque_id() {
        let info = TrackInfo {
            identifier: "abc".into(),
            title: "Una canción".into(),
            author: Some("Alguien".into()),
            length: 180_000,
            is_seekable: true,
            is_stream: false,
            position: 0,
            uri: None,
            source_name: Some("youtube".into()),
        };
        let a = Track {
            id: "QAAA1".into(),
            info: info.clone(),
            requester: UserId(1),
        };
        let mut b = a.clone();
        b.requester = UserId(2);
        b.info.title = "Otro título".into();
        assert_eq!(a, b);
    }
}
