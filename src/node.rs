use std::sync::{Arc, Weak};

use dashmap::DashMap;
use futures::stream::{self, StreamExt, TryStreamExt};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::error::{Error, Result};
use crate::events::LavalinkEvent;
use crate::model::{
    ChannelId, GuildId, LoadType, Penalty, Playlist, Severity, Stats, Track, TrackInfo, UserId,
};
use crate::player::Player;
use crate::pool::PoolInner;
use crate::socket::{NodeSocket, SocketState};
use crate::voice::VoiceProvider;

/// Máximo de decodificaciones REST simultáneas por lote
const DECODE_CONCURRENCY: usize = 8;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadResponse {
    load_type: LoadType,
    #[serde(default)]
    tracks: Vec<TrackData>,
    #[serde(default)]
    playlist_info: Option<PlaylistInfo>,
    #[serde(default)]
    exception: Option<LoadException>,
}

#[derive(Debug, Deserialize)]
struct TrackData {
    track: String,
    info: TrackInfo,
}

impl TrackData {
    fn into_track(self, requester: UserId) -> Track {
        Track {
            id: self.track,
            info: self.info,
            requester,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistInfo {
    #[serde(default)]
    name: String,
    #[serde(default = "no_selected_track")]
    selected_track: i64,
}

fn no_selected_track() -> i64 {
    -1
}

impl Default for PlaylistInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            selected_track: -1,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct LoadException {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    severity: Option<Severity>,
}

/// Resultado tipado del endpoint `loadtracks`
#[derive(Debug, Clone)]
pub enum LoadedTracks {
    TrackLoaded(Track),
    Playlist(Playlist),
    SearchResult(Vec<Track>),
    NoMatches,
}

/// Un servidor Lavalink remoto: credenciales, canal de control, estadísticas
/// vivas y las sesiones que tiene asignadas.
///
/// La penalidad derivada se recalcula con cada frame `stats`; un nodo que
/// todavía no reportó estadísticas tiene penalidad infinita (nunca se
/// prefiere sobre uno con datos reales, pero sigue siendo elegible si es el
/// único).
pub struct Node {
    config: NodeConfig,
    socket: Arc<NodeSocket>,
    stats: RwLock<Option<(Stats, f64)>>,
    players: DashMap<GuildId, Arc<Player>>,
    http: reqwest::Client,
    events: UnboundedSender<LavalinkEvent>,
    pool: Weak<PoolInner>,
    voice: Arc<dyn VoiceProvider>,
}

impl Node {
    pub(crate) fn new(
        config: NodeConfig,
        user_id: UserId,
        events: UnboundedSender<LavalinkEvent>,
        pool: Weak<PoolInner>,
        voice: Arc<dyn VoiceProvider>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            socket: Arc::new(NodeSocket::new(weak.clone(), user_id)),
            stats: RwLock::new(None),
            players: DashMap::new(),
            http: reqwest::Client::new(),
            events,
            pool,
            voice,
            config,
        })
    }

    pub fn identifier(&self) -> &str {
        &self.config.identifier
    }

    pub fn region(&self) -> Option<&str> {
        self.config.region.as_deref()
    }

    pub(crate) fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_connected()
    }

    pub fn state(&self) -> SocketState {
        self.socket.state()
    }

    /// Arranca la conexión del canal de control en segundo plano
    pub(crate) fn connect(&self) {
        self.socket.connect();
    }

    /// Penalidad de balanceo actual; infinita sin estadísticas
    pub fn penalty(&self) -> f64 {
        self.stats
            .read()
            .as_ref()
            .map(|(_, penalty)| *penalty)
            .unwrap_or(f64::INFINITY)
    }

    /// Última instantánea de estadísticas reportada por el nodo
    pub fn stats(&self) -> Option<Stats> {
        self.stats.read().as_ref().map(|(stats, _)| stats.clone())
    }

    /// Reemplaza la instantánea completa y recalcula la penalidad en caché
    pub(crate) fn update_stats(&self, stats: Stats) {
        let penalty = Penalty::from_stats(&stats).total;
        debug!(
            "📊 Stats del nodo <{}>: {} reproduciendo, penalidad {:.2}",
            self.identifier(),
            stats.playing_players,
            penalty
        );
        *self.stats.write() = Some((stats, penalty));
    }

    pub(crate) fn dispatch(&self, event: LavalinkEvent) {
        // el receptor puede haberse soltado; no es un error nuestro
        let _ = self.events.send(event);
    }

    pub(crate) async fn send(&self, payload: Value) {
        self.socket.send(payload).await;
    }

    /// Crea y registra la sesión de un guild en este nodo.
    ///
    /// Precondición: a lo sumo una sesión por guild. Una segunda llamada sin
    /// destruir la anterior la pisa (last write wins); el llamador debe
    /// destruir la sesión previa primero.
    pub fn create_player(self: &Arc<Self>, guild_id: GuildId, channel_id: ChannelId) -> Arc<Player> {
        let player = Player::new(
            guild_id,
            channel_id,
            Arc::downgrade(self),
            Arc::clone(&self.voice),
        );
        self.players.insert(guild_id, Arc::clone(&player));
        info!(
            "🎧 Sesión creada para guild {} en el nodo <{}>",
            guild_id,
            self.identifier()
        );
        player
    }

    pub fn get_player(&self, guild_id: GuildId) -> Option<Arc<Player>> {
        self.players.get(&guild_id).map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn remove_player(&self, guild_id: GuildId) -> Option<Arc<Player>> {
        self.players.remove(&guild_id).map(|(_, player)| player)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Desmantela el nodo: desconecta cada sesión (mejor esfuerzo, los
    /// errores se registran), cierra el canal de control y se da de baja del
    /// pool. Es el único camino soportado para retirar un nodo.
    pub async fn disconnect(&self) {
        let players: Vec<Arc<Player>> = self
            .players
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for player in players {
            if let Err(e) = player.disconnect().await {
                warn!(
                    "Error al desconectar la sesión de {}: {}",
                    player.guild_id(),
                    e
                );
            }
        }
        self.players.clear();

        self.socket.close().await;

        if let Some(pool) = self.pool.upgrade() {
            pool.remove_node(self.identifier());
        }
        info!("👋 Nodo <{}> retirado del pool", self.identifier());
    }

    fn rest_endpoint(&self, endpoint: &str) -> String {
        format!("{}/{}", self.config.http_url(), endpoint)
    }

    /// Consulta `loadtracks` y clasifica la respuesta por su load type.
    ///
    /// `LOAD_FAILED` se devuelve como error tipado con la severidad del
    /// servidor; `NO_MATCHES` no es un error.
    pub async fn load_tracks(&self, query: &str, requester: UserId) -> Result<LoadedTracks> {
        debug!("🔍 loadtracks en <{}>: {}", self.identifier(), query);
        let response = self
            .http
            .get(self.rest_endpoint("loadtracks"))
            .header("Authorization", &self.config.password)
            .query(&[("identifier", query)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::InvalidResponse(format!(
                "loadtracks devolvió {}",
                response.status()
            )));
        }

        let result: LoadResponse = response.json().await?;
        match result.load_type {
            LoadType::LoadFailed => {
                let exception = result.exception.unwrap_or_default();
                Err(Error::LoadFailed {
                    severity: exception.severity.unwrap_or(Severity::Common),
                    message: exception
                        .message
                        .unwrap_or_else(|| "el servidor no informó detalle".into()),
                })
            }
            LoadType::NoMatches => Ok(LoadedTracks::NoMatches),
            LoadType::TrackLoaded => {
                let track = result
                    .tracks
                    .into_iter()
                    .next()
                    .map(|data| data.into_track(requester))
                    .ok_or_else(|| Error::InvalidResponse("TRACK_LOADED sin pistas".into()))?;
                Ok(LoadedTracks::TrackLoaded(track))
            }
            LoadType::SearchResult => Ok(LoadedTracks::SearchResult(
                result
                    .tracks
                    .into_iter()
                    .map(|data| data.into_track(requester))
                    .collect(),
            )),
            LoadType::PlaylistLoaded => {
                let info = result.playlist_info.unwrap_or_default();
                Ok(LoadedTracks::Playlist(Playlist {
                    name: info.name,
                    selected_track: info.selected_track,
                    tracks: result
                        .tracks
                        .into_iter()
                        .map(|data| data.into_track(requester))
                        .collect(),
                    requester,
                }))
            }
        }
    }

    /// Reconstruye una pista desde su identificador opaco (`decodetrack`)
    pub async fn decode_track(&self, identifier: &str, requester: UserId) -> Result<Track> {
        let response = self
            .http
            .get(self.rest_endpoint("decodetrack"))
            .header("Authorization", &self.config.password)
            .query(&[("track", identifier)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::InvalidResponse(format!(
                "decodetrack devolvió {}",
                response.status()
            )));
        }

        let info: TrackInfo = response.json().await?;
        Ok(Track {
            id: identifier.to_string(),
            info,
            requester,
        })
    }

    /// Decodifica un lote de identificadores con fan-out acotado
    /// ([`DECODE_CONCURRENCY`]) y un punto de unión explícito; el resultado
    /// respeta el orden de entrada.
    pub async fn decode_tracks(
        &self,
        identifiers: &[String],
        requester: UserId,
    ) -> Result<Vec<Track>> {
        stream::iter(identifiers.iter().map(String::as_str))
            .map(|identifier| self.decode_track(identifier, requester))
            .buffered(DECODE_CONCURRENCY)
            .try_collect()
            .await
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("identifier", &self.config.identifier)
            .field("region", &self.config.region)
            .field("players", &self.players.len())
            .field("penalty", &self.penalty())
            .finish()
    }
}
