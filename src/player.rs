use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard, RwLock};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::filters::Filters;
use crate::model::{ChannelId, GuildId, PlayerState, Track};
use crate::node::Node;
use crate::queue::MusicQueue;
use crate::voice::VoiceProvider;

const MAX_VOLUME: u32 = 1000;

/// Datos del handshake de voz; el `voiceUpdate` se envía recién cuando las
/// dos mitades (estado y servidor) llegaron
#[derive(Debug, Default)]
struct VoiceServer {
    session_id: Option<String>,
    token: Option<String>,
    endpoint: Option<String>,
}

/// Sesión de reproducción de un guild, anclada al nodo que la creó.
///
/// Las órdenes al servidor son fire-and-forget: si el nodo está desconectado
/// o ya fue soltado, la orden se descarta con un log de debug y el estado
/// local queda como intención a reconciliar cuando vuelva el control.
pub struct Player {
    guild_id: GuildId,
    channel_id: RwLock<ChannelId>,
    node: Weak<Node>,
    voice: Arc<dyn VoiceProvider>,
    queue: Mutex<MusicQueue>,
    current: RwLock<Option<Track>>,
    state: RwLock<PlayerState>,
    voice_server: RwLock<VoiceServer>,
    volume: AtomicU32,
    paused: AtomicBool,
    playing: AtomicBool,
    destroyed: AtomicBool,
}

impl Player {
    pub(crate) fn new(
        guild_id: GuildId,
        channel_id: ChannelId,
        node: Weak<Node>,
        voice: Arc<dyn VoiceProvider>,
    ) -> Arc<Self> {
        Arc::new(Self {
            guild_id,
            channel_id: RwLock::new(channel_id),
            node,
            voice,
            queue: Mutex::new(MusicQueue::default()),
            current: RwLock::new(None),
            state: RwLock::new(PlayerState::null()),
            voice_server: RwLock::new(VoiceServer::default()),
            volume: AtomicU32::new(100),
            paused: AtomicBool::new(false),
            playing: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn channel_id(&self) -> ChannelId {
        *self.channel_id.read()
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn volume(&self) -> u32 {
        self.volume.load(Ordering::Acquire)
    }

    /// Posición estimada según el último `playerUpdate` recibido
    pub fn position(&self) -> std::time::Duration {
        self.state.read().position()
    }

    pub fn current_track(&self) -> Option<Track> {
        self.current.read().clone()
    }

    /// Acceso exclusivo a la cola de la sesión
    pub fn queue(&self) -> MutexGuard<'_, MusicQueue> {
        self.queue.lock()
    }

    fn node(&self) -> Option<Arc<Node>> {
        self.node.upgrade()
    }

    async fn send(&self, payload: serde_json::Value) {
        if self.destroyed.load(Ordering::Acquire) {
            debug!("🔌 Sesión de {} ya destruida, orden descartada", self.guild_id);
            return;
        }
        match self.node() {
            Some(node) => node.send(payload).await,
            None => debug!(
                "🔌 El nodo de la sesión de {} ya no existe, orden descartada",
                self.guild_id
            ),
        }
    }

    /// Entra al canal de voz de la sesión a través del proveedor de voz
    pub async fn connect(&self, self_deaf: bool) -> Result<()> {
        let channel_id = self.channel_id();
        self.voice
            .update_voice_state(self.guild_id, Some(channel_id), self_deaf)
            .await
    }

    /// Sale del canal de voz; no destruye la sesión
    pub async fn disconnect(&self) -> Result<()> {
        self.voice
            .update_voice_state(self.guild_id, None, false)
            .await
    }

    /// Pide moverse a otro canal de voz del mismo guild
    pub async fn move_to(&self, channel_id: ChannelId, self_deaf: bool) -> Result<()> {
        *self.channel_id.write() = channel_id;
        self.voice
            .update_voice_state(self.guild_id, Some(channel_id), self_deaf)
            .await
    }

    /// Pide al servidor reproducir una pista y la devuelve ya registrada
    /// como actual.
    ///
    /// Con `replace` en falso y algo ya sonando la llamada es un no-op que
    /// devuelve `None`; la pista en curso nunca se pisa por accidente.
    pub async fn play(&self, track: Track, replace: bool) -> Result<Option<Track>> {
        self.play_at(track, replace, 0, 0).await
    }

    /// Como [`play`](Self::play) pero con recorte: empieza en `start_ms` y,
    /// si `end_ms` no es cero, corta ahí
    pub async fn play_at(
        &self,
        track: Track,
        replace: bool,
        start_ms: u64,
        end_ms: u64,
    ) -> Result<Option<Track>> {
        if self.is_playing() && !replace {
            debug!(
                "⏭️ {} ya está reproduciendo y replace=false, se ignora",
                self.guild_id
            );
            return Ok(None);
        }

        let mut payload = json!({
            "op": "play",
            "guildId": self.guild_id.to_string(),
            "track": track.id,
            "noReplace": !replace,
            "startTime": start_ms,
        });
        if end_ms > 0 {
            payload["endTime"] = json!(end_ms);
        }
        self.send(payload).await;

        info!("▶️ Reproduciendo '{}' en {}", track, self.guild_id);
        *self.current.write() = Some(track.clone());
        self.playing.store(true, Ordering::Release);
        self.paused.store(false, Ordering::Release);
        Ok(Some(track))
    }

    /// Saca la próxima pista de la cola (según el modo de repetición) y la
    /// reproduce; con la cola agotada devuelve `None` y apaga la sesión
    pub async fn play_next(&self) -> Result<Option<Track>> {
        let next = {
            let mut queue = self.queue.lock();
            match queue.next_track() {
                Ok(track) => track,
                Err(crate::error::Error::QueueEmpty) => {
                    drop(queue);
                    self.playing.store(false, Ordering::Release);
                    *self.current.write() = None;
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        };
        self.play(next, true).await
    }

    /// Detiene la reproducción sin tocar la cola
    pub async fn stop(&self) -> Result<()> {
        self.send(json!({
            "op": "stop",
            "guildId": self.guild_id.to_string(),
        }))
        .await;
        *self.current.write() = None;
        self.playing.store(false, Ordering::Release);
        Ok(())
    }

    pub async fn set_pause(&self, pause: bool) -> Result<()> {
        self.send(json!({
            "op": "pause",
            "guildId": self.guild_id.to_string(),
            "pause": pause,
        }))
        .await;
        self.paused.store(pause, Ordering::Release);
        Ok(())
    }

    /// No hace nada si ya está en pausa
    pub async fn pause(&self) -> Result<()> {
        if self.is_paused() {
            return Ok(());
        }
        self.set_pause(true).await
    }

    /// No hace nada si ya está reproduciendo
    pub async fn resume(&self) -> Result<()> {
        if !self.is_paused() {
            return Ok(());
        }
        self.set_pause(false).await
    }

    /// Ajusta el volumen; el servidor acepta hasta 1000
    pub async fn set_volume(&self, volume: u32) -> Result<()> {
        let volume = volume.min(MAX_VOLUME);
        self.send(json!({
            "op": "volume",
            "guildId": self.guild_id.to_string(),
            "volume": volume,
        }))
        .await;
        self.volume.store(volume, Ordering::Release);
        Ok(())
    }

    /// Salta a una posición en milisegundos.
    ///
    /// La posición local no se toca: la próxima actualización de estado del
    /// servidor es la que confirma dónde quedó la reproducción.
    pub async fn seek(&self, position_ms: u64) -> Result<()> {
        self.send(json!({
            "op": "seek",
            "guildId": self.guild_id.to_string(),
            "position": position_ms,
        }))
        .await;
        Ok(())
    }

    /// Aplica la cadena de filtros completa (lo no incluido se resetea)
    pub async fn set_filters(&self, filters: &Filters) -> Result<()> {
        self.send(filters.to_payload(self.guild_id)).await;
        Ok(())
    }

    /// Destruye la sesión: avisa al servidor, se da de baja del nodo y sale
    /// del canal de voz. Idempotente; los errores de voz se registran pero
    /// no frenan el desmantelamiento.
    pub async fn destroy(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if let Some(node) = self.node() {
            node.send(json!({
                "op": "destroy",
                "guildId": self.guild_id.to_string(),
            }))
            .await;
            node.remove_player(self.guild_id);
        }

        if let Err(e) = self.disconnect().await {
            warn!("Error al salir del canal de voz de {}: {}", self.guild_id, e);
        }

        *self.current.write() = None;
        self.playing.store(false, Ordering::Release);
        info!("🗑️ Sesión de {} destruida", self.guild_id);
        Ok(())
    }

    /// El servidor reporta periódicamente tiempo y posición; se reemplaza la
    /// instantánea entera
    pub(crate) fn update_state(&self, state: PlayerState) {
        *self.state.write() = state;
    }

    /// La pista en curso terminó según el servidor
    pub(crate) fn clear_current(&self) {
        *self.current.write() = None;
        self.playing.store(false, Ordering::Release);
    }

    /// Mitad "estado" del handshake de voz
    pub(crate) fn set_voice_state(&self, channel_id: ChannelId, session_id: &str) {
        *self.channel_id.write() = channel_id;
        self.voice_server.write().session_id = Some(session_id.to_string());
    }

    /// Mitad "servidor" del handshake de voz; con las dos mitades presentes
    /// reenvía el `voiceUpdate` al nodo
    pub async fn voice_server_update(&self, token: &str, endpoint: Option<&str>) -> Result<()> {
        let payload = {
            let mut voice = self.voice_server.write();
            voice.token = Some(token.to_string());
            voice.endpoint = endpoint.map(|e| normalize_endpoint(e).to_string());

            match (&voice.session_id, &voice.token, &voice.endpoint) {
                (Some(session_id), Some(token), Some(endpoint)) => Some(json!({
                    "op": "voiceUpdate",
                    "guildId": self.guild_id.to_string(),
                    "sessionId": session_id,
                    "event": {
                        "token": token,
                        "guild_id": self.guild_id.to_string(),
                        "endpoint": endpoint,
                    },
                })),
                _ => None,
            }
        };

        if let Some(payload) = payload {
            debug!("🎙️ voiceUpdate completo para {}", self.guild_id);
            self.send(payload).await;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("guild_id", &self.guild_id)
            .field("playing", &self.is_playing())
            .field("paused", &self.is_paused())
            .field("volume", &self.volume())
            .finish()
    }
}

/// El gateway manda el endpoint con esquema; Lavalink lo quiere pelado
fn normalize_endpoint(endpoint: &str) -> &str {
    endpoint.strip_prefix("wss://").unwrap_or(endpoint)
}
