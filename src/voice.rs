use async_trait::async_trait;

use crate::error::Result;
use crate::model::{ChannelId, GuildId};

/// Interfaz hacia el framework de voz externo (el gateway del bot).
///
/// La librería solo emite solicitudes de unirse/mover/abandonar; el framework
/// confirma después los cambios reales con sus propias notificaciones, que se
/// reinyectan por [`NodePool::voice_state_update`](crate::pool::NodePool::voice_state_update)
/// y [`NodePool::voice_server_update`](crate::pool::NodePool::voice_server_update).
#[async_trait]
pub trait VoiceProvider: Send + Sync {
    /// Solicita unirse o moverse a un canal (`Some`) o abandonar la voz
    /// (`None`) en el guild dado.
    async fn update_voice_state(
        &self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
        self_deaf: bool,
    ) -> Result<()>;
}

/// Proveedor que no hace nada; útil en tests y para usar la librería sin
/// conexión de voz real.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullVoiceProvider;

#[async_trait]
impl VoiceProvider for NullVoiceProvider {
    async fn update_voice_state(
        &self,
        _guild_id: GuildId,
        _channel_id: Option<ChannelId>,
        _self_deaf: bool,
    ) -> Result<()> {
        Ok(())
    }
}
