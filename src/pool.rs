use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

use crate::config::NodeConfig;
use crate::error::{Error, Result};
use crate::events::LavalinkEvent;
use crate::model::{ChannelId, GuildId, UserId};
use crate::node::Node;
use crate::player::Player;
use crate::voice::{NullVoiceProvider, VoiceProvider};

/// Conjunto de nodos Lavalink con enrutamiento por carga.
///
/// El pool es dueño de sus nodos y del canal de eventos: crear un pool
/// devuelve también el receptor por el que llegan todos los eventos de todos
/// los nodos, en el orden en que cada nodo los produjo.
pub struct NodePool {
    inner: Arc<PoolInner>,
}

pub(crate) struct PoolInner {
    nodes: DashMap<String, Arc<Node>>,
    user_id: UserId,
    events: UnboundedSender<LavalinkEvent>,
    voice: Arc<dyn VoiceProvider>,
}

impl PoolInner {
    pub(crate) fn remove_node(&self, identifier: &str) {
        if self.nodes.remove(identifier).is_some() {
            debug!("🗑️ Nodo <{}> eliminado del registro", identifier);
        }
    }
}

impl NodePool {
    /// Crea un pool vacío junto con el receptor de eventos
    pub fn new(
        user_id: UserId,
        voice: Arc<dyn VoiceProvider>,
    ) -> (Self, UnboundedReceiver<LavalinkEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let pool = Self {
            inner: Arc::new(PoolInner {
                nodes: DashMap::new(),
                user_id,
                events,
                voice,
            }),
        };
        (pool, receiver)
    }

    /// Pool sin integración de voz, útil cuando solo interesa el plano REST
    pub fn without_voice(user_id: UserId) -> (Self, UnboundedReceiver<LavalinkEvent>) {
        Self::new(user_id, Arc::new(NullVoiceProvider))
    }

    /// Registra un nodo nuevo y arranca su conexión en segundo plano.
    ///
    /// El identificador debe ser único dentro del pool; reutilizarlo es un
    /// error, no un reemplazo.
    pub fn create_node(&self, config: NodeConfig) -> Result<Arc<Node>> {
        match self.inner.nodes.entry(config.identifier.clone()) {
            Entry::Occupied(entry) => Err(Error::NodeOccupied(entry.key().clone())),
            Entry::Vacant(slot) => {
                info!(
                    "🆕 Nodo <{}> registrado en el pool ({}:{})",
                    config.identifier, config.host, config.port
                );
                let node = Node::new(
                    config,
                    self.inner.user_id,
                    self.inner.events.clone(),
                    Arc::downgrade(&self.inner),
                    Arc::clone(&self.inner.voice),
                );
                node.connect();
                slot.insert(Arc::clone(&node));
                Ok(node)
            }
        }
    }

    /// Busca un nodo por identificador exacto
    pub fn node(&self, identifier: &str) -> Result<Arc<Node>> {
        self.inner
            .nodes
            .get(identifier)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::NoMatchingNode(identifier.to_string()))
    }

    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.inner
            .nodes
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.inner.nodes.len()
    }

    /// Elige el nodo registrado con menor penalidad de balanceo.
    ///
    /// A igual penalidad desempata por identificador, así la elección es
    /// determinista entre llamadas. Un nodo sin estadísticas (penalidad
    /// infinita) sigue siendo elegible: con un solo nodo registrado siempre
    /// se devuelve ese, aunque todavía esté completando el handshake.
    pub fn select(&self) -> Result<Arc<Node>> {
        best(self.nodes()).ok_or(Error::ZeroConnectedNodes)
    }

    /// Como [`select`](Self::select) pero restringido a los nodos de una
    /// región
    pub fn node_by_region(&self, region: &str) -> Result<Arc<Node>> {
        let regional: Vec<Arc<Node>> = self
            .nodes()
            .into_iter()
            .filter(|node| node.region() == Some(region))
            .collect();
        best(regional).ok_or(Error::ZeroConnectedNodes)
    }

    /// Busca la sesión de un guild en cualquier nodo del pool
    pub fn player(&self, guild_id: GuildId) -> Option<Arc<Player>> {
        self.inner
            .nodes
            .iter()
            .find_map(|entry| entry.value().get_player(guild_id))
    }

    /// Devuelve la sesión existente del guild o crea una en el mejor nodo
    pub fn create_player(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<Player>> {
        if let Some(player) = self.player(guild_id) {
            return Ok(player);
        }
        let node = self.select()?;
        Ok(node.create_player(guild_id, channel_id))
    }

    /// Reenvía una actualización de estado de voz a la sesión del guild.
    ///
    /// Un `channel_id` vacío significa que el bot salió del canal: la sesión
    /// se destruye en vez de quedar huérfana.
    pub async fn voice_state_update(
        &self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
        session_id: &str,
    ) -> Result<()> {
        let Some(player) = self.player(guild_id) else {
            return Ok(());
        };
        match channel_id {
            Some(channel_id) => {
                player.set_voice_state(channel_id, session_id);
                Ok(())
            }
            None => player.destroy().await,
        }
    }

    /// Reenvía los datos del servidor de voz a la sesión del guild
    pub async fn voice_server_update(
        &self,
        guild_id: GuildId,
        token: &str,
        endpoint: Option<&str>,
    ) -> Result<()> {
        if let Some(player) = self.player(guild_id) {
            player.voice_server_update(token, endpoint).await?;
        }
        Ok(())
    }

    /// Retira todos los nodos, cerrando sus sesiones y conexiones
    pub async fn disconnect_all(&self) {
        for node in self.nodes() {
            node.disconnect().await;
        }
    }
}

impl std::fmt::Debug for NodePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodePool")
            .field("nodes", &self.inner.nodes.len())
            .finish()
    }
}

/// Mínimo por `(penalidad, identificador)`; `total_cmp` ordena bien los
/// infinitos de los nodos sin estadísticas
fn best(candidates: Vec<Arc<Node>>) -> Option<Arc<Node>> {
    candidates.into_iter().min_by(|a, b| {
        a.penalty()
            .total_cmp(&b.penalty())
            .then_with(|| a.identifier().cmp(b.identifier()))
    })
}
