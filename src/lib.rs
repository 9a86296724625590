//! Cliente del plano de control de Lavalink: pool de nodos con balanceo por
//! carga, reconexión automática con backoff, sesiones por guild con cola y
//! modos de repetición, y carga de pistas vía REST.
//!
//! ```no_run
//! use std::sync::Arc;
//! use open_lavalink::{NodeConfig, NodePool, NullVoiceProvider, UserId};
//!
//! # async fn ejemplo() -> open_lavalink::Result<()> {
//! let (pool, mut events) = NodePool::new(UserId(1), Arc::new(NullVoiceProvider));
//! pool.create_node(NodeConfig::from_env()?)?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

mod backoff;
mod config;
mod error;
mod events;
mod filters;
mod model;
mod node;
mod player;
mod pool;
mod queue;
mod socket;
mod sources;
mod voice;

pub use backoff::Backoff;
pub use config::NodeConfig;
pub use error::{Error, Result};
pub use events::LavalinkEvent;
pub use filters::{Distortion, Filters};
pub use model::{
    ChannelId, CpuStats, FrameStats, GuildId, LoadType, MemoryStats, Penalty, PlayerState,
    Playlist, RepeatMode, Severity, Stats, Track, TrackInfo, UserId,
};
pub use node::{LoadedTracks, Node};
pub use player::Player;
pub use pool::NodePool;
pub use queue::{MusicQueue, QueueDuration};
pub use socket::SocketState;
pub use sources::{search, SearchResult, SourceKind, SourceMetadata};
pub use voice::{NullVoiceProvider, VoiceProvider};
