use thiserror::Error;

use crate::model::Severity;

pub type Result<T> = std::result::Result<T, Error>;

/// Errores de la librería.
///
/// Los fallos transitorios de red no aparecen aquí: los reintentos viven
/// dentro del canal de control y los comandos enviados con el nodo
/// desconectado se descartan en silencio.
#[derive(Debug, Error)]
pub enum Error {
    /// El nodo rechazó la contraseña durante el handshake. Terminal: no se
    /// reintenta.
    #[error("autorización rechazada por el nodo <{0}>")]
    AuthorizationFailure(String),

    #[error("ya existe un nodo con el identificador <{0}>")]
    NodeOccupied(String),

    #[error("no existe ningún nodo con el identificador <{0}>")]
    NoMatchingNode(String),

    #[error("no hay nodos disponibles en el pool")]
    ZeroConnectedNodes,

    #[error("la cola está llena (máximo {max} pistas)")]
    QueueFull { max: usize },

    #[error("la cola está vacía")]
    QueueEmpty,

    #[error("el historial no tiene suficientes pistas")]
    QueueHistoryEmpty,

    /// El servidor no pudo cargar la pista; conserva la severidad y el
    /// mensaje reportados para que el llamador decida (p. ej. saltar a la
    /// siguiente de la cola).
    #[error("el servidor no pudo cargar la pista ({severity:?}): {message}")]
    LoadFailed { severity: Severity, message: String },

    #[error("respuesta inválida del servidor: {0}")]
    InvalidResponse(String),

    #[error("banda de ecualizador inválida: {0} (las válidas son 0-14)")]
    InvalidEqualizerBand(u32),

    #[error("configuración inválida: {0}")]
    Config(String),

    #[error("error HTTP hacia el nodo")]
    Http(#[from] reqwest::Error),

    #[error("error de websocket")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("error del proveedor de voz: {0}")]
    Voice(String),
}
