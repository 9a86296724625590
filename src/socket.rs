use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::error::{Error, Result};
use crate::events::{self, LavalinkEvent};
use crate::model::UserId;
use crate::node::Node;

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<Ws, Message>;
type WsStream = SplitStream<Ws>;

/// Código de cierre con el que Lavalink señala un error interno
/// irrecuperable; nunca se reintenta.
const FATAL_CLOSE_CODE: u16 = 1011;

/// Estado del canal de control de un nodo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// Qué debe hacer el bucle externo tras cerrarse una sesión de websocket
enum CloseOutcome {
    /// Cierre recuperable: reintentar con backoff
    Retry,
    /// Error fatal del servidor: detener sin reintentos
    Fatal,
    /// Cancelación explícita (teardown del nodo)
    Cancelled,
}

/// Canal de control persistente hacia un nodo.
///
/// Un único bucle de recepción por nodo: marca, lee frames en orden de
/// llegada, clasifica el cierre y reintenta con [`Backoff`]. Los envíos con
/// el canal desconectado se descartan en silencio (semántica fire-and-forget
/// del protocolo de control).
pub(crate) struct NodeSocket {
    node: Weak<Node>,
    user_id: UserId,
    sink: Mutex<Option<WsSink>>,
    state: parking_lot::RwLock<SocketState>,
    /// Garantiza que nunca haya dos bucles de recepción corriendo
    running: AtomicBool,
    cancel: CancellationToken,
}

impl NodeSocket {
    pub(crate) fn new(node: Weak<Node>, user_id: UserId) -> Self {
        Self {
            node,
            user_id,
            sink: Mutex::new(None),
            state: parking_lot::RwLock::new(SocketState::Disconnected),
            running: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn state(&self) -> SocketState {
        *self.state.read()
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.state() == SocketState::Connected
    }

    fn set_state(&self, state: SocketState) {
        *self.state.write() = state;
    }

    /// Arranca el bucle de conexión/recepción en segundo plano; no hace nada
    /// si ya hay uno corriendo.
    pub(crate) fn connect(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("El bucle de recepción ya está corriendo");
            return;
        }

        let socket = Arc::clone(self);
        tokio::spawn(async move {
            socket.run().await;
        });
    }

    async fn run(self: Arc<Self>) {
        let Some(node) = self.node.upgrade() else {
            self.running.store(false, Ordering::SeqCst);
            return;
        };

        let config = node.config().clone();
        let mut backoff = Backoff::new(config.backoff_base, config.backoff_max);

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            self.set_state(SocketState::Connecting);

            match self.open(&node).await {
                Ok(stream) => {
                    backoff.reset();
                    let outcome = self.session(&node, stream).await;
                    *self.sink.lock().await = None;
                    match outcome {
                        CloseOutcome::Retry => self.set_state(SocketState::Connecting),
                        CloseOutcome::Fatal => {
                            self.set_state(SocketState::Closing);
                            break;
                        }
                        CloseOutcome::Cancelled => break,
                    }
                }
                Err(Error::AuthorizationFailure(identifier)) => {
                    error!(
                        "🔒 Autorización rechazada por el nodo <{}>; no se reintenta",
                        identifier
                    );
                    break;
                }
                Err(e) => {
                    warn!("Fallo de conexión con el nodo <{}>: {}", config.identifier, e);
                }
            }

            let Some(delay) = backoff.next() else { break };
            warn!(
                "Reintentando conexión con <{}> en {:?}...",
                config.identifier, delay
            );
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(SocketState::Disconnected);
        self.running.store(false, Ordering::SeqCst);
    }

    /// Handshake hacia el nodo. Un 401 es terminal; cualquier otro fallo se
    /// reporta como transitorio y cae en el camino de reintentos.
    async fn open(&self, node: &Arc<Node>) -> Result<Ws> {
        let config = node.config();
        let mut request = config.ws_url().into_client_request()?;

        let headers = request.headers_mut();
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&config.password)
                .map_err(|_| Error::Config("la contraseña no es una cabecera válida".into()))?,
        );
        headers.insert(
            "User-Id",
            HeaderValue::from_str(&self.user_id.to_string())
                .map_err(|_| Error::Config("User-Id inválido".into()))?,
        );
        headers.insert(
            "Client-Name",
            HeaderValue::from_static(concat!("open-lavalink/", env!("CARGO_PKG_VERSION"))),
        );
        headers.insert(
            "Resume-Key",
            HeaderValue::from_str(&config.resume_key)
                .map_err(|_| Error::Config("resume_key inválida".into()))?,
        );

        match connect_async(request).await {
            Ok((stream, _response)) => Ok(stream),
            Err(WsError::Http(response)) if response.status() == StatusCode::UNAUTHORIZED => {
                Err(Error::AuthorizationFailure(config.identifier.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Una sesión de websocket ya establecida: configura la reanudación,
    /// anuncia `NodeReady` y procesa frames hasta que el canal se cierre.
    async fn session(&self, node: &Arc<Node>, stream: Ws) -> CloseOutcome {
        let (sink, stream) = stream.split();
        *self.sink.lock().await = Some(sink);
        self.set_state(SocketState::Connected);
        info!("✅ Conexión establecida con el nodo <{}>", node.identifier());

        // reanudación del lado del servidor: un corte breve no pierde estado
        self.send(json!({
            "op": "configureResuming",
            "key": node.config().resume_key,
            "timeout": node.config().resume_timeout,
        }))
        .await;

        node.dispatch(LavalinkEvent::NodeReady {
            node: node.identifier().to_string(),
        });

        self.read_frames(node, stream).await
    }

    async fn read_frames(&self, node: &Arc<Node>, mut stream: WsStream) -> CloseOutcome {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return CloseOutcome::Cancelled,
                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        // en orden de llegada, sin fan-out: un playerUpdate
                        // viejo no debe pisar una posición más nueva
                        events::process_frame(node, text.as_str());
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.as_str().to_string()))
                            .unwrap_or((1005, String::new()));
                        if code == FATAL_CLOSE_CODE {
                            error!(
                                "💀 Error interno de Lavalink ({}) en <{}>; se detienen los \
                                 reintentos. Considere actualizar el servidor.",
                                code,
                                node.identifier()
                            );
                            return CloseOutcome::Fatal;
                        }
                        warn!(
                            "Websocket cerrado por el nodo <{}>: {} {}",
                            node.identifier(),
                            code,
                            reason
                        );
                        return CloseOutcome::Retry;
                    }
                    // ping/pong/binario: nada que hacer
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Error de lectura del nodo <{}>: {}", node.identifier(), e);
                        return CloseOutcome::Retry;
                    }
                    None => {
                        warn!("Flujo del nodo <{}> terminado", node.identifier());
                        return CloseOutcome::Retry;
                    }
                }
            }
        }
    }

    /// Serializa y escribe un comando. Solo mientras el canal está conectado;
    /// si no, el comando se descarta en silencio y queda en el log de debug.
    pub(crate) async fn send(&self, payload: Value) {
        if !self.is_connected() {
            let op = payload.get("op").and_then(Value::as_str).unwrap_or("?");
            debug!("🔌 Comando descartado (nodo desconectado): {}", op);
            return;
        }

        let text = payload.to_string();
        let mut guard = self.sink.lock().await;
        if let Some(sink) = guard.as_mut() {
            debug!("Enviando payload: {}", text);
            if let Err(e) = sink.send(Message::text(text)).await {
                warn!("Error al enviar al nodo: {}", e);
            }
        }
    }

    /// Cancela el bucle de recepción y cierra el socket. Los errores de
    /// cierre se registran y se tragan: no deben frenar el teardown.
    pub(crate) async fn close(&self) {
        self.set_state(SocketState::Closing);
        self.cancel.cancel();
        if let Some(mut sink) = self.sink.lock().await.take() {
            if let Err(e) = sink.close().await {
                debug!("Error al cerrar el websocket: {}", e);
            }
        }
        self.set_state(SocketState::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn sends_while_disconnected_are_dropped_silently() {
        let socket = NodeSocket::new(Weak::new(), UserId(1));
        assert_eq!(socket.state(), SocketState::Disconnected);

        // se descarta sin tocar el socket, con o sin campo "op"
        socket.send(json!({ "op": "stop", "guildId": "1" })).await;
        socket.send(json!({ "guildId": "1" })).await;
        assert_eq!(socket.state(), SocketState::Disconnected);
    }
}
