use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::model::{GuildId, PlayerState, Severity, Stats, Track};
use crate::node::Node;

/// Eventos tipados que la librería publica por el canal entregado al crear el
/// [`NodePool`](crate::pool::NodePool).
///
/// Los eventos de pista llevan el identificador opaco tal como vino del
/// servidor, más la pista actual de la sesión cuando los identificadores
/// coinciden. El router nunca bloquea el bucle de recepción con una llamada
/// REST para reconstruirla.
#[derive(Debug, Clone)]
pub enum LavalinkEvent {
    /// El canal de control de un nodo quedó listo (primera conexión o
    /// reconexión)
    NodeReady { node: String },
    TrackStart {
        guild_id: GuildId,
        track_id: String,
        track: Option<Track>,
    },
    TrackEnd {
        guild_id: GuildId,
        track_id: String,
        track: Option<Track>,
        reason: String,
    },
    TrackException {
        guild_id: GuildId,
        track_id: String,
        track: Option<Track>,
        message: String,
        severity: Severity,
        cause: Option<String>,
    },
    TrackStuck {
        guild_id: GuildId,
        track_id: String,
        track: Option<Track>,
        threshold_ms: u64,
    },
    WebSocketClosed {
        guild_id: GuildId,
        code: u16,
        reason: String,
        by_remote: bool,
    },
    PlayerUpdate {
        guild_id: GuildId,
        state: PlayerState,
    },
}

/// Decodifica un frame entrante y lo aplica a la sesión dueña.
///
/// Se ejecuta en línea dentro del bucle de recepción del nodo: los frames de
/// un mismo nodo se procesan estrictamente en orden de llegada para que un
/// `playerUpdate` viejo nunca pise una posición más nueva.
pub(crate) fn process_frame(node: &Arc<Node>, text: &str) {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            warn!("Frame inválido del nodo <{}>: {}", node.identifier(), e);
            return;
        }
    };

    let Some(op) = value.get("op").and_then(Value::as_str) else {
        return;
    };

    match op {
        "stats" => match serde_json::from_value::<Stats>(value.clone()) {
            Ok(stats) => node.update_stats(stats),
            Err(e) => warn!("Frame stats malformado del nodo <{}>: {}", node.identifier(), e),
        },
        "playerUpdate" => handle_player_update(node, &value),
        "event" => handle_event(node, &value),
        other => debug!("op desconocido del nodo <{}>: {}", node.identifier(), other),
    }
}

fn handle_player_update(node: &Arc<Node>, value: &Value) {
    let Some(guild_id) = guild_id_of(value) else {
        warn!("playerUpdate sin guildId");
        return;
    };

    let state = match value.get("state").cloned() {
        Some(state) => match serde_json::from_value::<PlayerState>(state) {
            Ok(state) => state,
            Err(e) => {
                warn!("playerUpdate malformado para guild {}: {}", guild_id, e);
                return;
            }
        },
        None => return,
    };

    if let Some(player) = node.get_player(guild_id) {
        player.update_state(state.clone());
    }

    node.dispatch(LavalinkEvent::PlayerUpdate { guild_id, state });
}

fn handle_event(node: &Arc<Node>, value: &Value) {
    let Some(guild_id) = guild_id_of(value) else {
        warn!("Evento sin guildId del nodo <{}>", node.identifier());
        return;
    };

    let player = node.get_player(guild_id);
    let track_id = value
        .get("track")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let track = player
        .as_ref()
        .and_then(|p| p.current_track())
        .filter(|t| t.id == track_id);

    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        return;
    };

    let event = match kind {
        "TrackStartEvent" => LavalinkEvent::TrackStart {
            guild_id,
            track_id,
            track,
        },
        "TrackEndEvent" => {
            // la pista dejó de ser "actual"; la cola decide qué sigue
            if let Some(player) = &player {
                player.clear_current();
            }
            LavalinkEvent::TrackEnd {
                guild_id,
                track_id,
                track,
                reason: value
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or("UNKNOWN")
                    .to_string(),
            }
        }
        "TrackExceptionEvent" => {
            let (message, severity, cause) = parse_exception(value);
            LavalinkEvent::TrackException {
                guild_id,
                track_id,
                track,
                message,
                severity,
                cause,
            }
        }
        "TrackStuckEvent" => LavalinkEvent::TrackStuck {
            guild_id,
            track_id,
            track,
            threshold_ms: value.get("thresholdMs").and_then(Value::as_u64).unwrap_or(0),
        },
        "WebSocketClosedEvent" => LavalinkEvent::WebSocketClosed {
            guild_id,
            code: value
                .get("code")
                .and_then(Value::as_u64)
                .and_then(|c| u16::try_from(c).ok())
                .unwrap_or(1000),
            reason: value
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            by_remote: value
                .get("byRemote")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        },
        other => {
            debug!("Tipo de evento desconocido: {}", other);
            return;
        }
    };

    debug!("Evento {} para guild {}", kind, guild_id);
    node.dispatch(event);
}

/// Los frames traen el guildId como string; algunos servidores viejos lo
/// mandan numérico.
fn guild_id_of(value: &Value) -> Option<GuildId> {
    let raw = value.get("guildId")?;
    if let Some(text) = raw.as_str() {
        return text.parse::<u64>().ok().map(GuildId);
    }
    raw.as_u64().map(GuildId)
}

fn parse_exception(value: &Value) -> (String, Severity, Option<String>) {
    if let Some(exception) = value.get("exception") {
        let message = exception
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("error desconocido")
            .to_string();
        let severity = exception
            .get("severity")
            .cloned()
            .and_then(|s| serde_json::from_value::<Severity>(s).ok())
            .unwrap_or(Severity::Common);
        let cause = exception
            .get("cause")
            .and_then(Value::as_str)
            .map(str::to_string);
        (message, severity, cause)
    } else {
        // formato legado: el mensaje viene plano en "error"
        let message = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("error desconocido")
            .to_string();
        (message, Severity::Common, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn guild_id_accepts_string_and_number() {
        assert_eq!(
            guild_id_of(&json!({"guildId": "123"})),
            Some(GuildId(123))
        );
        assert_eq!(guild_id_of(&json!({"guildId": 456})), Some(GuildId(456)));
        assert_eq!(guild_id_of(&json!({"otra": 1})), None);
    }

    #[test]
    fn exception_prefers_structured_payload() {
        let (message, severity, cause) = parse_exception(&json!({
            "exception": {
                "message": "video no disponible",
                "severity": "SUSPICIOUS",
                "cause": "algo interno"
            }
        }));
        assert_eq!(message, "video no disponible");
        assert_eq!(severity, Severity::Suspicious);
        assert_eq!(cause.as_deref(), Some("algo interno"));
    }

    #[test]
    fn exception_falls_back_to_legacy_error_field() {
        let (message, severity, cause) = parse_exception(&json!({"error": "se rompió"}));
        assert_eq!(message, "se rompió");
        assert_eq!(severity, Severity::Common);
        assert_eq!(cause, None);
    }
}
