use std::time::Duration;

use crate::error::{Error, Result};

/// Configuración de conexión de un nodo Lavalink
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Identificador único dentro del pool
    pub identifier: String,
    pub host: String,
    pub port: u16,
    pub password: String,
    pub ssl: bool,
    /// Etiqueta de región para enrutar por cercanía (opcional)
    pub region: Option<String>,
    /// Clave de reanudación enviada en el handshake; permite recuperar el
    /// estado del servidor tras un corte breve
    pub resume_key: String,
    /// Ventana de reanudación en segundos
    pub resume_timeout: u64,

    // Reintentos de conexión
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl NodeConfig {
    pub fn new(
        identifier: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        password: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            host: host.into(),
            port,
            password: password.into(),
            ssl: false,
            region: None,
            resume_key: random_key(),
            resume_timeout: 60,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
        }
    }

    /// Carga la configuración desde variables de entorno, con los mismos
    /// valores por defecto que usamos en desarrollo local.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let host = std::env::var("LAVALINK_HOST").unwrap_or_else(|_| "localhost".to_string());
        let port = std::env::var("LAVALINK_PORT")
            .unwrap_or_else(|_| "2333".to_string())
            .parse::<u16>()
            .map_err(|_| Error::Config("LAVALINK_PORT no es un puerto válido".into()))?;
        let password =
            std::env::var("LAVALINK_PASSWORD").unwrap_or_else(|_| "youshallnotpass".to_string());
        let ssl = std::env::var("LAVALINK_SSL")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        let identifier = std::env::var("LAVALINK_IDENTIFIER").unwrap_or_else(|_| random_key());
        let region = std::env::var("LAVALINK_REGION").ok();

        let mut config = Self::new(identifier, host, port, password);
        config.ssl = ssl;
        config.region = region;
        Ok(config)
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    pub fn with_resume(mut self, key: impl Into<String>, timeout_secs: u64) -> Self {
        self.resume_key = key.into();
        self.resume_timeout = timeout_secs;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    /// URL base para el endpoint REST del nodo
    pub(crate) fn http_url(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// URL del websocket de control
    pub(crate) fn ws_url(&self) -> String {
        let scheme = if self.ssl { "wss" } else { "ws" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

/// Clave hexadecimal aleatoria de 8 bytes (identificadores y resume keys)
pub(crate) fn random_key() -> String {
    format!("{:016x}", rand::random::<u64>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn urls_follow_ssl_flag() {
        let config = NodeConfig::new("principal", "lava.example.com", 2333, "secreta");
        assert_eq!(config.http_url(), "http://lava.example.com:2333");
        assert_eq!(config.ws_url(), "ws://lava.example.com:2333");

        let config = config.with_ssl(true);
        assert_eq!(config.http_url(), "https://lava.example.com:2333");
        assert_eq!(config.ws_url(), "wss://lava.example.com:2333");
    }

    #[test]
    fn random_keys_are_distinct() {
        assert_ne!(random_key(), random_key());
    }
}
