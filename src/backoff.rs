use std::time::Duration;

/// Generador de retrasos exponenciales para los reintentos de conexión.
///
/// Cada llamada a [`next`](Backoff::next) duplica el retraso anterior
/// partiendo de `base`, con tope en `max`. Sin jitter la secuencia es
/// determinista; con jitter se suma hasta un 25% extra (acotado, nunca por
/// encima de `max`).
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    max_tries: Option<u32>,
    jitter: bool,
    attempts: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            max_tries: None,
            jitter: false,
            attempts: 0,
        }
    }

    /// Limita la cantidad de reintentos; sin límite por defecto
    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = Some(max_tries);
        self
    }

    /// Activa el jitter acotado (+0..25% sobre el retraso calculado)
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// Retraso para el siguiente reintento, o `None` si se agotó el límite
    pub fn next(&mut self) -> Option<Duration> {
        if let Some(limit) = self.max_tries {
            if self.attempts >= limit {
                return None;
            }
        }

        let factor = 1u32.checked_shl(self.attempts).unwrap_or(u32::MAX);
        let mut delay = self.base.saturating_mul(factor).min(self.max);
        self.attempts = self.attempts.saturating_add(1);

        if self.jitter {
            delay = (delay + delay.mul_f64(fastrand::f64() * 0.25)).min(self.max);
        }

        Some(delay)
    }

    /// Vuelve al retraso base; se llama tras una conexión exitosa
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
