use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::{RepeatMode, Track};

/// Tiempo estimado de reproducción restante
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueDuration {
    Finite(Duration),
    /// Alguna pista del tramo es una transmisión en vivo
    Infinite,
}

/// Cola de reproducción con historial y modos de repetición.
///
/// Mantiene dos secuencias: `upcoming` (FIFO, acotada por `max_size`) y
/// `history` (la más reciente primero, acotada por `history_max_size` como
/// anillo que descarta la más antigua). Invariante: `history[0]`, cuando
/// existe, es siempre la pista "actual" (la última sacada de la cola).
///
/// Todas las operaciones son mutaciones puras en memoria; aquí no hay puntos
/// de suspensión.
#[derive(Debug)]
pub struct MusicQueue {
    upcoming: VecDeque<Track>,
    history: VecDeque<Track>,
    repeat_mode: RepeatMode,
    max_size: usize,
    history_max_size: usize,
    /// Con overflow activo, `put` descarta la pista más nueva en vez de
    /// fallar cuando la cola está llena
    overflow: bool,
}

impl Default for MusicQueue {
    fn default() -> Self {
        Self::new(100, 100)
    }
}

impl MusicQueue {
    pub fn new(max_size: usize, history_max_size: usize) -> Self {
        Self {
            upcoming: VecDeque::new(),
            history: VecDeque::new(),
            repeat_mode: RepeatMode::Off,
            max_size,
            history_max_size,
            overflow: false,
        }
    }

    pub fn set_overflow(&mut self, overflow: bool) {
        self.overflow = overflow;
    }

    /// Agrega una pista al final de la cola
    pub fn put(&mut self, track: Track) -> Result<()> {
        self.make_room()?;
        info!("➕ Agregada a la cola: {}", track.info.title);
        self.upcoming.push_back(track);
        Ok(())
    }

    /// Agrega una pista al frente de la cola
    pub fn put_at_front(&mut self, track: Track) -> Result<()> {
        self.make_room()?;
        self.upcoming.push_front(track);
        Ok(())
    }

    /// Inserta una pista en la posición dada (se ajusta al final si excede)
    pub fn put_at_index(&mut self, index: usize, track: Track) -> Result<()> {
        self.make_room()?;
        let index = index.min(self.upcoming.len());
        self.upcoming.insert(index, track);
        Ok(())
    }

    fn make_room(&mut self) -> Result<()> {
        if self.upcoming.len() >= self.max_size {
            if !self.overflow {
                return Err(Error::QueueFull { max: self.max_size });
            }
            // descarta la más nueva para hacer lugar
            self.upcoming.pop_back();
        }
        Ok(())
    }

    /// Agrega un lote de pistas.
    ///
    /// Con `atomic` la capacidad se valida por adelantado: si el lote no cabe
    /// falla con `QueueFull` sin mutar nada (cuando el overflow está
    /// desactivado). Sin `atomic` inserta de a una y devuelve cuántas entraron.
    pub fn extend(
        &mut self,
        tracks: impl IntoIterator<Item = Track>,
        atomic: bool,
    ) -> Result<usize> {
        let tracks: Vec<Track> = tracks.into_iter().collect();

        if atomic && !self.overflow && self.upcoming.len() + tracks.len() > self.max_size {
            return Err(Error::QueueFull { max: self.max_size });
        }

        let mut added = 0;
        for track in tracks {
            match self.put(track) {
                Ok(()) => added += 1,
                Err(_) if !atomic => break,
                Err(e) => return Err(e),
            }
        }
        Ok(added)
    }

    /// Saca la siguiente pista según el modo de repetición.
    ///
    /// - `ONE`: devuelve la pista actual otra vez sin consumir la cola.
    /// - `ALL`: cuando la cola se agota, recicla el historial completo (de la
    ///   más antigua a la más reciente) y continúa como `OFF`.
    /// - `OFF`: FIFO; cada pista extraída pasa al frente del historial.
    pub fn next_track(&mut self) -> Result<Track> {
        match self.repeat_mode {
            RepeatMode::One => {
                if let Some(current) = self.history.front() {
                    info!("🔂 Repitiendo pista: {}", current.info.title);
                    return Ok(current.clone());
                }
            }
            RepeatMode::All if self.upcoming.is_empty() => {
                debug!("🔁 Cola agotada, reciclando {} pistas del historial", self.history.len());
                while let Some(track) = self.history.pop_back() {
                    self.upcoming.push_back(track);
                }
            }
            _ => {}
        }

        let track = self.upcoming.pop_front().ok_or(Error::QueueEmpty)?;
        self.push_history(track.clone());
        Ok(track)
    }

    /// Restaura la pista anterior como actual.
    ///
    /// Inversa exacta de [`next_track`](Self::next_track) en modo `OFF`: la
    /// entrada más reciente del historial vuelve al frente de la cola. Falla
    /// con `QueueHistoryEmpty` si no hay una "actual" más una anterior. La
    /// restauración nunca falla por capacidad.
    pub fn previous_track(&mut self) -> Result<Track> {
        if self.history.len() < 2 {
            return Err(Error::QueueHistoryEmpty);
        }

        let current = self.history.pop_front().ok_or(Error::QueueHistoryEmpty)?;
        self.upcoming.push_front(current);
        self.history.front().cloned().ok_or(Error::QueueHistoryEmpty)
    }

    /// Avanza o retrocede hasta que el índice actual (la longitud del
    /// historial) sea `index`; no hace nada si ya está ahí.
    ///
    /// Los índices negativos se tratan como su valor absoluto, igual que el
    /// cliente original (peculiaridad conservada por compatibilidad).
    pub fn skip_to_index(&mut self, index: i64) -> Result<Option<Track>> {
        let index = index.unsigned_abs() as usize;

        while self.current_index() < index {
            let track = self.upcoming.pop_front().ok_or(Error::QueueEmpty)?;
            self.push_history(track);
        }

        while self.current_index() > index {
            let Some(track) = self.history.pop_front() else {
                break;
            };
            self.upcoming.push_front(track);
        }

        Ok(self.current_track())
    }

    fn push_history(&mut self, track: Track) {
        self.history.push_front(track);
        if self.history.len() > self.history_max_size {
            // anillo: descarta la entrada más antigua
            self.history.pop_back();
        }
    }

    /// Pista actual (la última sacada de la cola)
    pub fn current_track(&self) -> Option<Track> {
        self.history.front().cloned()
    }

    /// Índice actual = longitud del historial
    pub fn current_index(&self) -> usize {
        self.history.len()
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat_mode = mode;
        match mode {
            RepeatMode::Off => info!("➡️ Repetición desactivada"),
            RepeatMode::One => info!("🔂 Repetir pista activado"),
            RepeatMode::All => info!("🔁 Repetir cola activado"),
        }
    }

    /// Suma la duración de la pista actual y de todas las próximas, restando
    /// la posición ya reproducida; `Infinite` si hay una transmisión en vivo
    /// en ese tramo.
    pub fn estimated_remaining(&self, position: Duration) -> QueueDuration {
        let Some(current) = self.history.front() else {
            return QueueDuration::Finite(Duration::ZERO);
        };
        if current.info.is_stream {
            return QueueDuration::Infinite;
        }

        let mut total = Duration::from_millis(current.info.length);
        for track in &self.upcoming {
            if track.info.is_stream {
                return QueueDuration::Infinite;
            }
            total += Duration::from_millis(track.info.length);
        }

        QueueDuration::Finite(total.saturating_sub(position))
    }

    pub fn upcoming(&self) -> impl Iterator<Item = &Track> {
        self.upcoming.iter()
    }

    /// Historial, de la más reciente a la más antigua
    pub fn history(&self) -> impl Iterator<Item = &Track> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.upcoming.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upcoming.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.upcoming.len() >= self.max_size
    }

    /// Quita una pista por posición en la cola
    pub fn remove(&mut self, index: usize) -> Option<Track> {
        self.upcoming.remove(index)
    }

    /// Vacía la cola y el historial
    pub fn clear(&mut self) {
        self.upcoming.clear();
        self.history.clear();
        info!("🗑️ Cola limpiada");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TrackInfo, UserId};
    use pretty_assertions::assert_eq;

    fn track(id: &str) -> Track {
        track_with(id, 180_000, false)
    }

    fn track_with(id: &str, length: u64, is_stream: bool) -> Track {
        Track {
            id: id.to_string(),
            info: TrackInfo {
                identifier: id.to_string(),
                title: format!("Pista {id}"),
                author: None,
                length,
                is_seekable: !is_stream,
                is_stream,
                position: 0,
                uri: None,
                source_name: None,
            },
            requester: UserId(1),
        }
    }

    #[test]
    fn fifo_order_is_preserved() {
        let mut queue = MusicQueue::new(10, 10);
        for id in ["a", "b", "c"] {
            queue.put(track(id)).expect("hay lugar");
        }
        let order: Vec<String> = (0..3)
            .map(|_| queue.next_track().expect("hay pistas").id)
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert!(matches!(queue.next_track(), Err(Error::QueueEmpty)));
    }

    #[test]
    fn previous_is_exact_inverse_of_next() {
        let mut queue = MusicQueue::new(10, 10);
        for id in ["a", "b", "c"] {
            queue.put(track(id)).expect("hay lugar");
        }

        let first = queue.next_track().expect("a");
        let second = queue.next_track().expect("b");
        assert_eq!(first.id, "a");
        assert_eq!(second.id, "b");

        // restaura "a" como actual y "b" vuelve al frente de la cola
        let restored = queue.previous_track().expect("hay historial");
        assert_eq!(restored.id, "a");
        assert_eq!(queue.current_track().map(|t| t.id), Some("a".to_string()));

        let again = queue.next_track().expect("b otra vez");
        assert_eq!(again.id, "b");
    }

    #[test]
    fn previous_needs_a_current_plus_a_prior() {
        let mut queue = MusicQueue::new(10, 10);
        queue.put(track("a")).expect("hay lugar");
        queue.next_track().expect("a");
        assert!(matches!(
            queue.previous_track(),
            Err(Error::QueueHistoryEmpty)
        ));
    }

    #[test]
    fn full_queue_rejects_without_overflow() {
        let mut queue = MusicQueue::new(2, 10);
        queue.put(track("a")).expect("hay lugar");
        queue.put(track("b")).expect("hay lugar");
        assert!(matches!(
            queue.put(track("c")),
            Err(Error::QueueFull { max: 2 })
        ));
        let remaining: Vec<&str> = queue.upcoming().map(|t| t.id.as_str()).collect();
        assert_eq!(remaining, vec!["a", "b"]);
    }

    #[test]
    fn overflow_drops_the_newest() {
        let mut queue = MusicQueue::new(2, 10);
        queue.set_overflow(true);
        queue.put(track("a")).expect("hay lugar");
        queue.put(track("b")).expect("hay lugar");
        queue.put(track("c")).expect("overflow descarta");
        let remaining: Vec<&str> = queue.upcoming().map(|t| t.id.as_str()).collect();
        assert_eq!(remaining, vec!["a", "c"]);
    }

    #[test]
    fn repeat_all_recycles_history() {
        let mut queue = MusicQueue::new(10, 10);
        queue.set_repeat_mode(RepeatMode::All);
        queue.put(track("a")).expect("hay lugar");
        queue.put(track("b")).expect("hay lugar");

        let order: Vec<String> = (0..3)
            .map(|_| queue.next_track().expect("repite").id)
            .collect();
        assert_eq!(order, vec!["a", "b", "a"]);
    }

    #[test]
    fn repeat_one_does_not_consume_upcoming() {
        let mut queue = MusicQueue::new(10, 10);
        queue.put(track("a")).expect("hay lugar");
        queue.put(track("b")).expect("hay lugar");

        let first = queue.next_track().expect("a");
        assert_eq!(first.id, "a");

        queue.set_repeat_mode(RepeatMode::One);
        assert_eq!(queue.next_track().expect("a otra vez").id, "a");
        assert_eq!(queue.next_track().expect("a de nuevo").id, "a");
        assert_eq!(queue.len(), 1);

        queue.set_repeat_mode(RepeatMode::Off);
        assert_eq!(queue.next_track().expect("b").id, "b");
    }

    #[test]
    fn skip_to_index_moves_in_both_directions() {
        let mut queue = MusicQueue::new(10, 10);
        for id in ["a", "b", "c", "d"] {
            queue.put(track(id)).expect("hay lugar");
        }

        let current = queue.skip_to_index(3).expect("avanza");
        assert_eq!(current.map(|t| t.id), Some("c".to_string()));
        assert_eq!(queue.current_index(), 3);

        let current = queue.skip_to_index(1).expect("retrocede");
        assert_eq!(current.map(|t| t.id), Some("a".to_string()));
        assert_eq!(queue.current_index(), 1);
    }

    #[test]
    fn skip_to_index_treats_negatives_as_absolute() {
        // peculiaridad heredada: -2 equivale a 2, no indexa desde el final
        let mut queue = MusicQueue::new(10, 10);
        for id in ["a", "b", "c"] {
            queue.put(track(id)).expect("hay lugar");
        }
        let current = queue.skip_to_index(-2).expect("abs(-2) == 2");
        assert_eq!(current.map(|t| t.id), Some("b".to_string()));
        assert_eq!(queue.current_index(), 2);
    }

    #[test]
    fn skip_past_the_end_fails_with_empty() {
        let mut queue = MusicQueue::new(10, 10);
        queue.put(track("a")).expect("hay lugar");
        assert!(matches!(queue.skip_to_index(5), Err(Error::QueueEmpty)));
    }

    #[test]
    fn history_ring_drops_oldest() {
        let mut queue = MusicQueue::new(10, 2);
        for id in ["a", "b", "c"] {
            queue.put(track(id)).expect("hay lugar");
        }
        for _ in 0..3 {
            queue.next_track().expect("hay pistas");
        }
        let history: Vec<&str> = queue.history().map(|t| t.id.as_str()).collect();
        assert_eq!(history, vec!["c", "b"]);
    }

    #[test]
    fn extend_atomic_validates_capacity_up_front() {
        let mut queue = MusicQueue::new(3, 10);
        queue.put(track("a")).expect("hay lugar");

        let result = queue.extend([track("b"), track("c"), track("d")], true);
        assert!(matches!(result, Err(Error::QueueFull { max: 3 })));
        assert_eq!(queue.len(), 1);

        let added = queue
            .extend([track("b"), track("c"), track("d")], false)
            .expect("parcial");
        assert_eq!(added, 2);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn estimated_remaining_subtracts_position() {
        let mut queue = MusicQueue::new(10, 10);
        queue.put(track_with("a", 60_000, false)).expect("hay lugar");
        queue.put(track_with("b", 30_000, false)).expect("hay lugar");
        queue.next_track().expect("a");

        assert_eq!(
            queue.estimated_remaining(Duration::from_millis(10_000)),
            QueueDuration::Finite(Duration::from_millis(80_000))
        );
    }

    #[test]
    fn estimated_remaining_is_infinite_with_a_stream() {
        let mut queue = MusicQueue::new(10, 10);
        queue.put(track_with("a", 60_000, false)).expect("hay lugar");
        queue.put(track_with("en-vivo", 0, true)).expect("hay lugar");
        queue.next_track().expect("a");

        assert_eq!(
            queue.estimated_remaining(Duration::ZERO),
            QueueDuration::Infinite
        );
    }

    #[test]
    fn estimated_remaining_without_current_is_zero() {
        let queue = MusicQueue::new(10, 10);
        assert_eq!(
            queue.estimated_remaining(Duration::ZERO),
            QueueDuration::Finite(Duration::ZERO)
        );
    }
}
