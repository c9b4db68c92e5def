// Last-request-wins bookkeeping for overlapping recomputations
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Generations {
    next: u64,
    current: HashMap<String, u64>,
}

/// Hands out tickets per key. Only the newest ticket for a key is current;
/// results produced under an older one are discarded by the caller.
///
/// A key stays registered only while its newest ticket is alive, so the map
/// holds at most one entry per in-flight key.
#[derive(Debug, Default)]
pub struct RequestGate {
    generations: Mutex<Generations>,
}

/// Held for the duration of one request. Dropping it releases the key if no
/// newer request took it over in the meantime.
#[derive(Debug)]
pub struct Ticket<'a> {
    gate: &'a RequestGate,
    key: String,
    generation: u64,
}

impl RequestGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Generations> {
        self.generations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn begin(&self, key: impl Into<String>) -> Ticket<'_> {
        let key = key.into();
        let mut generations = self.lock();
        // Generations are unique across keys, so a released key that is taken
        // again never hands out a number an older ticket still holds.
        generations.next += 1;
        let generation = generations.next;
        generations.current.insert(key.clone(), generation);
        Ticket {
            gate: self,
            key,
            generation,
        }
    }

    fn finish(&self, key: &str, generation: u64) {
        let mut generations = self.lock();
        if generations.current.get(key) == Some(&generation) {
            generations.current.remove(key);
        }
    }

    /// Keys with a request in flight.
    #[cfg(test)]
    pub fn in_flight(&self) -> usize {
        self.lock().current.len()
    }
}

impl Ticket<'_> {
    pub fn is_current(&self) -> bool {
        self.gate.lock().current.get(&self.key) == Some(&self.generation)
    }
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        self.gate.finish(&self.key, self.generation);
    }
}
