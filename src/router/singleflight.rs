//! Singleflight de-duplication of concurrent identical requests.

use crate::types::GenerationResponse;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

type Outcome = Result<GenerationResponse>;

/// Role assigned to a caller joining a flight for some cache key.
pub(crate) enum Flight {
    /// First caller: executes the work and publishes the outcome.
    Leader(broadcast::Sender<Outcome>),
    /// Late arrival: awaits the leader's broadcast.
    Waiter(broadcast::Receiver<Outcome>),
}

/// Map from cache-key hash to the in-progress flight for that key.
///
/// The entry is removed *before* the outcome is published, so a caller can
/// never subscribe to a flight whose result has already been delivered; it
/// starts a fresh one instead.
pub(crate) struct Singleflight {
    inflight: Mutex<HashMap<String, broadcast::Sender<Outcome>>>,
}

impl Singleflight {
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn join(&self, key: &str) -> Flight {
        let mut map = self.inflight.lock().expect("singleflight lock");
        if let Some(tx) = map.get(key) {
            Flight::Waiter(tx.subscribe())
        } else {
            let (tx, _rx) = broadcast::channel(1);
            map.insert(key.to_string(), tx.clone());
            Flight::Leader(tx)
        }
    }

    /// Publish the leader's outcome and release the key.
    pub fn complete(&self, key: &str, tx: &broadcast::Sender<Outcome>, outcome: Outcome) {
        self.inflight.lock().expect("singleflight lock").remove(key);
        // No receivers is fine: the leader may be the only caller.
        let _ = tx.send(outcome);
    }

    /// Number of keys currently in flight.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inflight.lock().expect("singleflight lock").len()
    }
}

/// Await a flight outcome. A closed channel means the leader vanished without
/// publishing (task panic); waiters are released with an error, never hung.
pub(crate) async fn await_outcome(mut rx: broadcast::Receiver<Outcome>) -> Outcome {
    match rx.recv().await {
        Ok(outcome) => outcome,
        Err(_) => Err(Error::Internal(
            "in-flight request leader dropped without an outcome".into(),
        )),
    }
}
