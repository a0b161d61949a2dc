//! Request coalescing: concurrent callers for the same key share a single
//! in-flight fetch instead of issuing redundant work.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

/// Tracks in-flight fetches so concurrent callers for the same key join a
/// single leader instead of each calling `fetch`.
pub(crate) struct InFlight<K, V> {
    requests: Mutex<HashMap<K, broadcast::Sender<V>>>,
}

impl<K, V> InFlight<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `fetch` for `key`, coalescing concurrent callers. Only the first
    /// caller for a given key (the "leader") actually invokes `fetch`; every
    /// other concurrent caller ("waiter") receives a clone of the leader's
    /// result. Returns whether this call joined as a waiter.
    pub(crate) async fn run<F, Fut, E>(
        self: &Arc<Self>,
        key: K,
        fetch: F,
    ) -> (Result<V, E>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<V, E>>,
    {
        let receiver = {
            let mut requests = self.requests.lock();
            if let Some(sender) = requests.get(&key) {
                Some(sender.subscribe())
            } else {
                let (tx, _rx) = broadcast::channel(1);
                requests.insert(key.clone(), tx);
                None
            }
        };

        if let Some(mut receiver) = receiver {
            return match receiver.recv().await {
                Ok(value) => (Ok(value), true),
                Err(_) => {
                    // Leader panicked, was dropped, or genuinely lagged. Fall
                    // back to running the fetch ourselves rather than
                    // propagating a coalescing-internal error to the caller.
                    (self.run_as_leader(key, fetch).await, false)
                }
            };
        }

        (self.run_as_leader(key, fetch).await, false)
    }

    async fn run_as_leader<F, Fut, E>(self: &Arc<Self>, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<V, E>>,
    {
        let result = fetch().await;

        let mut requests = self.requests.lock();
        if let Some(sender) = requests.remove(&key) {
            if let Ok(value) = &result {
                let _ = sender.send(value.clone());
            }
        }
        drop(requests);

        result
    }
}
