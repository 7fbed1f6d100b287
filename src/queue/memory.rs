//! In-process broker with the same list semantics as Redis.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::error::{BrokerError, BrokerResult};
use super::Broker;

#[derive(Debug, Default)]
struct Lists {
    entries: HashMap<String, VecDeque<String>>,
    pushes: HashMap<String, usize>,
}

/// Lists are stored head-first: `push_left` inserts at the front, pops take the back.
#[derive(Debug)]
pub struct MemoryBroker {
    lists: Mutex<Lists>,
    notify: Notify,
    available: AtomicBool,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            lists: Mutex::new(Lists::default()),
            notify: Notify::new(),
            available: AtomicBool::new(true),
        }
    }

    fn with_lists<R>(&self, f: impl FnOnce(&mut Lists) -> R) -> R {
        let mut guard = self.lists.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut guard)
    }

    fn ensure_available(&self) -> BrokerResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerError::ConnectionError("broker unavailable".to_string()))
        }
    }

    /// Simulates an outage: every operation fails while `false`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Snapshot of a list, head first.
    pub fn items(&self, key: &str) -> Vec<String> {
        self.with_lists(|l| {
            l.entries
                .get(key)
                .map(|list| list.iter().cloned().collect())
                .unwrap_or_default()
        })
    }

    pub fn len(&self, key: &str) -> usize {
        self.with_lists(|l| l.entries.get(key).map_or(0, VecDeque::len))
    }

    pub fn is_empty(&self, key: &str) -> bool {
        self.len(key) == 0
    }

    /// Successful pushes to `key` over the broker's lifetime.
    pub fn push_count(&self, key: &str) -> usize {
        self.with_lists(|l| l.pushes.get(key).copied().unwrap_or(0))
    }

    fn push(&self, key: &str, value: &str, front: bool) -> BrokerResult<()> {
        self.ensure_available()?;
        self.with_lists(|l| {
            let list = l.entries.entry(key.to_string()).or_default();
            if front {
                list.push_front(value.to_string());
            } else {
                list.push_back(value.to_string());
            }
            *l.pushes.entry(key.to_string()).or_insert(0) += 1;
        });
        self.notify.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn push_left(&self, key: &str, value: &str) -> BrokerResult<()> {
        self.push(key, value, true)
    }

    async fn push_right(&self, key: &str, value: &str) -> BrokerResult<()> {
        self.push(key, value, false)
    }

    async fn blocking_pop_right(
        &self,
        key: &str,
        timeout: Duration,
    ) -> BrokerResult<Option<(String, String)>> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before checking so a concurrent push cannot be missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            self.ensure_available()?;
            let popped = self.with_lists(|l| l.entries.get_mut(key).and_then(VecDeque::pop_back));
            if let Some(value) = popped {
                return Ok(Some((key.to_string(), value)));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fifo_order() {
        let broker = MemoryBroker::new();
        broker.push_left("q", "a").await.unwrap();
        broker.push_left("q", "b").await.unwrap();
        assert_eq!(broker.items("q"), vec!["b", "a"]);

        let first = broker.blocking_pop_right("q", Duration::from_millis(10)).await.unwrap();
        assert_eq!(first, Some(("q".to_string(), "a".to_string())));
    }

    #[tokio::test]
    async fn test_push_right_is_popped_next() {
        let broker = MemoryBroker::new();
        broker.push_left("q", "old").await.unwrap();
        broker.push_right("q", "returned").await.unwrap();
        let next = broker.blocking_pop_right("q", Duration::from_millis(10)).await.unwrap();
        assert_eq!(next.map(|(_, v)| v), Some("returned".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_times_out_on_empty_list() {
        let broker = MemoryBroker::new();
        let popped = broker.blocking_pop_right("q", Duration::from_secs(5)).await.unwrap();
        assert!(popped.is_none());
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let broker = Arc::new(MemoryBroker::new());
        let waiter = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move { broker.blocking_pop_right("q", Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.push_left("q", "job").await.unwrap();

        let popped = waiter.await.unwrap().unwrap();
        assert_eq!(popped.map(|(_, v)| v), Some("job".to_string()));
    }

    #[tokio::test]
    async fn test_unavailable_broker_fails() {
        let broker = MemoryBroker::new();
        broker.set_available(false);
        assert!(broker.push_left("q", "a").await.is_err());
        assert!(broker
            .blocking_pop_right("q", Duration::from_millis(10))
            .await
            .is_err());
        assert_eq!(broker.push_count("q"), 0);
    }
}
