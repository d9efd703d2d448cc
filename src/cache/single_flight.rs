//! Collapse concurrent computations for the same key into one.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;

/// Concurrent callers of [`SingleFlight::run`] with the same key share one
/// computation. If the running caller is dropped, a waiting caller takes
/// over. The entry for a key goes away once the value is set or the last
/// caller for it is dropped.
pub struct SingleFlight<T> {
    calls: Mutex<HashMap<String, Call<T>>>,
}

struct Call<T> {
    cell: Arc<OnceCell<T>>,
    callers: usize,
}

/// One caller's share of a call. Releases it on drop, including when the
/// caller is cancelled mid-await.
struct Joined<'a, T> {
    calls: &'a Mutex<HashMap<String, Call<T>>>,
    key: &'a str,
    cell: Arc<OnceCell<T>>,
}

impl<T> Drop for Joined<'_, T> {
    fn drop(&mut self) {
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(call) = calls.get_mut(self.key) else {
            return;
        };
        if !Arc::ptr_eq(&call.cell, &self.cell) {
            return;
        }
        call.callers = call.callers.saturating_sub(1);
        if call.callers == 0 || call.cell.initialized() {
            calls.remove(self.key);
        }
    }
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Run `f` for `key` unless a computation for it is in flight, in which
    /// case wait for that one. Returns the value and whether this caller
    /// computed it.
    pub async fn run<F, Fut>(&self, key: &str, f: F) -> (T, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let joined = self.join(key);

        let mut leader = false;
        let value = joined
            .cell
            .get_or_init(|| {
                leader = true;
                f()
            })
            .await
            .clone();

        drop(joined);
        (value, leader)
    }

    fn join<'a>(&'a self, key: &'a str) -> Joined<'a, T> {
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        let call = calls.entry(key.to_string()).or_insert_with(|| Call {
            cell: Arc::new(OnceCell::new()),
            callers: 0,
        });
        call.callers += 1;
        Joined {
            calls: &self.calls,
            key,
            cell: call.cell.clone(),
        }
    }

    /// Keys with a computation in flight.
    pub fn in_flight(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_run() {
        let flight = Arc::new(SingleFlight::<u32>::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let flight = flight.clone();
            let runs = runs.clone();
            handles.push(tokio::spawn(async move {
                flight
                    .run("k", || async {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        7
                    })
                    .await
            }));
        }

        let mut leaders = 0;
        for handle in handles {
            let (value, leader) = handle.await.unwrap();
            assert_eq!(value, 7);
            leaders += usize::from(leader);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(leaders, 1);
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_sequential_calls_recompute() {
        let flight = SingleFlight::<u32>::new();
        let (first, leader) = flight.run("k", || async { 1 }).await;
        assert_eq!((first, leader), (1, true));
        let (second, leader) = flight.run("k", || async { 2 }).await;
        assert_eq!((second, leader), (2, true));
    }

    #[tokio::test]
    async fn test_cancelled_callers_leave_no_entries() {
        let flight = SingleFlight::<u32>::new();
        for i in 0..100 {
            let key = format!("q{i}");
            let run = flight.run(&key, || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                1
            });
            assert!(tokio::time::timeout(Duration::from_millis(1), run)
                .await
                .is_err());
        }
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_waiter_takes_over_from_cancelled_leader() {
        let flight = Arc::new(SingleFlight::<u32>::new());

        let leader = {
            let flight = flight.clone();
            tokio::spawn(async move {
                flight
                    .run("k", || async {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        1
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let waiter = {
            let flight = flight.clone();
            tokio::spawn(async move { flight.run("k", || async { 2 }).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        leader.abort();

        let (value, computed) = waiter.await.unwrap();
        assert_eq!((value, computed), (2, true));
        assert_eq!(flight.in_flight(), 0);
    }
}
