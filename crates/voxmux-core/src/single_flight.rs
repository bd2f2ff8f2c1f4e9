use crate::cache::CacheKey;
use crate::error::SynthesisError;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

type SharedResult<T> = Shared<BoxFuture<'static, Result<T, SynthesisError>>>;

/// How a caller took part in a flight
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Started the producer
    Leader,
    /// Attached to a producer already running
    Follower,
}

struct Flight<T: Clone> {
    id: u64,
    result: SharedResult<T>,
}

type FlightMap<T> = Arc<Mutex<HashMap<CacheKey, Flight<T>>>>;

fn lock<T: Clone>(flights: &FlightMap<T>) -> MutexGuard<'_, HashMap<CacheKey, Flight<T>>> {
    flights.lock().unwrap_or_else(|e| e.into_inner())
}

/// Removes the flight once its producer task ends, however it ends
struct FlightGuard<T: Clone> {
    flights: FlightMap<T>,
    key: CacheKey,
    id: u64,
}

impl<T: Clone> Drop for FlightGuard<T> {
    fn drop(&mut self) {
        let mut flights = lock(&self.flights);
        if flights.get(&self.key).is_some_and(|f| f.id == self.id) {
            flights.remove(&self.key);
        }
    }
}

/// Collapses concurrent work on the same key into one execution
///
/// The producer runs on its own task, so it finishes even if every caller
/// stops waiting.
pub struct SingleFlightCoordinator<T: Clone> {
    flights: FlightMap<T>,
    next_id: AtomicU64,
}

impl<T> Default for SingleFlightCoordinator<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SingleFlightCoordinator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Share the flight for `key`, starting `producer` if there is none
    pub async fn join<F, Fut>(
        &self,
        key: &CacheKey,
        producer: F,
    ) -> (Result<T, SynthesisError>, Role)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SynthesisError>> + Send + 'static,
    {
        let (result, role) = {
            let mut flights = lock(&self.flights);
            match flights.get(key) {
                Some(flight) => (flight.result.clone(), Role::Follower),
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let guard = FlightGuard {
                        flights: Arc::clone(&self.flights),
                        key: key.clone(),
                        id,
                    };
                    let work = producer();
                    let task = tokio::spawn(async move {
                        let _guard = guard;
                        work.await
                    });
                    let result = async move {
                        task.await.unwrap_or_else(|e| {
                            Err(SynthesisError::ServiceUnavailable {
                                attempts: 0,
                                last_error: format!("synthesis task failed: {e}"),
                            })
                        })
                    }
                    .boxed()
                    .shared();
                    flights.insert(
                        key.clone(),
                        Flight {
                            id,
                            result: result.clone(),
                        },
                    );
                    (result, Role::Leader)
                }
            }
        };

        if role == Role::Follower {
            log::debug!("Joined in-flight synthesis for {key}");
        }
        (result.await, role)
    }

    /// Number of keys currently in flight
    pub fn in_flight(&self) -> usize {
        lock(&self.flights).len()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        lock(&self.flights).contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;
    use voxmux_speech::{AudioFormat, QualityTier};

    fn key(text: &str) -> CacheKey {
        CacheKey::compute(text, "v1", "auto", QualityTier::Medium, AudioFormat::Wav)
    }

    #[tokio::test]
    async fn test_concurrent_joins_share_one_execution() {
        let coordinator = Arc::new(SingleFlightCoordinator::<String>::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let coordinator = Arc::clone(&coordinator);
            let runs = Arc::clone(&runs);
            let gate = Arc::clone(&gate);
            tasks.push(tokio::spawn(async move {
                coordinator
                    .join(&key("hello"), move || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        gate.notified().await;
                        Ok("audio".to_string())
                    })
                    .await
            }));
        }

        while coordinator.in_flight() == 0 || runs.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        // Let every joiner attach before the producer finishes
        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.notify_one();

        let mut leaders = 0;
        for task in tasks {
            let (result, role) = task.await.unwrap();
            assert_eq!(result.unwrap(), "audio");
            if role == Role::Leader {
                leaders += 1;
            }
        }
        assert_eq!(leaders, 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_errors_reach_every_waiter_and_release_the_key() {
        let coordinator = Arc::new(SingleFlightCoordinator::<String>::new());
        let gate = Arc::new(Notify::new());

        let leader = {
            let coordinator = Arc::clone(&coordinator);
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                coordinator
                    .join(&key("x"), move || async move {
                        gate.notified().await;
                        Err(SynthesisError::NoBackendAvailable)
                    })
                    .await
            })
        };
        while !coordinator.contains(&key("x")) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let follower = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .join(&key("x"), || async { Ok("unused".to_string()) })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.notify_one();

        let (leader_result, leader_role) = leader.await.unwrap();
        let (follower_result, follower_role) = follower.await.unwrap();
        assert_eq!(leader_role, Role::Leader);
        assert_eq!(follower_role, Role::Follower);
        assert_eq!(leader_result, Err(SynthesisError::NoBackendAvailable));
        assert_eq!(follower_result, leader_result);
        assert!(!coordinator.contains(&key("x")));
    }

    #[tokio::test]
    async fn test_sequential_joins_run_again() {
        let coordinator = SingleFlightCoordinator::<u32>::new();
        let (first, _) = coordinator.join(&key("a"), || async { Ok(1) }).await;
        let (second, role) = coordinator.join(&key("a"), || async { Ok(2) }).await;
        assert_eq!(first, Ok(1));
        assert_eq!(second, Ok(2));
        assert_eq!(role, Role::Leader);
    }

    #[tokio::test]
    async fn test_producer_outlives_abandoned_leader() {
        let coordinator = Arc::new(SingleFlightCoordinator::<u32>::new());
        let finished = Arc::new(AtomicUsize::new(0));

        let done = Arc::clone(&finished);
        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            coordinator.join(&key("slow"), move || async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            }),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert!(!coordinator.contains(&key("slow")));
    }

    #[tokio::test]
    async fn test_panicking_producer_is_reported() {
        let coordinator = SingleFlightCoordinator::<u32>::new();
        let (result, _) = coordinator
            .join(&key("boom"), || async {
                if key("boom").as_str().len() == 64 {
                    panic!("producer exploded");
                }
                Ok(0)
            })
            .await;
        assert!(matches!(result, Err(SynthesisError::ServiceUnavailable { .. })));
        assert!(!coordinator.contains(&key("boom")));
    }
}
