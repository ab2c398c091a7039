//! Per-connector circuit breaker: failure isolation, a concurrency cap,
//! and a per-call timeout, all introspectable via `snapshot()`.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Semaphore};
use tokio::time::timeout;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BreakerStateName {
    Closed,
    Open,
    HalfOpen,
}

/// A point-in-time snapshot of a breaker's internal state, for health
/// endpoints and tests.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BreakerState {
    pub state: BreakerStateName,
    pub failures: u32,
    pub successes: u32,
    /// Milliseconds elapsed since the breaker opened, if it is OPEN.
    pub opened_ms_ago: Option<u64>,
    pub inflight: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub half_open_after: Duration,
    pub max_concurrent: usize,
    pub timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            half_open_after: Duration::from_millis(10_000),
            max_concurrent: 20,
            timeout: Duration::from_millis(30_000),
        }
    }
}

impl From<&crate::config::BreakerDefaults> for BreakerConfig {
    fn from(defaults: &crate::config::BreakerDefaults) -> Self {
        Self {
            failure_threshold: defaults.failure_threshold,
            success_threshold: defaults.success_threshold,
            half_open_after: Duration::from_millis(defaults.half_open_after_ms),
            max_concurrent: defaults.max_concurrent,
            timeout: Duration::from_millis(defaults.timeout_ms),
        }
    }
}

enum Inner {
    Closed { failures: u32 },
    Open { opened_at: Instant },
    HalfOpen { successes: u32, probe_in_flight: bool },
}

/// A per-Facade, shareable circuit breaker. Cheap to clone: state lives
/// behind an `Arc<Mutex<..>>`.
#[derive(Clone)]
pub struct Breaker {
    config: BreakerConfig,
    inner: Arc<Mutex<Inner>>,
    semaphore: Arc<Semaphore>,
    inflight: Arc<AtomicU32>,
}

impl Breaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            inflight: Arc::new(AtomicU32::new(0)),
            inner: Arc::new(Mutex::new(Inner::Closed { failures: 0 })),
            config,
        }
    }

    /// Run `f` through the breaker: fast-fail if open or over the
    /// concurrency cap, otherwise run `f` with a per-call timeout and
    /// record the outcome.
    pub async fn call<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.admit().await?;

        let permit = match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => return Err(Error::TooManyRequests),
        };
        self.inflight.fetch_add(1, Ordering::SeqCst);

        let outcome = timeout(self.config.timeout, f()).await;
        self.inflight.fetch_sub(1, Ordering::SeqCst);
        drop(permit);

        match outcome {
            Ok(Ok(value)) => {
                self.record_success().await;
                Ok(value)
            }
            Ok(Err(err)) => {
                if err.counts_as_breaker_failure() {
                    self.record_failure().await;
                }
                Err(err)
            }
            Err(_) => {
                self.record_failure().await;
                Err(Error::BreakerTimeout(self.config.timeout.as_millis() as u64))
            }
        }
    }

    /// Check CLOSED/OPEN/HALF_OPEN admission rules without starting a call.
    ///
    /// HALF_OPEN admits exactly one in-flight probe at a time: the call
    /// that flips OPEN to HALF_OPEN claims that slot itself, and every
    /// other caller fast-fails until `record_success`/`record_failure`
    /// clears it.
    async fn admit(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        match &mut *guard {
            Inner::Closed { .. } => Ok(()),
            Inner::HalfOpen { probe_in_flight, .. } => {
                if *probe_in_flight {
                    Err(Error::CircuitOpen)
                } else {
                    *probe_in_flight = true;
                    Ok(())
                }
            }
            Inner::Open { opened_at } => {
                if opened_at.elapsed() >= self.config.half_open_after {
                    *guard = Inner::HalfOpen {
                        successes: 0,
                        probe_in_flight: true,
                    };
                    Ok(())
                } else {
                    Err(Error::CircuitOpen)
                }
            }
        }
    }

    async fn record_success(&self) {
        let mut guard = self.inner.lock().await;
        match &mut *guard {
            Inner::Closed { failures } => {
                *failures = 0;
            }
            Inner::HalfOpen { successes, probe_in_flight } => {
                *successes += 1;
                if *successes >= self.config.success_threshold {
                    *guard = Inner::Closed { failures: 0 };
                } else {
                    *probe_in_flight = false;
                }
            }
            Inner::Open { .. } => {}
        }
    }

    async fn record_failure(&self) {
        let mut guard = self.inner.lock().await;
        match &mut *guard {
            Inner::Closed { failures } => {
                *failures += 1;
                if *failures >= self.config.failure_threshold {
                    *guard = Inner::Open {
                        opened_at: Instant::now(),
                    };
                }
            }
            Inner::HalfOpen { .. } => {
                *guard = Inner::Open {
                    opened_at: Instant::now(),
                };
            }
            Inner::Open { .. } => {}
        }
    }

    pub async fn snapshot(&self) -> BreakerState {
        let guard = self.inner.lock().await;
        let inflight = self.inflight.load(Ordering::SeqCst);
        match &*guard {
            Inner::Closed { failures } => BreakerState {
                state: BreakerStateName::Closed,
                failures: *failures,
                successes: 0,
                opened_ms_ago: None,
                inflight,
            },
            Inner::Open { opened_at } => BreakerState {
                state: BreakerStateName::Open,
                failures: self.config.failure_threshold,
                successes: 0,
                opened_ms_ago: Some(opened_at.elapsed().as_millis() as u64),
                inflight,
            },
            Inner::HalfOpen { successes, .. } => BreakerState {
                state: BreakerStateName::HalfOpen,
                failures: 0,
                successes: *successes,
                opened_ms_ago: None,
                inflight,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use tokio::sync::Notify;

    fn fast_config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 2,
            success_threshold: 1,
            half_open_after: Duration::from_millis(50),
            max_concurrent: 2,
            timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn opens_after_failure_threshold_then_half_opens_then_closes() {
        let breaker = Breaker::new(fast_config());

        for _ in 0..2 {
            let result: Result<()> = breaker
                .call(|| async { Err(Error::BackendError("boom".into())) })
                .await;
            assert!(result.is_err());
        }

        let result: Result<()> = breaker.call(|| async { Ok(()) }).await;
        assert!(matches!(result, Err(Error::CircuitOpen)));

        tokio::time::sleep(Duration::from_millis(60)).await;

        let result: Result<&str> = breaker.call(|| async { Ok("ok") }).await;
        assert_eq!(result.unwrap(), "ok");

        let snapshot = breaker.snapshot().await;
        assert_eq!(snapshot.state, BreakerStateName::Closed);
    }

    #[tokio::test]
    async fn concurrency_cap_fails_fast() {
        let config = BreakerConfig {
            max_concurrent: 1,
            ..fast_config()
        };
        let breaker = Breaker::new(config);
        let release = Arc::new(Notify::new());
        let started = Arc::new(AtomicBool::new(false));

        let breaker_clone = breaker.clone();
        let release_clone = release.clone();
        let started_clone = started.clone();
        let handle = tokio::spawn(async move {
            breaker_clone
                .call(|| async move {
                    started_clone.store(true, Ordering::SeqCst);
                    release_clone.notified().await;
                    Ok::<_, Error>(())
                })
                .await
        });

        while !started.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }

        let result: Result<()> = breaker.call(|| async { Ok(()) }).await;
        assert!(matches!(result, Err(Error::TooManyRequests)));

        release.notify_one();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn half_open_admits_only_one_probe_at_a_time() {
        let breaker = Breaker::new(fast_config());

        for _ in 0..2 {
            let result: Result<()> = breaker
                .call(|| async { Err(Error::BackendError("boom".into())) })
                .await;
            assert!(result.is_err());
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        let release = Arc::new(Notify::new());
        let started = Arc::new(AtomicBool::new(false));
        let breaker_clone = breaker.clone();
        let release_clone = release.clone();
        let started_clone = started.clone();
        let probe = tokio::spawn(async move {
            breaker_clone
                .call(|| async move {
                    started_clone.store(true, Ordering::SeqCst);
                    release_clone.notified().await;
                    Ok::<_, Error>(())
                })
                .await
        });

        while !started.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }

        // The first probe is still in flight; a second caller must
        // fast-fail instead of being admitted as a concurrent probe.
        let result: Result<()> = breaker.call(|| async { Ok(()) }).await;
        assert!(matches!(result, Err(Error::CircuitOpen)));

        release.notify_one();
        probe.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn timeout_counts_as_failure() {
        let breaker = Breaker::new(BreakerConfig {
            timeout: Duration::from_millis(10),
            ..fast_config()
        });
        let result: Result<()> = breaker
            .call(|| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(Error::BreakerTimeout(_))));
        let snapshot = breaker.snapshot().await;
        assert_eq!(snapshot.failures, 1);
    }
}
