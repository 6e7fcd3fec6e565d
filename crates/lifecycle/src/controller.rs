//! The request lifecycle controller.
//!
//! ```text
//! idle ──arm──▶ armed ──start_timeout──▶ in-flight ──▶ completed
//!                                           │
//!                                           ├──abort──▶ aborted
//!                                           └─deadline─▶ timed-out
//! ```
//!
//! Arming a new request cancels the token of the previous one, so a surface
//! never has two requests in flight. State lives behind a `std::sync::Mutex`
//! that is never held across an `.await`.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracefold_config::SurfaceConfig;
use tracefold_core::LifecycleError;
use tracing::{debug, warn};

/// Timeout and retry budget of one surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecyclePolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    /// Attempt `n` waits `n * retry_delay` before retrying.
    pub retry_delay: Duration,
}

impl LifecyclePolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_delay * attempt
    }

    /// The same policy with its deadline no later than `limit`.
    pub fn capped(self, limit: Duration) -> Self {
        Self {
            timeout: self.timeout.min(limit),
            ..self
        }
    }
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self::from(&SurfaceConfig::chat())
    }
}

impl From<&SurfaceConfig> for LifecyclePolicy {
    fn from(config: &SurfaceConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    Armed,
    InFlight,
    Completed,
    Aborted,
    TimedOut,
}

impl RequestState {
    fn is_live(self) -> bool {
        matches!(self, Self::Armed | Self::InFlight)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Armed => write!(f, "armed"),
            Self::InFlight => write!(f, "in-flight"),
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
            Self::TimedOut => write!(f, "timed-out"),
        }
    }
}

struct Inner {
    state: RequestState,
    token: CancellationToken,
    /// Cancels the pending deadline task, if any.
    deadline: Option<CancellationToken>,
    /// Bumped by every `arm()` so stale deadlines do nothing.
    generation: u64,
    retries: u32,
}

impl Inner {
    fn clear_deadline(&mut self) {
        if let Some(deadline) = self.deadline.take() {
            deadline.cancel();
        }
    }
}

/// Controls one in-flight request. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RequestController {
    policy: LifecyclePolicy,
    inner: Arc<Mutex<Inner>>,
}

impl fmt::Debug for RequestController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("RequestController")
            .field("policy", &self.policy)
            .field("state", &inner.state)
            .field("retries", &inner.retries)
            .finish()
    }
}

impl Default for RequestController {
    fn default() -> Self {
        Self::new(LifecyclePolicy::default())
    }
}

impl RequestController {
    pub fn new(policy: LifecyclePolicy) -> Self {
        Self {
            policy,
            inner: Arc::new(Mutex::new(Inner {
                state: RequestState::Idle,
                token: CancellationToken::new(),
                deadline: None,
                generation: 0,
                retries: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn policy(&self) -> LifecyclePolicy {
        self.policy
    }

    pub fn state(&self) -> RequestState {
        self.lock().state
    }

    /// Retries spent by the current `retry` call.
    pub fn retry_count(&self) -> u32 {
        self.lock().retries
    }

    /// Token of the current request.
    pub fn token(&self) -> CancellationToken {
        self.lock().token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().token.is_cancelled()
    }

    /// Start a new request, cancelling whatever the previous one was doing.
    pub fn arm(&self) -> CancellationToken {
        let mut inner = self.lock();
        inner.token.cancel();
        inner.clear_deadline();
        inner.token = CancellationToken::new();
        inner.generation += 1;
        inner.retries = 0;
        inner.state = RequestState::Armed;
        debug!(generation = inner.generation, "request armed");
        inner.token.clone()
    }

    /// Arm the deadline for the current request.
    ///
    /// When it expires the token is cancelled, the state becomes
    /// `TimedOut` and `on_timeout` runs. Dropping the returned guard
    /// cancels the deadline. Must be called inside a tokio runtime.
    pub fn start_timeout<F>(&self, on_timeout: F) -> TimeoutGuard
    where
        F: FnOnce() + Send + 'static,
    {
        let deadline = CancellationToken::new();
        let (generation, token) = {
            let mut inner = self.lock();
            inner.clear_deadline();
            inner.deadline = Some(deadline.clone());
            if matches!(inner.state, RequestState::Idle | RequestState::Armed) {
                inner.state = RequestState::InFlight;
            }
            (inner.generation, inner.token.clone())
        };

        let timeout = self.policy.timeout;
        let shared = Arc::clone(&self.inner);
        let watch = deadline.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = watch.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    let fired = {
                        let mut inner = shared.lock().unwrap_or_else(|e| e.into_inner());
                        let current = inner.generation == generation
                            && inner.state == RequestState::InFlight;
                        if current {
                            inner.state = RequestState::TimedOut;
                            inner.deadline = None;
                            inner.retries = 0;
                        }
                        current
                    };
                    if fired {
                        token.cancel();
                        warn!(timeout_ms = timeout.as_millis() as u64, "request timed out");
                        on_timeout();
                    }
                }
            }
        });

        TimeoutGuard { deadline }
    }

    /// Cancel the current request. Safe to call repeatedly.
    pub fn abort(&self) {
        let mut inner = self.lock();
        inner.token.cancel();
        inner.clear_deadline();
        inner.retries = 0;
        if inner.state.is_live() {
            inner.state = RequestState::Aborted;
            debug!(generation = inner.generation, "request aborted");
        }
    }

    /// Time the current request out now, as its deadline would.
    pub fn expire(&self) {
        let mut inner = self.lock();
        if inner.state.is_live() {
            inner.token.cancel();
            inner.clear_deadline();
            inner.retries = 0;
            inner.state = RequestState::TimedOut;
            debug!(generation = inner.generation, "request expired");
        }
    }

    /// Mark the current request as finished.
    pub fn complete(&self) {
        let mut inner = self.lock();
        inner.clear_deadline();
        inner.retries = 0;
        if inner.state.is_live() {
            inner.state = RequestState::Completed;
        }
    }

    /// Run `op`, retrying every failure with linear backoff.
    pub async fn retry<T, E, F, Fut>(&self, op: F) -> Result<T, LifecycleError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.retry_if(op, |_| true).await
    }

    /// Run `op`, retrying failures for which `retryable` holds.
    ///
    /// Gives up after `max_retries` retries, or immediately on a failure
    /// that is not retryable, with `RetriesExhausted`. Cancellation during
    /// an attempt or a backoff wait yields `Aborted` (or `TimedOut` when
    /// the deadline caused it).
    pub async fn retry_if<T, E, F, Fut, P>(
        &self,
        mut op: F,
        retryable: P,
    ) -> Result<T, LifecycleError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        P: Fn(&E) -> bool,
    {
        let token = self.token();
        let mut attempt: u32 = 0;

        loop {
            if token.is_cancelled() {
                return Err(self.cancellation_error());
            }
            attempt += 1;

            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(self.cancellation_error()),
                result = op() => result,
            };

            let error = match result {
                Ok(value) => {
                    self.lock().retries = 0;
                    return Ok(value);
                }
                Err(e) => e,
            };

            if attempt > self.policy.max_retries || !retryable(&error) {
                self.lock().retries = 0;
                return Err(LifecycleError::RetriesExhausted {
                    attempts: attempt,
                    last_error: error.to_string(),
                });
            }

            self.lock().retries = attempt;
            let delay = self.policy.backoff(attempt);
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "attempt failed, retrying"
            );

            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(self.cancellation_error()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Why the current token was cancelled.
    pub fn cancellation_error(&self) -> LifecycleError {
        match self.state() {
            RequestState::TimedOut => LifecycleError::TimedOut {
                timeout_ms: self.policy.timeout.as_millis() as u64,
            },
            _ => LifecycleError::Aborted,
        }
    }
}

/// Cancels its deadline when dropped or disposed.
#[must_use = "dropping the guard cancels the deadline"]
#[derive(Debug)]
pub struct TimeoutGuard {
    deadline: CancellationToken,
}

impl TimeoutGuard {
    pub fn dispose(self) {}
}

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        self.deadline.cancel();
    }
}
