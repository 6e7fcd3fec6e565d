//! # Tracefold Lifecycle
//!
//! One [`RequestController`] governs one in-flight request per surface: it
//! hands out the cancellation token shared by the agent loop and its
//! outbound calls, arms the request deadline, and wraps completion calls in
//! bounded retry with linear backoff.
//!
//! [`cancel_pending`] rewrites the invocations an aborted request left
//! unresolved so the view builders render them as cancelled.

pub mod cancel;
pub mod controller;

pub use cancel::{abort_and_cancel, cancel_pending};
pub use controller::{LifecyclePolicy, RequestController, RequestState, TimeoutGuard};
pub use tokio_util::sync::CancellationToken;
