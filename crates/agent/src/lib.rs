//! The agent loop.
//!
//! Each surface runs the same **Call → Act → Observe** cycle:
//!
//! 1. **Rebuild** the model-facing messages from the event log
//! 2. **Stream** a completion from the provider, forwarding deltas
//! 3. **If tool calls**: execute them, fold the results into the log, loop
//! 4. **Otherwise** (or when the surface's termination policy says so): done
//!
//! Every step is reported as an [`AgentStreamEvent`] so that clients can
//! fold the same events into their own log.

pub mod runner;
pub mod surface;

pub use runner::AgentRunner;
pub use surface::{Surface, Termination};
pub use tracefold_core::AgentStreamEvent;
