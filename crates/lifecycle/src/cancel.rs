//! Rewriting unresolved invocations after an abort.

use crate::controller::RequestController;
use tracefold_core::decode::ToolPhase;
use tracefold_core::turn::state;
use tracefold_core::{CANCELLED_MESSAGE, EventLog, StreamStatus};
use tracing::debug;

/// Mark every partial or requested invocation of the current session as
/// cancelled. Resolved invocations are left alone.
///
/// Returns how many parts were rewritten.
pub fn cancel_pending(log: &mut EventLog) -> usize {
    let mut rewritten = 0;
    for turn in log.current_session_mut() {
        for tool in turn.parts.iter_mut().filter_map(|p| p.as_tool_mut()) {
            let pending = ToolPhase::from_state(&tool.state).is_some_and(ToolPhase::is_pending);
            if !pending {
                continue;
            }
            tool.state = state::OUTPUT_ERROR.into();
            tool.error_text = Some(CANCELLED_MESSAGE.into());
            tool.cancelled = true;
            rewritten += 1;
        }
    }
    if rewritten > 0 {
        debug!(rewritten, "cancelled pending tool invocations");
    }
    rewritten
}

/// Abort the request and cancel its pending invocations.
pub fn abort_and_cancel(controller: &RequestController, log: &mut EventLog) -> usize {
    controller.abort();
    let rewritten = cancel_pending(log);
    if log.status().is_busy() {
        log.set_status(StreamStatus::Idle);
    }
    rewritten
}
