//! User-facing rendering of transport errors.

use serde::Serialize;

/// Shown under timeout errors.
pub const TIMEOUT_HINT: &str =
    "The request took too long to complete. Please try again with a shorter description.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBanner {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl std::fmt::Display for ErrorBanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Error: {}", self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, "\n{hint}")?;
        }
        Ok(())
    }
}

/// Build the banner for a transport error message.
pub fn error_banner(message: &str) -> ErrorBanner {
    let lower = message.to_lowercase();
    let hint = (lower.contains("timeout") || lower.contains("timed out"))
        .then(|| TIMEOUT_HINT.to_string());
    ErrorBanner {
        message: message.to_string(),
        hint,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_messages_get_hint() {
        assert_eq!(error_banner("Request timeout").hint.as_deref(), Some(TIMEOUT_HINT));
        assert!(error_banner("request timed out after 60s").hint.is_some());
    }

    #[test]
    fn other_errors_have_no_hint() {
        let banner = error_banner("HTTP 500");
        assert!(banner.hint.is_none());
        assert_eq!(banner.to_string(), "Error: HTTP 500");
    }
}
