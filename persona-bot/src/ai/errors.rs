//! Model API failures and how the orchestrator reacts to them
//!
//! - `RateLimited`: wait (the API's retry hint, else 60s) and retry the same key once
//! - `InvalidHistory`: rotating keys cannot help, the request is abandoned
//! - everything else: move on to the next key immediately

use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

/// Wait when a rate-limit error carries no retry hint
pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);
/// Added on top of the API's retry hint
const RETRY_HINT_MARGIN_SECS: f64 = 1.5;
/// Longest wait honored from a retry hint
pub const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(600);

static RETRY_HINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Please retry in (\d+\.?\d*)s").expect("retry hint pattern is valid"));

/// Phrases the API uses when the history itself is malformed
const HISTORY_SHAPE_MARKERS: [&str; 3] = [
    "history must begin with a user message",
    "must alternate between",
    "alternate between user and model",
];

#[derive(Debug, Clone, PartialEq)]
pub enum GenerateError {
    /// Quota or rate limit hit (HTTP 429 / RESOURCE_EXHAUSTED)
    RateLimited(String),
    /// No response within the configured deadline
    Timeout(Duration),
    /// Prompt or candidate blocked by safety filters
    SafetyBlocked(String),
    /// The API rejected the shape of the conversation history
    InvalidHistory(String),
    /// A response arrived but carried no text
    EmptyResponse(String),
    Other(String),
}

impl std::fmt::Display for GenerateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerateError::RateLimited(msg) => write!(f, "rate limited: {}", msg),
            GenerateError::Timeout(after) => write!(f, "request timed out after {:?}", after),
            GenerateError::SafetyBlocked(msg) => write!(f, "blocked by safety filters: {}", msg),
            GenerateError::InvalidHistory(msg) => write!(f, "invalid history: {}", msg),
            GenerateError::EmptyResponse(msg) => write!(f, "empty response: {}", msg),
            GenerateError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl GenerateError {
    /// Classify an error response from the API
    pub fn from_api_error(http_status: u16, api_status: Option<&str>, message: &str) -> Self {
        if http_status == 429 || api_status == Some("RESOURCE_EXHAUSTED") {
            GenerateError::RateLimited(message.to_string())
        } else if is_history_shape_error(message) {
            GenerateError::InvalidHistory(message.to_string())
        } else {
            GenerateError::Other(format!("Gemini API error {}: {}", http_status, message))
        }
    }

    /// Short label used in log lines
    pub fn label(&self) -> &'static str {
        match self {
            GenerateError::RateLimited(_) => "RATE_LIMIT",
            GenerateError::Timeout(_) => "TIMEOUT",
            GenerateError::SafetyBlocked(_) => "SAFETY",
            GenerateError::InvalidHistory(_) => "HISTORY_INVALID",
            GenerateError::EmptyResponse(_) => "EMPTY_RESPONSE",
            GenerateError::Other(_) => "ERROR",
        }
    }
}

/// Check whether an error message complains about the history shape
pub fn is_history_shape_error(message: &str) -> bool {
    let message = message.to_lowercase();
    HISTORY_SHAPE_MARKERS.iter().any(|marker| message.contains(marker))
}

/// How long to wait after a rate-limit error before trying again.
/// Hints longer than `MAX_RATE_LIMIT_WAIT` are capped.
pub fn rate_limit_delay(message: &str) -> Duration {
    let Some(secs) = RETRY_HINT
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|secs| secs.as_str().parse::<f64>().ok())
    else {
        return DEFAULT_RATE_LIMIT_WAIT;
    };

    Duration::try_from_secs_f64(secs + RETRY_HINT_MARGIN_SECS)
        .map(|delay| delay.min(MAX_RATE_LIMIT_WAIT))
        .unwrap_or(MAX_RATE_LIMIT_WAIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_delay_uses_hint_plus_margin() {
        let delay = rate_limit_delay("429 Resource exhausted. Please retry in 3.2s.");
        assert!((delay.as_secs_f64() - 4.7).abs() < 1e-9);

        let delay = rate_limit_delay("Please retry in 12s");
        assert!((delay.as_secs_f64() - 13.5).abs() < 1e-9);
    }

    #[test]
    fn test_rate_limit_delay_defaults_to_sixty_seconds() {
        assert_eq!(rate_limit_delay("quota exceeded"), Duration::from_secs(60));
        assert_eq!(rate_limit_delay("Please retry soon"), Duration::from_secs(60));
    }

    #[test]
    fn test_rate_limit_delay_caps_huge_hints() {
        assert_eq!(
            rate_limit_delay("Please retry in 99999999999999999999999s"),
            MAX_RATE_LIMIT_WAIT
        );
        assert_eq!(rate_limit_delay("Please retry in 3600s"), MAX_RATE_LIMIT_WAIT);
        let digits = "9".repeat(400);
        assert_eq!(
            rate_limit_delay(&format!("Please retry in {}s", digits)),
            MAX_RATE_LIMIT_WAIT
        );
    }

    #[test]
    fn test_history_shape_errors() {
        assert!(is_history_shape_error("history must begin with a user message"));
        assert!(is_history_shape_error(
            "Please ensure that multiturn requests alternate between user and model."
        ));
        assert!(is_history_shape_error("Contents must alternate between user and model"));
        assert!(!is_history_shape_error("API key not valid"));
    }

    #[test]
    fn test_from_api_error_classification() {
        assert!(matches!(
            GenerateError::from_api_error(429, None, "slow down"),
            GenerateError::RateLimited(_)
        ));
        assert!(matches!(
            GenerateError::from_api_error(400, Some("RESOURCE_EXHAUSTED"), "quota"),
            GenerateError::RateLimited(_)
        ));
        assert!(matches!(
            GenerateError::from_api_error(400, Some("INVALID_ARGUMENT"), "history must begin with a user message"),
            GenerateError::InvalidHistory(_)
        ));
        assert_eq!(
            GenerateError::from_api_error(403, Some("PERMISSION_DENIED"), "API key not valid"),
            GenerateError::Other("Gemini API error 403: API key not valid".to_string())
        );
    }
}
