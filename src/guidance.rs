//! Error Classifier
//!
//! Maps a status code to user-facing guidance (title, message, action).
//! Lookups never fail: unknown or missing codes fall back to the 500 entry.

use serde::Serialize;

/// Turn-level failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UpstreamSearchFailure,
    UpstreamGenerationFailure,
    AuthFailure,
    QuotaExhausted,
    RateLimited,
    Timeout,
    UnknownFailure,
}

/// One row of the guidance table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorGuidance {
    pub status_code: u16,
    pub kind: FailureKind,
    pub title: &'static str,
    pub message: &'static str,
    pub action: &'static str,
    pub action_url: &'static str,
}

const SUPPORT_URL: &str = "https://github.com/unclecode/crawl4ai";

static UNKNOWN: ErrorGuidance = ErrorGuidance {
    status_code: 500,
    kind: FailureKind::UnknownFailure,
    title: "Something went wrong",
    message: "We encountered an unexpected error. Please try again.",
    action: "Contact support",
    action_url: SUPPORT_URL,
};

static TABLE: [ErrorGuidance; 4] = [
    ErrorGuidance {
        status_code: 401,
        kind: FailureKind::AuthFailure,
        title: "Authentication Required",
        message: "Please check your API key is valid and properly configured.",
        action: "Get your API key",
        action_url: SUPPORT_URL,
    },
    ErrorGuidance {
        status_code: 402,
        kind: FailureKind::QuotaExhausted,
        title: "Credits Exhausted",
        message: "You've run out of credits for this billing period.",
        action: "Upgrade your plan",
        action_url: SUPPORT_URL,
    },
    ErrorGuidance {
        status_code: 429,
        kind: FailureKind::RateLimited,
        title: "Rate Limit Reached",
        message: "Too many requests. Please wait a moment before trying again.",
        action: "Learn about rate limits",
        action_url: SUPPORT_URL,
    },
    ErrorGuidance {
        status_code: 504,
        kind: FailureKind::Timeout,
        title: "Request Timeout",
        message: "This request is taking longer than expected. Try with fewer pages or simpler content.",
        action: "Optimize your request",
        action_url: SUPPORT_URL,
    },
];

/// Look up guidance for a status code
pub fn classify(status_code: u16) -> &'static ErrorGuidance {
    TABLE
        .iter()
        .find(|g| g.status_code == status_code)
        .unwrap_or(&UNKNOWN)
}

/// Exact table hit for a specific failure code; `None` for 500 and unknown codes.
pub fn lookup(status_code: u16) -> Option<&'static ErrorGuidance> {
    TABLE.iter().find(|g| g.status_code == status_code)
}

/// Same as [`classify`], for failures that carried no status code.
pub fn classify_optional(status_code: Option<u16>) -> &'static ErrorGuidance {
    status_code.map(classify).unwrap_or(&UNKNOWN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(classify(401).kind, FailureKind::AuthFailure);
        assert_eq!(classify(401).title, "Authentication Required");
        assert_eq!(classify(402).kind, FailureKind::QuotaExhausted);
        assert_eq!(classify(429).kind, FailureKind::RateLimited);
        assert_eq!(classify(504).kind, FailureKind::Timeout);
        assert_eq!(classify(500).kind, FailureKind::UnknownFailure);
    }

    #[test]
    fn test_fallback_to_500() {
        assert_eq!(classify(9999), &UNKNOWN);
        assert_eq!(classify(404).status_code, 500);
        assert_eq!(classify_optional(None).status_code, 500);
        assert_eq!(classify_optional(Some(429)).kind, FailureKind::RateLimited);
    }

    #[test]
    fn test_lookup_only_specific_codes() {
        assert_eq!(lookup(402).map(|g| g.kind), Some(FailureKind::QuotaExhausted));
        assert!(lookup(500).is_none());
        assert!(lookup(418).is_none());
    }

    #[test]
    fn test_every_entry_has_action() {
        for g in TABLE.iter().chain(std::iter::once(&UNKNOWN)) {
            assert!(!g.title.is_empty());
            assert!(!g.action.is_empty());
            assert!(g.action_url.starts_with("https://"));
        }
    }
}
