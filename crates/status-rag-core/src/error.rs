//! Generation failure classification.
//!
//! Provider errors arrive as free-form messages (HTTP status lines, JSON
//! bodies, transport errors). [`classify_error`] maps them onto a closed
//! [`ErrorKind`] set by matching an ordered keyword table against the
//! lowercased message. The first matching row wins, so the order below is
//! significant: an "empty answer" is never reported as a timeout, and a
//! gateway timeout is never reported as overload.
//!
//! | Kind              | Keywords (case-insensitive substrings)                         |
//! |-------------------|----------------------------------------------------------------|
//! | `EMPTY_ANSWER`    | empty answer, empty response                                   |
//! | `TIMEOUT`         | timed out, timeout, deadline exceeded                          |
//! | `RATE_LIMIT`      | 429, rate limit, rate_limit, quota, resource_exhausted         |
//! | `AUTH`            | 401, 403, unauthorized, forbidden, invalid_api_key, api key    |
//! | `INVALID_REQUEST` | 400, 413, bad request, invalid_request, context length, ...    |
//! | `OVERLOADED`      | 502, 503, 529, overloaded, unavailable                         |
//! | `UNKNOWN`         | anything else                                                  |

use serde::Serialize;
use std::fmt;

/// Closed set of query failure kinds.
///
/// Only the generation kinds are produced by [`classify_error`]; the rest
/// are assigned directly by the pipeline stage that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// A provider could not be constructed for lack of credentials.
    NoApiKey,
    /// The corpus index could not be built.
    EmbedInitFail,
    /// The query could not be embedded.
    EmbedQueryFail,
    EmptyAnswer,
    Timeout,
    RateLimit,
    Auth,
    InvalidRequest,
    Overloaded,
    /// The embedding model or deployment does not exist (probe got a 404).
    EmbedDeploymentNotFound,
    Unknown,
    /// Unexpected pipeline failure.
    Uncaught,
}

impl ErrorKind {
    /// Wire code, e.g. `"RATE_LIMIT"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NoApiKey => "NO_API_KEY",
            ErrorKind::EmbedInitFail => "EMBED_INIT_FAIL",
            ErrorKind::EmbedQueryFail => "EMBED_QUERY_FAIL",
            ErrorKind::EmptyAnswer => "EMPTY_ANSWER",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::RateLimit => "RATE_LIMIT",
            ErrorKind::Auth => "AUTH",
            ErrorKind::InvalidRequest => "INVALID_REQUEST",
            ErrorKind::Overloaded => "OVERLOADED",
            ErrorKind::EmbedDeploymentNotFound => "EMBED_DEPLOYMENT_NOT_FOUND",
            ErrorKind::Unknown => "UNKNOWN",
            ErrorKind::Uncaught => "UNCAUGHT",
        }
    }

    /// HTTP status for a request that terminally failed with this kind.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::RateLimit => 429,
            ErrorKind::Auth => 401,
            ErrorKind::Timeout => 504,
            ErrorKind::InvalidRequest => 400,
            _ => 500,
        }
    }

    /// Whether a trimmed-context retry may help.
    pub fn is_retriable(&self) -> bool {
        matches!(self, ErrorKind::InvalidRequest | ErrorKind::Timeout)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const CLASSIFICATION: &[(ErrorKind, &[&str])] = &[
    (ErrorKind::EmptyAnswer, &["empty answer", "empty response"]),
    (
        ErrorKind::Timeout,
        &["timed out", "timeout", "deadline exceeded"],
    ),
    (
        ErrorKind::RateLimit,
        &["429", "rate limit", "rate_limit", "ratelimit", "quota", "resource_exhausted"],
    ),
    (
        ErrorKind::Auth,
        &[
            "401",
            "403",
            "unauthorized",
            "forbidden",
            "invalid_api_key",
            "api key",
            "permission denied",
            "permission_denied",
        ],
    ),
    (
        ErrorKind::InvalidRequest,
        &[
            "400",
            "413",
            "bad request",
            "invalid_request",
            "invalid_argument",
            "context_length_exceeded",
            "context length",
            "maximum context",
            "too many tokens",
            "payload too large",
            "malformed",
        ],
    ),
    (
        ErrorKind::Overloaded,
        &["502", "503", "529", "overloaded", "unavailable", "bad gateway"],
    ),
];

/// Map a provider failure message to an [`ErrorKind`].
///
/// ```rust
/// use status_rag_core::error::{classify_error, ErrorKind};
///
/// assert_eq!(classify_error("OpenAI API error 429 Too Many Requests: slow down"), ErrorKind::RateLimit);
/// assert_eq!(classify_error("connection reset"), ErrorKind::Unknown);
/// ```
pub fn classify_error(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    CLASSIFICATION
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(kind, _)| *kind)
        .unwrap_or(ErrorKind::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifies_status_lines() {
        let cases = [
            ("OpenAI API error 429 Too Many Requests: {}", ErrorKind::RateLimit),
            ("OpenAI API error 401 Unauthorized: bad key", ErrorKind::Auth),
            ("Azure OpenAI API error 403 Forbidden: nope", ErrorKind::Auth),
            (
                "OpenAI API error 400 Bad Request: context_length_exceeded",
                ErrorKind::InvalidRequest,
            ),
            ("Gemini API error 503 Service Unavailable: overloaded", ErrorKind::Overloaded),
            ("Gemini API error 500 Internal Server Error: oops", ErrorKind::Unknown),
        ];
        for (msg, kind) in cases {
            assert_eq!(classify_error(msg), kind, "{}", msg);
        }
    }

    #[test]
    fn test_timeout_variants() {
        assert_eq!(classify_error("generation timed out after 30s"), ErrorKind::Timeout);
        assert_eq!(classify_error("Deadline Exceeded"), ErrorKind::Timeout);
    }

    #[test]
    fn test_order_is_significant() {
        // Gateway timeout mentions both a timeout and unavailability.
        assert_eq!(
            classify_error("504 Gateway Timeout: upstream unavailable"),
            ErrorKind::Timeout
        );
        assert_eq!(
            classify_error("empty answer after timeout"),
            ErrorKind::EmptyAnswer
        );
        assert_eq!(
            classify_error("RESOURCE_EXHAUSTED: quota exceeded (400)"),
            ErrorKind::RateLimit
        );
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(ErrorKind::RateLimit.http_status(), 429);
        assert_eq!(ErrorKind::Auth.http_status(), 401);
        assert_eq!(ErrorKind::Timeout.http_status(), 504);
        assert_eq!(ErrorKind::InvalidRequest.http_status(), 400);
        assert_eq!(ErrorKind::Overloaded.http_status(), 500);
        assert_eq!(ErrorKind::EmptyAnswer.http_status(), 500);
        assert_eq!(ErrorKind::Unknown.http_status(), 500);
        assert_eq!(ErrorKind::NoApiKey.http_status(), 500);
        assert_eq!(ErrorKind::Uncaught.http_status(), 500);
    }

    #[test]
    fn test_retriable_kinds() {
        assert!(ErrorKind::InvalidRequest.is_retriable());
        assert!(ErrorKind::Timeout.is_retriable());
        assert!(!ErrorKind::RateLimit.is_retriable());
        assert!(!ErrorKind::Auth.is_retriable());
        assert!(!ErrorKind::EmptyAnswer.is_retriable());
    }

    #[test]
    fn test_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::EmbedDeploymentNotFound).unwrap(),
            "\"EMBED_DEPLOYMENT_NOT_FOUND\""
        );
        assert_eq!(ErrorKind::InvalidRequest.to_string(), "INVALID_REQUEST");
        for kind in [ErrorKind::NoApiKey, ErrorKind::EmbedQueryFail, ErrorKind::Uncaught] {
            assert_eq!(
                serde_json::to_string(&kind).unwrap(),
                format!("\"{}\"", kind.as_str())
            );
        }
    }
}
