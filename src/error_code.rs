//! Standard upstream error codes and their fallback semantics.
//!
//! Providers report failures in their own vocabulary (HTTP statuses, JSON
//! `error.code` strings). This module folds them into a small canonical set so
//! the orchestrator can decide, per failure, whether another provider is worth
//! trying.
//!
//! ## Fallback Semantics
//!
//! Only request defects (`InvalidRequest`, `NotFound`, `RequestTooLarge`,
//! `Cancelled`) stop a fallback chain; they also leave the provider's breaker
//! window untouched. Every other code, credentials and quotas included, moves
//! on to the next provider and counts as a provider failure.
//!
//! ## Example
//!
//! ```rust
//! use ai_lib_resilience::error_code::StandardErrorCode;
//!
//! let code = StandardErrorCode::from_http_status(429);
//! assert_eq!(code.code(), "E2001");
//! assert!(code.fallbackable());
//!
//! let code = StandardErrorCode::from_http_status(400);
//! assert!(code.is_request_defect());
//! assert!(!code.fallbackable());
//! ```

use std::fmt;

/// Canonical upstream error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardErrorCode {
    /// Request rejected as malformed (400, 422); not worth retrying elsewhere
    InvalidRequest,
    /// Credentials refused by this provider
    Authentication,
    /// Credentials valid but lacking access on this provider
    PermissionDenied,
    /// Endpoint or resource absent (404)
    NotFound,
    /// Payload over the provider's limit (413)
    RequestTooLarge,
    /// Per-account request rate exceeded (429)
    RateLimited,
    /// Billing or usage quota exhausted
    QuotaExhausted,
    /// Provider-side failure (5xx)
    ServerError,
    /// Provider shedding load (503, 529)
    Overloaded,
    /// Deadline passed upstream (408, 504)
    Timeout,
    /// Upstream state conflict (409)
    Conflict,
    /// Client closed the request (499)
    Cancelled,
    /// Anything unclassified
    Unknown,
}

impl StandardErrorCode {
    /// Returns the canonical code string (e.g., `"E1001"`).
    #[inline]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "E1001",
            Self::Authentication => "E1002",
            Self::PermissionDenied => "E1003",
            Self::NotFound => "E1004",
            Self::RequestTooLarge => "E1005",
            Self::RateLimited => "E2001",
            Self::QuotaExhausted => "E2002",
            Self::ServerError => "E3001",
            Self::Overloaded => "E3002",
            Self::Timeout => "E3003",
            Self::Conflict => "E4001",
            Self::Cancelled => "E4002",
            Self::Unknown => "E9999",
        }
    }

    /// Returns the standard name (e.g., `"invalid_request"`).
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::Authentication => "authentication",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::RequestTooLarge => "request_too_large",
            Self::RateLimited => "rate_limited",
            Self::QuotaExhausted => "quota_exhausted",
            Self::ServerError => "server_error",
            Self::Overloaded => "overloaded",
            Self::Timeout => "timeout",
            Self::Conflict => "conflict",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }

    /// The request itself is at fault and would fail identically on any provider.
    #[inline]
    pub fn is_request_defect(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest | Self::NotFound | Self::RequestTooLarge | Self::Cancelled
        )
    }

    /// Returns whether this error should trigger a fallback to another provider.
    ///
    /// Credentials, permissions and quotas are per-provider, so another
    /// provider may still succeed; only request defects stop the chain.
    #[inline]
    pub fn fallbackable(&self) -> bool {
        !self.is_request_defect()
    }

    /// Maps a provider error code/type string to the corresponding `StandardErrorCode`.
    ///
    /// Covers the standard names plus aliases used by model APIs
    /// (`"context_length_exceeded"`, `"overloaded_error"`) and source-control
    /// APIs (`"bad_credentials"`, `"secondary_rate_limit"`).
    pub fn from_provider_code(provider_code: &str) -> Option<Self> {
        let code = match provider_code {
            "invalid_request" | "invalid_request_error" | "validation_failed" => {
                Self::InvalidRequest
            }
            "authentication" | "invalid_api_key" | "authentication_error" | "bad_credentials" => {
                Self::Authentication
            }
            "permission_denied" | "permission_error" | "forbidden" => Self::PermissionDenied,
            "not_found" | "model_not_found" => Self::NotFound,
            "request_too_large" | "context_length_exceeded" => Self::RequestTooLarge,
            "rate_limited" | "rate_limit_exceeded" | "secondary_rate_limit" => Self::RateLimited,
            "quota_exhausted" | "insufficient_quota" => Self::QuotaExhausted,
            "server_error" | "internal_error" => Self::ServerError,
            "overloaded" | "overloaded_error" => Self::Overloaded,
            "timeout" => Self::Timeout,
            "conflict" => Self::Conflict,
            "cancelled" => Self::Cancelled,
            _ => return None,
        };
        Some(code)
    }

    /// Maps an HTTP status code to the most likely `StandardErrorCode`.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 | 422 => Self::InvalidRequest,
            401 => Self::Authentication,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            408 => Self::Timeout,
            409 => Self::Conflict,
            413 => Self::RequestTooLarge,
            429 => Self::RateLimited,
            499 => Self::Cancelled,
            503 | 529 => Self::Overloaded,
            504 => Self::Timeout,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for StandardErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
