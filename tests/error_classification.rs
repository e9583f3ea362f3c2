//! Tests for fallback and breaker classification of errors

use ai_lib_resilience::error_code::StandardErrorCode;
use ai_lib_resilience::{Error, ErrorContext};

#[test]
fn test_fallbackable_statuses() {
    // Transient or provider-specific failures: another provider may succeed
    for status in [401, 403, 408, 409, 429, 500, 502, 503, 504, 529] {
        let err = Error::upstream("p", status, "x");
        assert!(
            err.is_fallback_eligible(),
            "HTTP {} should be fallback-eligible",
            status
        );
        assert!(err.counts_as_failure(), "HTTP {} should count against the breaker", status);
    }
}

#[test]
fn test_request_defect_statuses() {
    // The request itself is wrong; every provider would reject it
    for status in [400, 404, 413, 422] {
        let err = Error::upstream("p", status, "x");
        assert!(
            !err.is_fallback_eligible(),
            "HTTP {} should NOT be fallback-eligible",
            status
        );
        assert!(err.is_request_defect());
        assert!(!err.counts_as_failure(), "HTTP {} must not trip the breaker", status);
    }
}

#[test]
fn test_breaker_and_transport_errors() {
    let eligible = vec![
        Error::CircuitOpen { provider: "p".into() },
        Error::Timeout { provider: "p".into(), timeout_ms: 100 },
        Error::transport("p", "reset by peer"),
    ];
    for err in eligible {
        assert!(err.is_fallback_eligible(), "{} should be fallback-eligible", err);
        assert_eq!(err.provider(), Some("p"));
    }
}

#[test]
fn test_local_errors_abort_the_chain() {
    let aborting = vec![
        Error::Cancelled { provider: "p".into() },
        Error::configuration("bad chain"),
        Error::validation_with_context("bad endpoint", ErrorContext::new()),
        Error::AggregateFallback { operation: "chat".into(), causes: vec![] },
    ];
    for err in aborting {
        assert!(!err.is_fallback_eligible(), "{} should abort the chain", err);
    }
}

#[test]
fn test_standard_codes_are_complete() {
    let all = [
        StandardErrorCode::InvalidRequest,
        StandardErrorCode::Authentication,
        StandardErrorCode::PermissionDenied,
        StandardErrorCode::NotFound,
        StandardErrorCode::RequestTooLarge,
        StandardErrorCode::RateLimited,
        StandardErrorCode::QuotaExhausted,
        StandardErrorCode::ServerError,
        StandardErrorCode::Overloaded,
        StandardErrorCode::Timeout,
        StandardErrorCode::Conflict,
        StandardErrorCode::Cancelled,
        StandardErrorCode::Unknown,
    ];
    assert_eq!(all.len(), 13, "Should have 13 standard error codes");
    for code in all {
        assert_eq!(code.fallbackable(), !code.is_request_defect());
        assert_eq!(StandardErrorCode::from_provider_code(code.name()).unwrap_or(code), code);
    }
}
