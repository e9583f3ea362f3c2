use crate::error_code::StandardErrorCode;
use thiserror::Error;

/// Structured error context for configuration and validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "providers.openai.timeout_ms")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected range, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "config_validator", "registry")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for resilient provider calls.
///
/// Only adapter-level outcomes cross the orchestrator boundary: a single
/// non-fallback-eligible error, or [`Error::AggregateFallback`] once every
/// provider in a chain has failed. [`Error::Cache`] is handled inside the
/// response cache and never reaches callers of `get_or_compute`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Circuit open for provider '{provider}'")]
    CircuitOpen { provider: String },

    #[error("Provider '{provider}' timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    #[error("Network transport error from '{provider}': {message}")]
    Transport { provider: String, message: String },

    #[error("Remote error from '{provider}': HTTP {status} ({code}): {message}")]
    Upstream {
        provider: String,
        status: u16,
        code: StandardErrorCode,
        message: String,
    },

    #[error("Call to '{provider}' cancelled by caller")]
    Cancelled { provider: String },

    #[error("Cache error: {message}")]
    Cache { message: String },

    #[error(
        "All {} providers failed for '{operation}': [{}]",
        .causes.len(),
        format_causes(.causes)
    )]
    AggregateFallback {
        operation: String,
        causes: Vec<Error>,
    },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

fn format_causes(causes: &[Error]) -> String {
    causes
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::configuration_with_context(msg, ErrorContext::new())
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn transport(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Transport {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Build an upstream error, deriving the standard code from the HTTP status.
    pub fn upstream(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Error::Upstream {
            provider: provider.into(),
            status,
            code: StandardErrorCode::from_http_status(status),
            message: message.into(),
        }
    }

    /// Whether the orchestrator should move on to the next provider.
    pub fn is_fallback_eligible(&self) -> bool {
        match self {
            Error::CircuitOpen { .. }
            | Error::Timeout { .. }
            | Error::Transport { .. }
            | Error::Cache { .. }
            | Error::Io(_)
            | Error::Serialization(_) => true,
            Error::Upstream { code, .. } => code.fallbackable(),
            Error::Cancelled { .. }
            | Error::AggregateFallback { .. }
            | Error::Configuration { .. }
            | Error::Validation { .. }
            | Error::Yaml(_) => false,
        }
    }

    /// The request itself is defective; no provider can serve it.
    pub fn is_request_defect(&self) -> bool {
        match self {
            Error::Upstream { code, .. } => code.is_request_defect(),
            Error::Validation { .. } => true,
            _ => false,
        }
    }

    /// Whether this outcome counts against the provider's breaker window.
    ///
    /// Request defects and caller cancellations say nothing about the
    /// provider's health.
    pub fn counts_as_failure(&self) -> bool {
        !self.is_request_defect() && !matches!(self, Error::Cancelled { .. })
    }

    /// Provider the error is attributed to, when known.
    pub fn provider(&self) -> Option<&str> {
        match self {
            Error::CircuitOpen { provider }
            | Error::Timeout { provider, .. }
            | Error::Transport { provider, .. }
            | Error::Upstream { provider, .. }
            | Error::Cancelled { provider } => Some(provider),
            _ => None,
        }
    }

    /// Short label used for metrics and audit events.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::CircuitOpen { .. } => "circuit_open",
            Error::Timeout { .. } => "timeout",
            Error::Transport { .. } | Error::Io(_) | Error::Serialization(_) => "transport",
            Error::Upstream { .. } => "upstream",
            Error::Cancelled { .. } => "cancelled",
            Error::Cache { .. } => "cache",
            Error::AggregateFallback { .. } => "aggregate_fallback",
            Error::Configuration { .. } | Error::Yaml(_) => "configuration",
            Error::Validation { .. } => "validation",
        }
    }

    /// Map transport-layer failures into the provider taxonomy.
    ///
    /// Raw I/O and decode failures become [`Error::Transport`] attributed to
    /// `provider`; already-classified errors pass through unchanged.
    pub fn classify_for(self, provider: &str) -> Self {
        match self {
            Error::Io(e) => Error::transport(provider, e.to_string()),
            Error::Serialization(e) => {
                Error::transport(provider, format!("malformed response body: {}", e))
            }
            other => other,
        }
    }

    /// Causes of an exhausted fallback chain, in chain order.
    pub fn causes(&self) -> Option<&[Error]> {
        match self {
            Error::AggregateFallback { causes, .. } => Some(causes),
            _ => None,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } | Error::Validation { context, .. } => {
                Some(context)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breaker_and_network_errors_are_fallback_eligible() {
        assert!(Error::CircuitOpen { provider: "a".into() }.is_fallback_eligible());
        assert!(Error::Timeout { provider: "a".into(), timeout_ms: 10 }.is_fallback_eligible());
        assert!(Error::transport("a", "connection reset").is_fallback_eligible());
    }

    #[test]
    fn test_upstream_client_defects_abort_fallback() {
        let bad_request = Error::upstream("a", 400, "missing field");
        assert!(!bad_request.is_fallback_eligible());
        assert!(bad_request.is_request_defect());
        assert!(!bad_request.counts_as_failure());

        let server = Error::upstream("a", 503, "overloaded");
        assert!(server.is_fallback_eligible());
        assert!(server.counts_as_failure());

        let rate_limited = Error::upstream("a", 429, "slow down");
        assert!(rate_limited.is_fallback_eligible());
    }

    #[test]
    fn test_classify_for_maps_io_to_transport() {
        let io = Error::Io(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"));
        match io.classify_for("gitlab") {
            Error::Transport { provider, .. } => assert_eq!(provider, "gitlab"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_aggregate_display_lists_causes_in_order() {
        let err = Error::AggregateFallback {
            operation: "generate_text".into(),
            causes: vec![
                Error::CircuitOpen { provider: "a".into() },
                Error::transport("b", "refused"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("All 2 providers failed for 'generate_text'"));
        assert!(msg.find("'a'").unwrap() < msg.find("'b'").unwrap());
        assert!(!err.is_fallback_eligible());
        assert_eq!(err.causes().map(|c| c.len()), Some(2));
    }

    #[test]
    fn test_configuration_context_display() {
        let err = Error::configuration_with_context(
            "unknown provider",
            ErrorContext::new()
                .with_field_path("chains.generate_text[1]")
                .with_source("config_validator"),
        );
        assert_eq!(
            err.to_string(),
            "Configuration error: unknown provider (field: chains.generate_text[1], source: config_validator)"
        );
    }
}
