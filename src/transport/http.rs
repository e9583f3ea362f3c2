use super::{CallContext, ProviderRequest, ProviderResponse, Transport};
use crate::error_code::StandardErrorCode;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use std::env;
use std::time::Duration;
use url::Url;

/// JSON-over-HTTP transport for model APIs, source-control APIs and local
/// inference servers that speak plain HTTP.
pub struct HttpTransport {
    provider: String,
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
    probe_path: String,
}

impl HttpTransport {
    pub fn new(provider: impl Into<String>, base_url: &str) -> Result<Self> {
        let provider = provider.into();
        let mut base_url = Url::parse(base_url).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid base url: {}", e),
                ErrorContext::new()
                    .with_field_path(format!("providers.{}.base_url", provider))
                    .with_source("http_transport"),
            )
        })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        // Pool defaults are env-overridable, per-call deadlines come from CallContext.
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(
                env::var("AI_HTTP_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(32),
            )
            .pool_idle_timeout(Some(Duration::from_secs(
                env::var("AI_HTTP_POOL_IDLE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(90),
            )))
            .build()
            .map_err(|e| Error::transport(provider.clone(), e.to_string()))?;

        let api_key = env::var(format!(
            "{}_API_KEY",
            provider.to_uppercase().replace('-', "_")
        ))
        .ok();

        Ok(Self {
            provider,
            client,
            base_url,
            api_key,
            probe_path: "/".to_string(),
        })
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_probe_path(mut self, path: impl Into<String>) -> Self {
        self.probe_path = path.into();
        self
    }

    fn url_for(&self, endpoint: &str) -> Result<Url> {
        self.base_url
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| {
                Error::validation_with_context(
                    format!("invalid endpoint: {}", e),
                    ErrorContext::new()
                        .with_field_path("request.endpoint")
                        .with_details(endpoint.to_string())
                        .with_source("http_transport"),
                )
            })
    }

    fn map_reqwest(&self, e: reqwest::Error, budget_ms: u64) -> Error {
        if e.is_timeout() {
            Error::Timeout {
                provider: self.provider.clone(),
                timeout_ms: budget_ms,
            }
        } else {
            Error::transport(self.provider.clone(), e.to_string())
        }
    }

    fn error_code_from_body(body: &str) -> Option<StandardErrorCode> {
        let json: serde_json::Value = serde_json::from_str(body).ok()?;
        let code = json
            .get("error")
            .and_then(|e| e.get("code").or_else(|| e.get("type")))
            .and_then(|v| v.as_str())?;
        StandardErrorCode::from_provider_code(code)
    }

    async fn send(
        &self,
        request: &ProviderRequest,
        ctx: &CallContext,
    ) -> Result<ProviderResponse> {
        let url = self.url_for(&request.endpoint)?;
        let mut req = match request.method.as_str() {
            "POST" => self.client.post(url).json(&request.params),
            "PUT" => self.client.put(url).json(&request.params),
            "PATCH" => self.client.patch(url).json(&request.params),
            "DELETE" => self.client.delete(url),
            _ => {
                let mut get = self.client.get(url);
                if let Some(obj) = request.params.as_object() {
                    let query: Vec<(String, String)> = obj
                        .iter()
                        .map(|(k, v)| match v.as_str() {
                            Some(s) => (k.clone(), s.to_string()),
                            None => (k.clone(), v.to_string()),
                        })
                        .collect();
                    get = get.query(&query);
                }
                get
            }
        };

        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        for (k, v) in &request.headers {
            req = req.header(k, v);
        }
        let budget_ms = remaining_ms(ctx);
        if let Some(remaining) = ctx.remaining() {
            req = req.timeout(remaining);
        }

        let resp = req.send().await.map_err(|e| self.map_reqwest(e, budget_ms))?;
        let status = resp.status().as_u16();

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            let code = classify_status(status, Self::error_code_from_body(&body));
            tracing::debug!(
                provider = self.provider.as_str(),
                http_status = status,
                standard_code = code.code(),
                endpoint = request.endpoint.as_str(),
                "upstream returned error status"
            );
            return Err(Error::Upstream {
                provider: self.provider.clone(),
                status,
                code,
                message: body,
            });
        }

        let bytes = resp.bytes().await.map_err(|e| self.map_reqwest(e, budget_ms))?;
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok(ProviderResponse::new(self.provider.clone(), status, body))
    }
}

/// Standard code for an error response.
///
/// A provider's own error code only refines client errors (4xx); a 5xx stays a
/// server-side failure whatever its body claims.
fn classify_status(status: u16, body_code: Option<StandardErrorCode>) -> StandardErrorCode {
    let from_status = StandardErrorCode::from_http_status(status);
    match body_code {
        Some(code) if (400..500).contains(&status) => code,
        _ => from_status,
    }
}

fn remaining_ms(ctx: &CallContext) -> u64 {
    ctx.remaining()
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, request: &ProviderRequest, ctx: CallContext) -> Result<ProviderResponse> {
        tokio::select! {
            res = self.send(request, &ctx) => res,
            _ = ctx.cancelled() => Err(Error::Cancelled { provider: self.provider.clone() }),
        }
    }

    async fn probe(&self, ctx: CallContext) -> Result<()> {
        let url = self.url_for(&self.probe_path)?;
        let mut req = self.client.get(url);
        let budget_ms = remaining_ms(&ctx);
        if let Some(remaining) = ctx.remaining() {
            req = req.timeout(remaining);
        }
        let resp = tokio::select! {
            res = req.send() => res.map_err(|e| self.map_reqwest(e, budget_ms))?,
            _ = ctx.cancelled() => return Err(Error::Cancelled { provider: self.provider.clone() }),
        };
        let status = resp.status().as_u16();
        // Any answer short of a server error means the process is up.
        if status >= 500 {
            return Err(Error::upstream(self.provider.clone(), status, "probe failed"));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.provider
    }
}
