//! HTTP webhook hook.
//!
//! [`WebhookHook`] POSTs the JSON-encoded event to a configured URL. The
//! request and response are written to the task's output sink. Any non-2xx
//! status fails the hook. There is no retry.
//!
//! Properties:
//!
//! | Property       | Required | Default |
//! |----------------|----------|---------|
//! | `url`          | yes      |         |
//! | `query_params` | no       | none    |
//! | `timeout_secs` | no       | `60`    |

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use strata_core::action::ActionHook;
use strata_core::event::Event;

use super::{parse_properties, Hook, HookConfigError, HookError};
use crate::output::HookOutputWriter;

/// Type tag of this hook in action definitions.
pub const HOOK_TYPE: &str = "webhook";

/// Request timeout when the declaration sets none.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct WebhookProperties {
    url: String,
    #[serde(default)]
    query_params: BTreeMap<String, String>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

/// Delivers the event to an external HTTP endpoint.
#[derive(Debug, Clone)]
pub struct WebhookHook {
    client: reqwest::Client,
    url: Url,
    query_params: BTreeMap<String, String>,
    timeout: Duration,
}

impl WebhookHook {
    /// Build from a hook declaration, validating the URL.
    pub fn from_declaration(
        client: reqwest::Client,
        hook: &ActionHook,
    ) -> Result<Self, HookConfigError> {
        let props: WebhookProperties = parse_properties(hook)?;

        let url = Url::parse(&props.url).map_err(|e| {
            HookConfigError::InvalidProperties(format!("invalid url '{}': {e}", props.url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(HookConfigError::InvalidProperties(format!(
                "url scheme must be http or https, got '{}'",
                url.scheme()
            )));
        }

        let timeout = match props.timeout_secs {
            Some(0) => {
                return Err(HookConfigError::InvalidProperties(
                    "timeout_secs must be positive".to_string(),
                ))
            }
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_TIMEOUT,
        };

        Ok(Self {
            client,
            url,
            query_params: props.query_params,
            timeout,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Hook for WebhookHook {
    async fn run(&self, event: &Event, output: &HookOutputWriter) -> Result<(), HookError> {
        let payload = serde_json::to_string_pretty(event)?;

        let mut log = String::new();
        let _ = writeln!(log, "Request:\nPOST {}", self.url);
        for (key, value) in &self.query_params {
            let _ = writeln!(log, "  {key}={value}");
        }
        let _ = writeln!(log, "\n{payload}\n");

        let result = self
            .client
            .post(self.url.clone())
            .query(&self.query_params)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .timeout(self.timeout)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                let _ = writeln!(log, "Request failed: {e}");
                output.write(log.as_bytes()).await?;
                return Err(HookError::Request(e));
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let _ = writeln!(log, "Response:\n{status}\n\n{body}");
        output.write(log.as_bytes()).await?;

        tracing::debug!(
            run_id = output.run_id(),
            hook_id = output.hook_id(),
            url = %self.url,
            status = status.as_u16(),
            "Webhook delivered"
        );

        if !status.is_success() {
            return Err(HookError::HttpStatus(status.as_u16()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use serde_json::json;
    use strata_core::event::EventType;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::output::MemoryOutputWriter;

    fn declaration(properties: serde_json::Value) -> ActionHook {
        let serde_json::Value::Object(properties) = properties else {
            panic!("properties must be an object");
        };
        ActionHook {
            id: "notify".to_string(),
            hook_type: HOOK_TYPE.to_string(),
            description: None,
            properties,
        }
    }

    fn writer(sink: Arc<MemoryOutputWriter>) -> HookOutputWriter {
        HookOutputWriter::new("r1", "hr1", "check", "notify", sink)
    }

    fn event() -> Event {
        Event::new(EventType::PreCommit, "repo", "main", "main")
    }

    #[test]
    fn rejects_bad_urls() {
        let client = reqwest::Client::new();
        assert_matches!(
            WebhookHook::from_declaration(client.clone(), &declaration(json!({ "url": "not a url" }))),
            Err(HookConfigError::InvalidProperties(_))
        );
        assert_matches!(
            WebhookHook::from_declaration(client, &declaration(json!({ "url": "ftp://host/x" }))),
            Err(HookConfigError::InvalidProperties(_))
        );
    }

    #[test]
    fn timeout_defaults_and_overrides() {
        let client = reqwest::Client::new();
        let hook =
            WebhookHook::from_declaration(client.clone(), &declaration(json!({ "url": "http://h/" })))
                .unwrap();
        assert_eq!(hook.timeout(), DEFAULT_TIMEOUT);

        let hook = WebhookHook::from_declaration(
            client,
            &declaration(json!({ "url": "http://h/", "timeout_secs": 5 })),
        )
        .unwrap();
        assert_eq!(hook.timeout(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn posts_event_and_logs_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(query_param("source", "strata"))
            .and(body_partial_json(json!({
                "event_type": "pre-commit",
                "branch_id": "main",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string("accepted"))
            .expect(1)
            .mount(&server)
            .await;

        let hook = WebhookHook::from_declaration(
            reqwest::Client::new(),
            &declaration(json!({
                "url": format!("{}/hook", server.uri()),
                "query_params": { "source": "strata" },
            })),
        )
        .unwrap();

        let sink = Arc::new(MemoryOutputWriter::new());
        let output = writer(sink.clone());
        hook.run(&event(), &output).await.unwrap();

        let log = String::from_utf8(sink.get(&output.path()).unwrap()).unwrap();
        assert!(log.contains("POST"));
        assert!(log.contains("accepted"));
    }

    #[tokio::test]
    async fn non_success_status_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let hook = WebhookHook::from_declaration(
            reqwest::Client::new(),
            &declaration(json!({ "url": server.uri() })),
        )
        .unwrap();

        let sink = Arc::new(MemoryOutputWriter::new());
        let output = writer(sink.clone());
        let result = hook.run(&event(), &output).await;
        assert_matches!(result, Err(HookError::HttpStatus(502)));
        assert!(sink.get(&output.path()).is_some());
    }
}
