/*!
 * Outbound webhooks.
 *
 * Event rules may call an HTTP endpoint instead of a device. The engine only
 * sees the [`WebhookClient`] trait; [`HttpWebhookClient`] is the reqwest
 * implementation and [`RecordingWebhookClient`] keeps requests in memory.
 */
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tracing::{debug, warn};

use breadboard_core::error::ConfigError;
use breadboard_core::types::Value;

use crate::error::WebhookError;

/// HTTP method of a webhook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    /// GET
    #[default]
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl Method {
    /// The method name as sent on the wire
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            _ => Err(ConfigError::malformed(format!("unsupported webhook method `{}`", s))),
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A webhook as declared in an event rule
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookSpec {
    /// Target URL
    pub url: Url,
    /// HTTP method
    pub method: Method,
    /// Body template; `{device}` and `{state}` are substituted
    pub body: Option<String>,
}

impl WebhookSpec {
    /// Create a webhook, validating the URL
    pub fn new<S: AsRef<str>>(url: S, method: Method, body: Option<String>) -> Result<Self, ConfigError> {
        let url = Url::parse(url.as_ref())
            .map_err(|e| ConfigError::malformed(format!("invalid webhook URL `{}`: {}", url.as_ref(), e)))?;
        match url.scheme() {
            "http" | "https" => Ok(Self { url, method, body }),
            other => Err(ConfigError::malformed(format!(
                "webhook URL `{}` must use http or https, not {}",
                url, other
            ))),
        }
    }

    /// Build the request for one transition
    pub fn render(&self, device: &str, state: &Value) -> WebhookRequest {
        WebhookRequest {
            url: self.url.to_string(),
            method: self.method,
            body: self.body.as_deref().map(|b| render_template(b, device, state)),
        }
    }
}

/// Substitute `{device}` and `{state}` in a body template
pub fn render_template(template: &str, device: &str, state: &Value) -> String {
    template
        .replace("{device}", device)
        .replace("{state}", &state.to_string())
}

/// One outbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookRequest {
    /// Target URL
    pub url: String,
    /// HTTP method
    pub method: Method,
    /// Rendered body
    pub body: Option<String>,
}

/// Sends webhook requests
#[async_trait]
pub trait WebhookClient: Send + Sync + fmt::Debug {
    /// Send one request; resolves once the endpoint answered or the call failed
    async fn send(&self, request: WebhookRequest) -> Result<(), WebhookError>;
}

/// Webhook client backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpWebhookClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpWebhookClient {
    /// Create a client whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl WebhookClient for HttpWebhookClient {
    async fn send(&self, request: WebhookRequest) -> Result<(), WebhookError> {
        debug!(url = %request.url, method = %request.method, "Sending webhook");

        let mut builder = self
            .client
            .request(request.method.into(), &request.url)
            .timeout(self.timeout);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                WebhookError::Timeout {
                    url: request.url.clone(),
                    after: self.timeout,
                }
            } else {
                WebhookError::Transport {
                    url: request.url.clone(),
                    detail: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            warn!(url = %request.url, status = status.as_u16(), "Webhook rejected");
            Err(WebhookError::Status {
                url: request.url,
                status: status.as_u16(),
            })
        }
    }
}

/// Webhook client that records requests instead of sending them
#[derive(Debug, Default)]
pub struct RecordingWebhookClient {
    sent: Mutex<Vec<WebhookRequest>>,
    failure: Option<WebhookError>,
}

impl RecordingWebhookClient {
    /// A client whose requests all succeed
    pub fn new() -> Self {
        Self::default()
    }

    /// A client that records requests and then fails them with `error`
    pub fn failing(error: WebhookError) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failure: Some(error),
        }
    }

    /// Requests seen so far, oldest first
    pub fn sent(&self) -> Vec<WebhookRequest> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl WebhookClient for RecordingWebhookClient {
    async fn send(&self, request: WebhookRequest) -> Result<(), WebhookError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(request);
        }
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parsing() {
        assert_eq!("post".parse::<Method>().unwrap(), Method::Post);
        assert_eq!("DELETE".parse::<Method>().unwrap(), Method::Delete);
        assert!("TRACE".parse::<Method>().is_err());
        assert_eq!(Method::default(), Method::Get);
    }

    #[test]
    fn test_url_validation() {
        assert!(WebhookSpec::new("https://hub.local/hook", Method::Get, None).is_ok());
        assert!(WebhookSpec::new("hub.local/hook", Method::Get, None).is_err());
        assert!(WebhookSpec::new("ftp://hub.local/hook", Method::Get, None).is_err());
    }

    #[test]
    fn test_render_substitutes_device_and_state() {
        let spec = WebhookSpec::new(
            "http://hub.local/log",
            Method::Post,
            Some("{\"device\": \"{device}\", \"state\": \"{state}\"}".to_string()),
        )
        .unwrap();

        let request = spec.render("porch", &Value::from("on"));
        assert_eq!(request.url, "http://hub.local/log");
        assert_eq!(request.method, Method::Post);
        assert_eq!(
            request.body.as_deref(),
            Some("{\"device\": \"porch\", \"state\": \"on\"}")
        );
        assert_eq!(render_template("{state}", "dial", &Value::Integer(3)), "3");
    }

    #[tokio::test]
    async fn test_recording_client() {
        let client = RecordingWebhookClient::failing(WebhookError::Status {
            url: "http://hub.local".into(),
            status: 503,
        });
        let request = WebhookRequest {
            url: "http://hub.local".into(),
            method: Method::Get,
            body: None,
        };
        assert!(client.send(request.clone()).await.is_err());
        assert_eq!(client.sent(), vec![request]);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let client = HttpWebhookClient::new(Duration::from_millis(500));
        let err = client
            .send(WebhookRequest {
                url: "http://127.0.0.1:9/unreachable".into(),
                method: Method::Get,
                body: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WebhookError::Transport { .. } | WebhookError::Timeout { .. }
        ));
    }
}
