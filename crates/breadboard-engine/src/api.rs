/*!
 * Transport-agnostic request routing.
 *
 * | Path                 | Effect                      |
 * |----------------------|-----------------------------|
 * | `/`                  | registry description        |
 * | `/chains/<name>`     | run a chain                 |
 * | `/<device>/<action>` | dispatch one action         |
 *
 * Query parameters become action parameters as strings; device kinds
 * coerce them.
 */
use tracing::debug;

use breadboard_core::types::{Parameters, Value};

use crate::error::StatusClass;
use crate::registry::Registry;

/// Path segment reserved for chains
pub const CHAINS_SEGMENT: &str = "chains";

/// One inbound request
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Request {
    /// Request path, e.g. `/lights/set`
    pub path: String,
    /// Query parameters
    pub params: Parameters,
}

impl Request {
    /// Create a request
    pub fn new<S: Into<String>>(path: S, params: Parameters) -> Self {
        Self {
            path: path.into(),
            params,
        }
    }

    /// Create a request from decoded query pairs
    pub fn from_query<S, I, K, V>(path: S, query: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let params = query
            .into_iter()
            .map(|(k, v)| (k.into(), Value::String(v.into())))
            .collect();
        Self::new(path, params)
    }
}

/// Status code and JSON body of a handled request
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: Value,
}

impl Response {
    /// A 200 response; a null value becomes `{}`
    pub fn ok(body: Value) -> Self {
        let body = if body.is_null() { Value::empty() } else { body };
        Self { status: 200, body }
    }

    /// An `{"error": ...}` response
    pub fn error<S: AsRef<str>>(class: StatusClass, message: S) -> Self {
        Self {
            status: class.code(),
            body: Value::object([("error", Value::from(message.as_ref()))]),
        }
    }

    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Route one request against the registry
pub async fn handle(registry: &mut Registry, request: &Request) -> Response {
    let segments: Vec<&str> = request.path.split('/').filter(|s| !s.is_empty()).collect();

    let response = match segments.as_slice() {
        [] => Response::ok(registry.describe()),
        [CHAINS_SEGMENT, chain] => match registry.run_chain(chain).await {
            Ok(()) => Response::ok(Value::empty()),
            Err(e) => Response::error(e.status_class(), e.to_string()),
        },
        [device, action] => match registry.dispatch(device, action, &request.params).await {
            Ok(value) => Response::ok(value),
            Err(e) => Response::error(e.status_class(), e.to_string()),
        },
        _ => Response::error(StatusClass::NotFound, format!("no route for `{}`", request.path)),
    };

    debug!(path = %request.path, status = response.status, "Handled request");
    response
}
