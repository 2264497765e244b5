/*!
 * The device document.
 *
 * A JSON object whose keys are device names, plus three reserved keys:
 *
 * ```json
 * {
 *     "exhaust_fan": {"device": "Fan", "pin": 17},
 *     "porch": {"device": "VirtualToggleButton", "pin": 3},
 *     "network": {"port": 8080},
 *     "chains": {
 *         "night": [{"device": "exhaust_fan", "action": "set", "value": 20}]
 *     },
 *     "events": [
 *         {"device": "porch", "state": "on", "action": [
 *             {"device": {"name": "exhaust_fan", "action": "on"}},
 *             {"webhook": {"url": "http://hub.local/porch", "method": "POST", "body": "{device}={state}"}}
 *         ]}
 *     ]
 * }
 * ```
 *
 * Parsing only checks shape. Name and action references are resolved when
 * the registry is built.
 */
use std::str::FromStr;

use serde::Deserialize;
use serde_json::{Map, Value as Json};

use breadboard_core::error::ConfigError;
use breadboard_core::types::{Parameters, Value};
use breadboard_devices::DeviceDefinition;

use crate::action::ActionSpec;
use crate::webhook::{Method, WebhookSpec};

/// Key holding network settings
pub const NETWORK_KEY: &str = "network";
/// Key holding chains
pub const CHAINS_KEY: &str = "chains";
/// Key holding event rules
pub const EVENTS_KEY: &str = "events";

const RESERVED_KEYS: [&str; 3] = [NETWORK_KEY, CHAINS_KEY, EVENTS_KEY];

/// Network section; association fields are kept for the transport layer
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Network name
    pub ssid: Option<String>,
    /// Network password
    pub password: Option<String>,
    /// `client` or `ap`
    pub mode: Option<String>,
    /// Port the API listens on
    pub port: u16,
    /// Address the API binds to
    pub hosts: String,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            ssid: None,
            password: None,
            mode: None,
            port: 80,
            hosts: "0.0.0.0".to_string(),
        }
    }
}

/// A named, ordered list of actions
#[derive(Debug, Clone, PartialEq)]
pub struct ChainDefinition {
    /// Chain name
    pub name: String,
    /// Steps in order
    pub steps: Vec<ActionSpec>,
}

/// What a rule does when it fires
#[derive(Debug, Clone, PartialEq)]
pub enum EventAction {
    /// Dispatch an action to a device
    Device(ActionSpec),
    /// Call a webhook
    Webhook(WebhookSpec),
}

/// An event rule as written in the document
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDefinition {
    /// Device whose transitions are watched
    pub device: String,
    /// State that fires the rule
    pub state: Value,
    /// Actions run in order when the rule fires
    pub actions: Vec<EventAction>,
}

/// A parsed device document
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    /// Device definitions in document order
    pub devices: Vec<DeviceDefinition>,
    /// Chains in document order
    pub chains: Vec<ChainDefinition>,
    /// Event rules in document order
    pub events: Vec<RuleDefinition>,
    /// Network section
    pub network: NetworkSettings,
}

impl FromStr for Document {
    type Err = ConfigError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let json: Json = serde_json::from_str(text)
            .map_err(|e| ConfigError::malformed(format!("device document is not valid JSON: {}", e)))?;
        Self::from_json(&json)
    }
}

impl Document {
    /// Normalize a parsed JSON document
    pub fn from_json(json: &Json) -> Result<Self, ConfigError> {
        let root = json
            .as_object()
            .ok_or_else(|| ConfigError::malformed("device document must be a JSON object"))?;

        let mut document = Document::default();
        for (name, entry) in root {
            if RESERVED_KEYS.contains(&name.as_str()) {
                continue;
            }
            document.devices.push(parse_device(name, entry)?);
        }

        if let Some(network) = root.get(NETWORK_KEY).filter(|v| !v.is_null()) {
            document.network = NetworkSettings::deserialize(network)
                .map_err(|e| ConfigError::malformed(format!("`network`: {}", e)))?;
        }
        if let Some(chains) = root.get(CHAINS_KEY).filter(|v| !v.is_null()) {
            document.chains = parse_chains(chains)?;
        }
        if let Some(events) = root.get(EVENTS_KEY).filter(|v| !v.is_null()) {
            document.events = parse_events(events)?;
        }
        Ok(document)
    }
}

fn object<'a>(value: &'a Json, context: &str) -> Result<&'a Map<String, Json>, ConfigError> {
    value
        .as_object()
        .ok_or_else(|| ConfigError::malformed(format!("{} must be an object", context)))
}

fn string<'a>(entry: &'a Map<String, Json>, key: &str, context: &str) -> Result<&'a str, ConfigError> {
    match entry.get(key) {
        Some(Json::String(s)) => Ok(s),
        Some(_) => Err(ConfigError::malformed(format!("{}: `{}` must be a string", context, key))),
        None => Err(ConfigError::malformed(format!("{}: `{}` is missing", context, key))),
    }
}

fn parameters<'a, I>(entries: I, skip: &[&str]) -> Parameters
where
    I: IntoIterator<Item = (&'a String, &'a Json)>,
{
    entries
        .into_iter()
        .filter(|(k, _)| !skip.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), Value::from(v.clone())))
        .collect()
}

fn parse_device(name: &str, entry: &Json) -> Result<DeviceDefinition, ConfigError> {
    let context = format!("device `{}`", name);
    let entry = object(entry, &context)?;
    let tag = string(entry, "device", &context)?;
    Ok(DeviceDefinition::new(name, tag, parameters(entry, &["device"])))
}

/// A flat `{device, action, ...params}` entry
fn parse_flat_action(entry: &Map<String, Json>, context: &str) -> Result<ActionSpec, ConfigError> {
    let device = string(entry, "device", context)?;
    let action = string(entry, "action", context)?;
    Ok(ActionSpec::new(device, action, parameters(entry, &["device", "action"])))
}

/// A nested `{device: {name, action, ...params}}` entry
fn parse_nested_action(inner: &Map<String, Json>, context: &str) -> Result<ActionSpec, ConfigError> {
    let device = string(inner, "name", context)?;
    let action = string(inner, "action", context)?;
    Ok(ActionSpec::new(device, action, parameters(inner, &["name", "action"])))
}

fn parse_chains(chains: &Json) -> Result<Vec<ChainDefinition>, ConfigError> {
    object(chains, "`chains`")?
        .iter()
        .map(|(name, steps)| {
            let steps = steps
                .as_array()
                .ok_or_else(|| ConfigError::malformed(format!("chain `{}` must be an array", name)))?;
            let steps = steps
                .iter()
                .enumerate()
                .map(|(i, step)| {
                    let context = format!("chain `{}` step {}", name, i);
                    parse_flat_action(object(step, &context)?, &context)
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ChainDefinition {
                name: name.clone(),
                steps,
            })
        })
        .collect()
}

fn parse_webhook(value: &Json, context: &str) -> Result<WebhookSpec, ConfigError> {
    match value {
        Json::String(url) => WebhookSpec::new(url, Method::Get, None),
        Json::Object(entry) => {
            let url = string(entry, "url", context)?;
            let method = match entry.get("method") {
                None | Some(Json::Null) => Method::Get,
                Some(Json::String(m)) => m.parse()?,
                Some(_) => return Err(ConfigError::malformed(format!("{}: `method` must be a string", context))),
            };
            let body = match entry.get("body") {
                None | Some(Json::Null) => None,
                Some(Json::String(b)) => Some(b.clone()),
                Some(_) => return Err(ConfigError::malformed(format!("{}: `body` must be a string", context))),
            };
            WebhookSpec::new(url, method, body)
        }
        _ => Err(ConfigError::malformed(format!(
            "{}: `webhook` must be a URL or an object",
            context
        ))),
    }
}

fn parse_event_action(value: &Json, context: &str) -> Result<EventAction, ConfigError> {
    let entry = object(value, context)?;
    if let Some(webhook) = entry.get("webhook") {
        return parse_webhook(webhook, context).map(EventAction::Webhook);
    }
    match entry.get("device") {
        Some(Json::Object(inner)) => parse_nested_action(inner, context).map(EventAction::Device),
        Some(Json::String(_)) => parse_flat_action(entry, context).map(EventAction::Device),
        _ => Err(ConfigError::malformed(format!(
            "{}: expected a `device` or `webhook` entry",
            context
        ))),
    }
}

fn parse_events(events: &Json) -> Result<Vec<RuleDefinition>, ConfigError> {
    let events = events
        .as_array()
        .ok_or_else(|| ConfigError::malformed("`events` must be an array"))?;

    events
        .iter()
        .enumerate()
        .map(|(i, event)| {
            let context = format!("event {}", i);
            let entry = object(event, &context)?;
            let device = string(entry, "device", &context)?;
            let state = entry
                .get("state")
                .map(|s| Value::from(s.clone()))
                .ok_or_else(|| ConfigError::malformed(format!("{}: `state` is missing", context)))?;
            let actions = match entry.get("action") {
                Some(Json::Array(list)) => list
                    .iter()
                    .enumerate()
                    .map(|(j, a)| parse_event_action(a, &format!("{} action {}", context, j)))
                    .collect::<Result<Vec<_>, _>>()?,
                Some(single) => vec![parse_event_action(single, &format!("{} action 0", context))?],
                None => return Err(ConfigError::malformed(format!("{}: `action` is missing", context))),
            };
            Ok(RuleDefinition {
                device: device.to_string(),
                state,
                actions,
            })
        })
        .collect()
}
