/*!
 * State-triggered event rules.
 *
 * Each [`EventRule`] is subscribed (by index) to the [`StateCell`] of its
 * target device when the registry is built. [`process`] drains the recorded
 * transitions and, for every transition, fires the subscribed rules whose
 * trigger equals the new state, in declaration order. Transitions caused by
 * a firing rule are queued behind the current one.
 *
 * [`StateCell`]: breadboard_devices::StateCell
 */
use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, info, warn};

use breadboard_core::config::RuntimeSettings;
use breadboard_core::types::Value;
use breadboard_devices::{DeviceTable, StateChange};

use crate::action::dispatch_spec;
use crate::document::{EventAction, RuleDefinition};
use crate::error::{EventActionError, RuleError, WebhookError};
use crate::registry::Registry;
use crate::webhook::{WebhookClient, WebhookSpec};

/// Where a rule is in its firing cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleState {
    /// Waiting for a matching transition
    #[default]
    Idle,
    /// Running its actions
    Firing,
}

/// A rule bound to a device in the registry
#[derive(Debug, Clone, PartialEq)]
pub struct EventRule {
    device: String,
    trigger: Value,
    actions: Vec<EventAction>,
    state: RuleState,
}

impl EventRule {
    /// Create an idle rule
    pub fn new<S: Into<String>>(device: S, trigger: Value, actions: Vec<EventAction>) -> Self {
        Self {
            device: device.into(),
            trigger,
            actions,
            state: RuleState::Idle,
        }
    }

    /// The watched device
    pub fn device(&self) -> &str {
        &self.device
    }

    /// The state that fires this rule
    pub fn trigger(&self) -> &Value {
        &self.trigger
    }

    /// Actions in firing order
    pub fn actions(&self) -> &[EventAction] {
        &self.actions
    }

    /// Current firing state
    pub fn state(&self) -> RuleState {
        self.state
    }

    /// Whether `change` lands on this rule's trigger
    pub fn matches(&self, change: &StateChange) -> bool {
        change.device == self.device && change.to == self.trigger
    }
}

impl From<&RuleDefinition> for EventRule {
    fn from(def: &RuleDefinition) -> Self {
        EventRule::new(def.device.clone(), def.state.clone(), def.actions.clone())
    }
}

/// The result of one fired rule
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    /// Rule index in declaration order
    pub rule: usize,
    /// Device whose transition fired the rule
    pub device: String,
    /// The state the device moved to
    pub state: Value,
    /// Whether every action succeeded
    pub result: Result<(), RuleError>,
}

/// Transitions dropped because rules kept re-triggering each other
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeOverflow {
    /// The configured depth limit
    pub limit: usize,
    /// Transitions that were never processed
    pub dropped: usize,
}

/// What one call to [`process`] did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventReport {
    /// Transitions taken off the queue
    pub transitions: usize,
    /// Fired rules in firing order
    pub outcomes: Vec<RuleOutcome>,
    /// Set when the cascade limit was hit
    pub overflow: Option<CascadeOverflow>,
}

impl EventReport {
    /// Whether nothing happened
    pub fn is_empty(&self) -> bool {
        self.transitions == 0 && self.overflow.is_none()
    }

    /// Errors of the rules that failed
    pub fn failures(&self) -> impl Iterator<Item = &RuleError> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err())
    }

    /// Log failures and the overflow, if any
    pub fn log(&self) {
        for err in self.failures() {
            warn!(rule = err.rule, device = %err.device, "{}", err);
        }
        if let Some(overflow) = self.overflow {
            warn!(
                limit = overflow.limit,
                dropped = overflow.dropped,
                "Event cascade exceeded its depth limit, dropping remaining transitions"
            );
        }
    }
}

fn drain_changes(devices: &mut DeviceTable) -> Vec<StateChange> {
    devices
        .iter_mut()
        .filter_map(|d| d.as_stateful_mut())
        .flat_map(|s| s.state_cell_mut().take_changes())
        .collect()
}

async fn call_webhook(
    webhooks: &dyn WebhookClient,
    hook: &WebhookSpec,
    change: &StateChange,
    timeout: Duration,
) -> Result<(), WebhookError> {
    let request = hook.render(&change.device, &change.to);
    let url = request.url.clone();
    match tokio::time::timeout(timeout, webhooks.send(request)).await {
        Ok(result) => result,
        Err(_) => Err(WebhookError::Timeout { url, after: timeout }),
    }
}

/// Process every pending transition and fire matching rules
///
/// Transitions recorded while a rule fires are appended to the queue one
/// cascade level deeper. A transition deeper than `max_cascade` ends the
/// call and everything still queued is dropped.
pub async fn process(
    registry: &mut Registry,
    webhooks: &dyn WebhookClient,
    settings: &RuntimeSettings,
) -> EventReport {
    let mut report = EventReport::default();
    let mut queue: VecDeque<(StateChange, usize)> =
        drain_changes(&mut registry.devices).into_iter().map(|c| (c, 0)).collect();

    while let Some((change, depth)) = queue.pop_front() {
        if depth > settings.max_cascade {
            report.overflow = Some(CascadeOverflow {
                limit: settings.max_cascade,
                dropped: queue.len() + 1,
            });
            break;
        }
        report.transitions += 1;
        debug!(device = %change.device, from = %change.from, to = %change.to, depth, "Processing transition");

        let observers = registry
            .devices
            .stateful(&change.device)
            .map(|s| s.state_cell().observers().to_vec())
            .unwrap_or_default();

        for idx in observers {
            let fires = registry.rules.get(idx).map_or(false, |r| r.matches(&change));
            if !fires {
                continue;
            }

            info!(rule = idx, device = %change.device, state = %change.to, "Rule fired");
            let result = fire(registry, idx, &change, webhooks, settings, &mut queue, depth).await;
            report.outcomes.push(RuleOutcome {
                rule: idx,
                device: change.device.clone(),
                state: change.to.clone(),
                result,
            });
        }
    }

    report
}

async fn fire(
    registry: &mut Registry,
    idx: usize,
    change: &StateChange,
    webhooks: &dyn WebhookClient,
    settings: &RuntimeSettings,
    queue: &mut VecDeque<(StateChange, usize)>,
    depth: usize,
) -> Result<(), RuleError> {
    let Registry { devices, rules, .. } = registry;
    rules[idx].state = RuleState::Firing;

    let mut outcome = Ok(());
    for (step, action) in rules[idx].actions.iter().enumerate() {
        let result = match action {
            EventAction::Device(spec) => dispatch_spec(devices, spec)
                .await
                .map(|_| ())
                .map_err(EventActionError::from),
            EventAction::Webhook(hook) => call_webhook(webhooks, hook, change, settings.webhook_timeout())
                .await
                .map_err(EventActionError::from),
        };

        queue.extend(drain_changes(devices).into_iter().map(|c| (c, depth + 1)));

        if let Err(source) = result {
            outcome = Err(RuleError {
                rule: idx,
                device: change.device.clone(),
                state: change.to.clone(),
                step,
                source,
            });
            break;
        }
    }

    rules[idx].state = RuleState::Idle;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use breadboard_core::types::Parameters;
    use chrono::Utc;

    use crate::action::ActionSpec;
    use crate::webhook::Method;

    fn change(device: &str, to: &str) -> StateChange {
        StateChange {
            device: device.into(),
            from: Value::from("off"),
            to: Value::from(to),
            at: Utc::now(),
        }
    }

    #[test]
    fn test_rule_matches_exact_state_on_its_device() {
        let rule = EventRule::new(
            "porch",
            Value::from("on"),
            vec![EventAction::Device(ActionSpec::new("fan", "on", Parameters::new()))],
        );

        assert!(rule.matches(&change("porch", "on")));
        assert!(!rule.matches(&change("porch", "off")));
        assert!(!rule.matches(&change("garage", "on")));
        assert!(!rule.matches(&change("porch", "ON")));
        assert_eq!(rule.state(), RuleState::Idle);
    }

    #[tokio::test]
    async fn test_webhook_timeout_is_reported() {
        #[derive(Debug)]
        struct Stalled;

        #[async_trait::async_trait]
        impl WebhookClient for Stalled {
            async fn send(&self, _request: crate::webhook::WebhookRequest) -> Result<(), WebhookError> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }
        }

        let hook = WebhookSpec::new("http://hub.local/hook", Method::Get, None).unwrap();
        let err = call_webhook(&Stalled, &hook, &change("porch", "on"), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            WebhookError::Timeout {
                url: "http://hub.local/hook".into(),
                after: Duration::from_millis(20),
            }
        );
    }

    #[test]
    fn test_report_collects_failures() {
        let failure = RuleError {
            rule: 1,
            device: "porch".into(),
            state: Value::from("on"),
            step: 0,
            source: EventActionError::Webhook(WebhookError::Status {
                url: "http://hub.local".into(),
                status: 500,
            }),
        };
        let report = EventReport {
            transitions: 1,
            outcomes: vec![
                RuleOutcome {
                    rule: 0,
                    device: "porch".into(),
                    state: Value::from("on"),
                    result: Ok(()),
                },
                RuleOutcome {
                    rule: 1,
                    device: "porch".into(),
                    state: Value::from("on"),
                    result: Err(failure.clone()),
                },
            ],
            overflow: None,
        };

        assert!(!report.is_empty());
        assert_eq!(report.failures().collect::<Vec<_>>(), vec![&failure]);
        report.log();
        assert!(EventReport::default().is_empty());
    }
}
