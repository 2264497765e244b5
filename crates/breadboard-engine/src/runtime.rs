/*!
 * The control loop.
 *
 * [`Runtime`] owns the registry. One task runs [`Runtime::run`], which
 * interleaves polling ticks, inbound requests and shutdown; requests arrive
 * through cloneable [`RuntimeHandle`]s. Every request and every tick is
 * followed by event processing, so a transition is fully handled before the
 * loop moves on. Polling ticks also blink the status LED when one is
 * attached.
 */
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn, Instrument};

use breadboard_core::config::RuntimeSettings;
use breadboard_core::logging::component_span;
use breadboard_devices::{Device, Heartbeat};

use crate::api::{self, Request, Response};
use crate::error::{Error, Result};
use crate::events::{self, EventReport};
use crate::registry::Registry;
use crate::webhook::WebhookClient;

const REQUEST_QUEUE: usize = 32;

struct Envelope {
    request: Request,
    reply: oneshot::Sender<Response>,
}

/// Sends requests to a running [`Runtime`]
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    sender: mpsc::Sender<Envelope>,
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope").field("request", &self.request).finish()
    }
}

impl RuntimeHandle {
    /// Submit a request and wait for its response
    pub async fn request(&self, request: Request) -> Result<Response> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(Envelope { request, reply })
            .await
            .map_err(|_| Error::runtime("runtime is not running"))?;
        response
            .await
            .map_err(|_| Error::runtime("runtime stopped before replying"))
    }
}

/// The single owner of the registry at run time
#[derive(Debug)]
pub struct Runtime {
    registry: Registry,
    webhooks: Arc<dyn WebhookClient>,
    settings: RuntimeSettings,
    requests: mpsc::Receiver<Envelope>,
    last_poll: HashMap<String, Instant>,
    heartbeat: Option<Heartbeat>,
}

impl Runtime {
    /// Create a runtime and the first handle to it
    pub fn new(registry: Registry, webhooks: Arc<dyn WebhookClient>, settings: RuntimeSettings) -> (Self, RuntimeHandle) {
        let (sender, requests) = mpsc::channel(REQUEST_QUEUE);
        let runtime = Self {
            registry,
            webhooks,
            settings,
            requests,
            last_poll: HashMap::new(),
            heartbeat: None,
        };
        (runtime, RuntimeHandle { sender })
    }

    /// Blink `heartbeat` from the polling tick
    pub fn with_heartbeat(mut self, heartbeat: Heartbeat) -> Self {
        self.heartbeat = Some(heartbeat);
        self
    }

    /// The registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Route one request, then process the transitions it caused
    pub async fn handle(&mut self, request: Request) -> Response {
        let response = api::handle(&mut self.registry, &request).await;
        self.process_events().await.log();
        response
    }

    /// Poll every device whose interval has elapsed, then process transitions
    pub async fn poll(&mut self) -> EventReport {
        let now = Instant::now();
        if let Some(heartbeat) = self.heartbeat.as_mut() {
            if let Err(e) = heartbeat.tick(now) {
                warn!(error = %e, "Status LED failed");
            }
        }
        for device in self.registry.devices.iter_mut() {
            let Some(interval) = device.poll_interval() else {
                continue;
            };
            let name = device.name().to_string();
            let due = self
                .last_poll
                .get(&name)
                .map_or(true, |last| now.duration_since(*last) >= interval);
            if !due {
                continue;
            }

            if let Err(e) = device.poll().await {
                warn!(device = %name, error = %e, "Poll failed");
            }
            self.last_poll.insert(name, now);
        }
        self.process_events().await
    }

    /// Fire rules for every pending transition
    pub async fn process_events(&mut self) -> EventReport {
        events::process(&mut self.registry, self.webhooks.as_ref(), &self.settings).await
    }

    /// Run until `shutdown` resolves or every handle is dropped; returns the registry
    pub async fn run<F>(self, shutdown: F) -> Registry
    where
        F: Future<Output = ()>,
    {
        self.run_loop(shutdown).instrument(component_span("runtime")).await
    }

    async fn run_loop<F>(mut self, shutdown: F) -> Registry
    where
        F: Future<Output = ()>,
    {
        let mut tick = tokio::time::interval(self.settings.poll_interval());
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            devices = self.registry.devices().len(),
            poll_ms = self.settings.poll_interval_ms,
            "Runtime started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = tick.tick() => {
                    self.poll().await.log();
                }
                envelope = self.requests.recv() => match envelope {
                    Some(Envelope { request, reply }) => {
                        let response = self.handle(request).await;
                        if reply.send(response).is_err() {
                            debug!("Requester went away before the reply");
                        }
                    }
                    None => {
                        info!("Every handle dropped");
                        break;
                    }
                },
            }
        }

        info!("Runtime stopped");
        self.registry
    }
}
