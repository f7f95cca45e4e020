//! Command sender for Central System to Charge Point communication
//!
//! [`CommandSender`] writes `[2, id, action, payload]` frames through the
//! [`SessionRegistry`](super::session::SessionRegistry) and correlates the
//! station's `CallResult`/`CallError` via a pending-request table keyed by
//! `(charge point, message id)`. Typed commands live in submodules.

pub mod deferred;
pub mod trigger_message;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use super::session::SharedSessionRegistry;
use crate::support::errors::CommandError;
use crate::support::ocpp_frame::OcppFrame;
use crate::support::shutdown::ShutdownSignal;

pub use deferred::DeferredTasks;
pub use trigger_message::{schedule_meter_values_trigger, trigger_meter_values};

pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

struct PendingRequest {
    action: &'static str,
    expires_at: Instant,
    response_sender: oneshot::Sender<Result<Value, CommandError>>,
}

fn record_command(action: &'static str, outcome: &'static str, started: Instant) {
    metrics::histogram!("ocpp_command_latency_seconds", "action" => action)
        .record(started.elapsed().as_secs_f64());
    metrics::counter!("ocpp_commands_total", "action" => action, "outcome" => outcome)
        .increment(1);
}

/// Sends server-initiated calls and awaits their answers
pub struct CommandSender {
    session_registry: SharedSessionRegistry,
    pending_requests: DashMap<(String, String), PendingRequest>,
    response_timeout: Duration,
    deferred: DeferredTasks,
}

pub type SharedCommandSender = Arc<CommandSender>;

impl CommandSender {
    pub fn new(session_registry: SharedSessionRegistry, response_timeout: Duration) -> Self {
        Self {
            session_registry,
            pending_requests: DashMap::new(),
            response_timeout,
            deferred: DeferredTasks::new(),
        }
    }

    /// Send `action` to a charge point and wait for the answer payload.
    ///
    /// A charge point that is not connected fails immediately; nothing is
    /// retried.
    pub async fn send_command(
        &self,
        charge_point_id: &str,
        action: &'static str,
        payload: Value,
    ) -> Result<Value, CommandError> {
        let started = Instant::now();
        let message_id = uuid::Uuid::new_v4().to_string();
        let frame = OcppFrame::Call {
            unique_id: message_id.clone(),
            action: action.to_string(),
            payload,
        };

        let (tx, rx) = oneshot::channel();
        let key = (charge_point_id.to_string(), message_id.clone());
        self.pending_requests.insert(
            key.clone(),
            PendingRequest {
                action,
                expires_at: started + self.response_timeout,
                response_sender: tx,
            },
        );

        info!(
            charge_point_id,
            action,
            message_id = message_id.as_str(),
            "Sending command"
        );

        if let Err(e) = self.session_registry.send(charge_point_id, &frame) {
            self.pending_requests.remove(&key);
            warn!(charge_point_id, action, error = %e, "Command not sent");
            record_command(action, "not_connected", started);
            return Err(e.into());
        }

        let result = match timeout(self.response_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CommandError::Cancelled),
            Err(_) => {
                warn!(
                    charge_point_id,
                    action,
                    message_id = message_id.as_str(),
                    "Command timed out"
                );
                Err(CommandError::Timeout {
                    charge_point_id: charge_point_id.to_string(),
                    action,
                })
            }
        };
        if result.is_err() {
            self.pending_requests.remove(&key);
        }

        let outcome = match &result {
            Ok(_) => "ok",
            Err(CommandError::CallError { .. }) => "call_error",
            Err(CommandError::Timeout { .. }) => "timeout",
            Err(_) => "cancelled",
        };
        record_command(action, outcome, started);
        result
    }

    /// Route a `CallResult` to its waiting command. Unknown ids are dropped.
    pub fn handle_response(&self, charge_point_id: &str, message_id: &str, payload: Value) {
        let key = (charge_point_id.to_string(), message_id.to_string());
        if let Some((_, pending)) = self.pending_requests.remove(&key) {
            info!(
                charge_point_id,
                action = pending.action,
                message_id,
                "Received response"
            );
            let _ = pending.response_sender.send(Ok(payload));
        } else {
            warn!(charge_point_id, message_id, "Response for unknown request");
        }
    }

    pub fn handle_error(
        &self,
        charge_point_id: &str,
        message_id: &str,
        error_code: &str,
        error_description: &str,
    ) {
        let key = (charge_point_id.to_string(), message_id.to_string());
        if let Some((_, pending)) = self.pending_requests.remove(&key) {
            warn!(
                charge_point_id,
                action = pending.action,
                message_id,
                error_code,
                error_description,
                "Received error"
            );
            let _ = pending.response_sender.send(Err(CommandError::CallError {
                code: error_code.to_string(),
                description: error_description.to_string(),
            }));
        } else {
            warn!(charge_point_id, message_id, error_code, "Error for unknown request");
        }
    }

    /// Drop every pending command of a disconnected charge point.
    pub fn cleanup_charge_point(&self, charge_point_id: &str) {
        self.pending_requests.retain(|key, _| key.0 != charge_point_id);
    }

    /// Discard entries whose deadline has passed. Returns how many went.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.pending_requests.len();
        self.pending_requests.retain(|_, p| p.expires_at > now);
        let swept = before.saturating_sub(self.pending_requests.len());
        if swept > 0 {
            debug!(swept, "Discarded stale pending commands");
        }
        swept
    }

    pub fn pending_count(&self) -> usize {
        self.pending_requests.len()
    }

    /// Periodic [`sweep_expired`](Self::sweep_expired) until shutdown.
    pub fn start_sweeper(self: &Arc<Self>, every: Duration, shutdown: ShutdownSignal) -> JoinHandle<()> {
        let sender = Arc::clone(self);
        let notified = shutdown.notified();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            let stop = notified.wait();
            tokio::pin!(stop);
            loop {
                tokio::select! {
                    _ = &mut stop => {
                        debug!("Pending command sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        sender.sweep_expired();
                    }
                }
            }
        })
    }

    /// Run `task` after `delay` without blocking the caller.
    pub fn schedule<F>(&self, name: &'static str, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.deferred.schedule(name, delay, task);
    }

    pub fn deferred(&self) -> &DeferredTasks {
        &self.deferred
    }
}

pub fn create_command_sender(
    session_registry: SharedSessionRegistry,
    response_timeout: Duration,
) -> SharedCommandSender {
    Arc::new(CommandSender::new(session_registry, response_timeout))
}
