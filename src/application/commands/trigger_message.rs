//! v1.6 TriggerMessage command

use std::time::Duration;

use rust_ocpp::v1_6::messages::trigger_message::{TriggerMessageRequest, TriggerMessageResponse};
use rust_ocpp::v1_6::types::{MessageTrigger, TriggerMessageStatus};
use tracing::{info, warn};

use super::SharedCommandSender;
use crate::support::errors::CommandError;

/// Ask a charge point to send MeterValues now.
///
/// `connector_id = None` addresses the whole charge point.
pub async fn trigger_meter_values(
    command_sender: &SharedCommandSender,
    charge_point_id: &str,
    connector_id: Option<u32>,
) -> Result<TriggerMessageStatus, CommandError> {
    info!(charge_point_id, ?connector_id, "v1.6 TriggerMessage(MeterValues)");

    let request = TriggerMessageRequest {
        requested_message: MessageTrigger::MeterValues,
        connector_id,
    };
    let payload = serde_json::to_value(&request)?;

    let result = command_sender
        .send_command(charge_point_id, "TriggerMessage", payload)
        .await?;

    let response: TriggerMessageResponse = serde_json::from_value(result)?;
    Ok(response.status)
}

/// Fire [`trigger_meter_values`] after `delay`, detached from the caller.
pub fn schedule_meter_values_trigger(
    command_sender: &SharedCommandSender,
    charge_point_id: &str,
    delay: Duration,
) {
    let sender = command_sender.clone();
    let charge_point_id = charge_point_id.to_string();
    command_sender.schedule("trigger_meter_values", delay, async move {
        match trigger_meter_values(&sender, &charge_point_id, None).await {
            Ok(status) => info!(
                charge_point_id = charge_point_id.as_str(),
                ?status,
                "MeterValues trigger answered"
            ),
            Err(e) => warn!(
                charge_point_id = charge_point_id.as_str(),
                error = %e,
                "MeterValues trigger failed"
            ),
        }
    });
}
