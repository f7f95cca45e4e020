//! StatusNotification handler

use rust_ocpp::v1_6::messages::status_notification::{
    StatusNotificationRequest, StatusNotificationResponse,
};
use rust_ocpp::v1_6::types::ChargePointStatus;
use serde_json::Value;
use tracing::info;

use crate::application::commands::schedule_meter_values_trigger;
use crate::application::handlers::dispatcher::{
    parse_request, to_payload, Action, ActionDispatcher, HandlerError,
};

/// Connector whose return to Available prompts a fresh meter reading.
const TRIGGER_CONNECTOR_ID: u32 = 1;

pub async fn handle_status_notification(
    dispatcher: &ActionDispatcher,
    charge_point_id: &str,
    payload: Value,
) -> Result<Value, HandlerError> {
    let req: StatusNotificationRequest = parse_request(Action::StatusNotification, payload)?;

    info!(
        charge_point_id,
        connector_id = req.connector_id,
        status = ?req.status,
        error_code = ?req.error_code,
        "StatusNotification"
    );

    dispatcher.service.touch(charge_point_id).await?;

    if req.connector_id == TRIGGER_CONNECTOR_ID && matches!(req.status, ChargePointStatus::Available) {
        schedule_meter_values_trigger(
            &dispatcher.command_sender,
            charge_point_id,
            dispatcher.settings.meter_trigger_delay(),
        );
    }

    to_payload(&StatusNotificationResponse {})
}
