//! BootNotification handler

use chrono::Utc;
use rust_ocpp::v1_6::messages::boot_notification::{
    BootNotificationRequest, BootNotificationResponse,
};
use rust_ocpp::v1_6::types::RegistrationStatus;
use serde_json::Value;
use tracing::{error, info};

use crate::application::handlers::dispatcher::{
    parse_request, to_payload, Action, ActionDispatcher, HandlerError,
};

pub async fn handle_boot_notification(
    dispatcher: &ActionDispatcher,
    charge_point_id: &str,
    payload: Value,
) -> Result<Value, HandlerError> {
    let req: BootNotificationRequest = parse_request(Action::BootNotification, payload)?;

    info!(
        charge_point_id,
        vendor = req.charge_point_vendor.as_str(),
        model = req.charge_point_model.as_str(),
        firmware = ?req.firmware_version,
        "BootNotification"
    );

    // A storage failure is answered with Rejected, never a CallError
    let status = match dispatcher
        .service
        .register(
            charge_point_id,
            &req.charge_point_vendor,
            &req.charge_point_model,
            req.firmware_version.as_deref(),
        )
        .await
    {
        Ok(_) => RegistrationStatus::Accepted,
        Err(e) => {
            error!(charge_point_id, error = %e, "Failed to register charger");
            RegistrationStatus::Rejected
        }
    };

    to_payload(&BootNotificationResponse {
        current_time: Utc::now(),
        interval: dispatcher.settings.heartbeat_interval,
        status,
    })
}
