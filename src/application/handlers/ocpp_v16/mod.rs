//! OCPP 1.6 Core action handlers

mod handle_authorize;
mod handle_boot_notification;
mod handle_heartbeat;
mod handle_meter_values;
mod handle_start_transaction;
mod handle_status_notification;
mod handle_stop_transaction;

pub(super) use handle_authorize::handle_authorize;
pub(super) use handle_boot_notification::handle_boot_notification;
pub(super) use handle_heartbeat::handle_heartbeat;
pub(super) use handle_meter_values::handle_meter_values;
pub(super) use handle_start_transaction::handle_start_transaction;
pub(super) use handle_status_notification::handle_status_notification;
pub(super) use handle_stop_transaction::handle_stop_transaction;
