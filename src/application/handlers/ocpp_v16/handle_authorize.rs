//! Authorize handler

use rust_ocpp::v1_6::messages::authorize::{AuthorizeRequest, AuthorizeResponse};
use rust_ocpp::v1_6::types::{AuthorizationStatus, IdTagInfo};
use serde_json::Value;
use tracing::info;

use crate::application::handlers::dispatcher::{
    parse_request, to_payload, Action, ActionDispatcher, HandlerError,
};

/// Every id tag is accepted; there is no local authorization list.
pub async fn handle_authorize(
    _dispatcher: &ActionDispatcher,
    charge_point_id: &str,
    payload: Value,
) -> Result<Value, HandlerError> {
    let req: AuthorizeRequest = parse_request(Action::Authorize, payload)?;

    info!(charge_point_id, id_tag = req.id_tag.as_str(), "Authorize");

    to_payload(&AuthorizeResponse {
        id_tag_info: IdTagInfo {
            status: AuthorizationStatus::Accepted,
            expiry_date: None,
            parent_id_tag: None,
        },
    })
}
