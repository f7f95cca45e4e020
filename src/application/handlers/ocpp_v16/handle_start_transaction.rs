//! StartTransaction handler

use rust_ocpp::v1_6::messages::start_transaction::{
    StartTransactionRequest, StartTransactionResponse,
};
use rust_ocpp::v1_6::types::{AuthorizationStatus, IdTagInfo};
use serde_json::Value;
use tracing::info;

use crate::application::handlers::dispatcher::{
    parse_request, to_payload, Action, ActionDispatcher, HandlerError,
};
use crate::application::services::StartOutcome;

pub async fn handle_start_transaction(
    dispatcher: &ActionDispatcher,
    charge_point_id: &str,
    payload: Value,
) -> Result<Value, HandlerError> {
    let req: StartTransactionRequest = parse_request(Action::StartTransaction, payload)?;

    info!(
        charge_point_id,
        connector_id = req.connector_id,
        id_tag = req.id_tag.as_str(),
        meter_start = req.meter_start,
        "StartTransaction"
    );

    if req.meter_start < 0 {
        return Err(HandlerError::PropertyConstraint(format!(
            "meterStart must not be negative, got {}",
            req.meter_start
        )));
    }

    let outcome = dispatcher
        .service
        .start_transaction(
            charge_point_id,
            req.connector_id,
            &req.id_tag,
            i64::from(req.meter_start),
            req.timestamp,
        )
        .await?;

    let (transaction_id, status) = match outcome {
        StartOutcome::Started(tx) => (tx.id, AuthorizationStatus::Accepted),
        StartOutcome::UnknownCharger => (0, AuthorizationStatus::Invalid),
    };

    to_payload(&StartTransactionResponse {
        transaction_id,
        id_tag_info: IdTagInfo {
            status,
            expiry_date: None,
            parent_id_tag: None,
        },
    })
}

#[cfg(test)]
mod tests {
    use crate::application::handlers::dispatcher::tests::fixture;
    use crate::domain::ChargingStore;
    use serde_json::json;

    #[tokio::test]
    async fn start_without_boot_is_invalid() {
        let f = fixture();
        let response = f
            .dispatcher
            .dispatch(
                "CP-9",
                "StartTransaction",
                json!({
                    "connectorId": 1,
                    "idTag": "TAG",
                    "meterStart": 0,
                    "timestamp": "2024-01-01T00:00:00Z"
                }),
            )
            .await
            .unwrap();
        assert_eq!(response["transactionId"], 0);
        assert_eq!(response["idTagInfo"]["status"], "Invalid");
        assert!(f.store.find_transaction(1).await.unwrap().is_none());
        assert!(f.store.find_open_transaction("CP-9").await.unwrap().is_none());
    }
}
