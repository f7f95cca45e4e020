//! StopTransaction handler

use rust_ocpp::v1_6::messages::stop_transaction::{
    StopTransactionRequest, StopTransactionResponse,
};
use rust_ocpp::v1_6::types::{AuthorizationStatus, IdTagInfo};
use serde_json::Value;
use tracing::info;

use crate::application::handlers::dispatcher::{
    parse_request, to_payload, Action, ActionDispatcher, HandlerError,
};
use crate::domain::TransactionStop;

/// Answers Accepted even when the transaction is unknown or already closed;
/// the station has nothing useful to do with a rejection here.
pub async fn handle_stop_transaction(
    dispatcher: &ActionDispatcher,
    charge_point_id: &str,
    payload: Value,
) -> Result<Value, HandlerError> {
    let req: StopTransactionRequest = parse_request(Action::StopTransaction, payload)?;

    info!(
        charge_point_id,
        transaction_id = req.transaction_id,
        meter_stop = req.meter_stop,
        reason = ?req.reason,
        "StopTransaction"
    );

    if req.meter_stop < 0 {
        return Err(HandlerError::PropertyConstraint(format!(
            "meterStop must not be negative, got {}",
            req.meter_stop
        )));
    }

    dispatcher
        .service
        .stop_transaction(TransactionStop {
            charger_identity: charge_point_id.to_string(),
            transaction_id: req.transaction_id,
            meter_stop_wh: i64::from(req.meter_stop),
            stopped_at: req.timestamp,
            reason: req.reason.as_ref().map(|r| format!("{:?}", r)),
        })
        .await?;

    to_payload(&StopTransactionResponse {
        id_tag_info: Some(IdTagInfo {
            status: AuthorizationStatus::Accepted,
            expiry_date: None,
            parent_id_tag: None,
        }),
    })
}

#[cfg(test)]
mod tests {
    use crate::application::handlers::dispatcher::tests::{boot, fixture};
    use crate::domain::ChargingStore;
    use serde_json::json;

    fn start(meter_start: i64) -> serde_json::Value {
        json!({
            "connectorId": 1,
            "idTag": "TAG",
            "meterStart": meter_start,
            "timestamp": "2024-01-01T00:00:00Z"
        })
    }

    fn stop(transaction_id: i64, meter_stop: i64) -> serde_json::Value {
        json!({
            "transactionId": transaction_id,
            "meterStop": meter_stop,
            "timestamp": "2024-01-01T01:00:00Z",
            "reason": "Local"
        })
    }

    #[tokio::test]
    async fn register_reset_gives_zero_energy() {
        let f = fixture();
        boot(&f.dispatcher, "CP-1").await;
        let started = f
            .dispatcher
            .dispatch("CP-1", "StartTransaction", start(5000))
            .await
            .unwrap();
        let tx_id = started["transactionId"].as_i64().unwrap();

        let response = f
            .dispatcher
            .dispatch("CP-1", "StopTransaction", stop(tx_id, 4800))
            .await
            .unwrap();
        assert_eq!(response["idTagInfo"]["status"], "Accepted");

        let tx = f.store.find_transaction(tx_id as i32).await.unwrap().unwrap();
        assert_eq!(tx.energy_wh, Some(0));
        assert_eq!(tx.meter_stop_wh, Some(4800));
        assert_eq!(tx.stop_reason.as_deref(), Some("Local"));
    }

    #[tokio::test]
    async fn unknown_or_repeated_stop_is_still_accepted() {
        let f = fixture();
        boot(&f.dispatcher, "CP-1").await;

        let response = f
            .dispatcher
            .dispatch("CP-1", "StopTransaction", stop(999, 10))
            .await
            .unwrap();
        assert_eq!(response["idTagInfo"]["status"], "Accepted");

        let started = f
            .dispatcher
            .dispatch("CP-1", "StartTransaction", start(0))
            .await
            .unwrap();
        let tx_id = started["transactionId"].as_i64().unwrap();
        f.dispatcher
            .dispatch("CP-1", "StopTransaction", stop(tx_id, 100))
            .await
            .unwrap();
        let again = f
            .dispatcher
            .dispatch("CP-1", "StopTransaction", stop(tx_id, 900))
            .await
            .unwrap();
        assert_eq!(again["idTagInfo"]["status"], "Accepted");

        let tx = f.store.find_transaction(tx_id as i32).await.unwrap().unwrap();
        assert_eq!(tx.energy_wh, Some(100));
    }
}
