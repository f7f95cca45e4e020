//! Heartbeat handler

use chrono::Utc;
use rust_ocpp::v1_6::messages::heart_beat::HeartbeatResponse;
use serde_json::Value;
use tracing::debug;

use crate::application::handlers::dispatcher::{to_payload, ActionDispatcher, HandlerError};

pub async fn handle_heartbeat(
    dispatcher: &ActionDispatcher,
    charge_point_id: &str,
    _payload: Value,
) -> Result<Value, HandlerError> {
    debug!(charge_point_id, "Heartbeat");

    dispatcher.service.touch(charge_point_id).await?;

    to_payload(&HeartbeatResponse {
        current_time: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use crate::application::handlers::dispatcher::tests::{boot, fixture};
    use crate::domain::ChargingStore;
    use serde_json::json;

    #[tokio::test]
    async fn heartbeat_refreshes_last_seen() {
        let f = fixture();
        boot(&f.dispatcher, "CP-1").await;
        let before = f.store.find_charger("CP-1").await.unwrap().unwrap().last_seen;

        let response = f
            .dispatcher
            .dispatch("CP-1", "Heartbeat", json!({}))
            .await
            .unwrap();
        assert!(response["currentTime"].is_string());

        let after = f.store.find_charger("CP-1").await.unwrap().unwrap().last_seen;
        assert!(after >= before);
    }

    #[tokio::test]
    async fn heartbeat_from_unknown_charger_still_answers() {
        let f = fixture();
        let response = f
            .dispatcher
            .dispatch("ghost", "Heartbeat", json!({}))
            .await
            .unwrap();
        assert!(response.get("currentTime").is_some());
    }
}
