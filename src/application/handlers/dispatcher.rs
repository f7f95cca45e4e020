//! Action routing for inbound OCPP 1.6 calls
//!
//! Every handler has the same shape: decode the typed `rust_ocpp` request,
//! apply it through [`ChargingService`], encode the typed response. Errors are
//! mapped to OCPP-J `CallError` codes here and nowhere else.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, warn};

use super::ocpp_v16::{
    handle_authorize, handle_boot_notification, handle_heartbeat, handle_meter_values,
    handle_start_transaction, handle_status_notification, handle_stop_transaction,
};
use crate::application::commands::SharedCommandSender;
use crate::application::services::ChargingService;
use crate::config::OcppSettings;
use crate::support::errors::StoreError;
use crate::support::ocpp_frame::ErrorCode;

/// Station-initiated actions this central system answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    BootNotification,
    StatusNotification,
    Authorize,
    StartTransaction,
    StopTransaction,
    MeterValues,
    Heartbeat,
}

impl Action {
    /// Case-sensitive, as action names are on the wire.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "BootNotification" => Some(Self::BootNotification),
            "StatusNotification" => Some(Self::StatusNotification),
            "Authorize" => Some(Self::Authorize),
            "StartTransaction" => Some(Self::StartTransaction),
            "StopTransaction" => Some(Self::StopTransaction),
            "MeterValues" => Some(Self::MeterValues),
            "Heartbeat" => Some(Self::Heartbeat),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BootNotification => "BootNotification",
            Self::StatusNotification => "StatusNotification",
            Self::Authorize => "Authorize",
            Self::StartTransaction => "StartTransaction",
            Self::StopTransaction => "StopTransaction",
            Self::MeterValues => "MeterValues",
            Self::Heartbeat => "Heartbeat",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Malformed {action} payload: {source}")]
    Formation {
        action: Action,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    PropertyConstraint(String),

    #[error("Storage failure: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to encode response: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HandlerError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Formation { .. } => ErrorCode::FormationViolation,
            Self::PropertyConstraint(_) => ErrorCode::PropertyConstraintViolation,
            Self::Store(_) | Self::Serialization(_) => ErrorCode::InternalError,
        }
    }
}

/// What the station receives in a `CallError`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError {
    pub code: ErrorCode,
    pub description: String,
}

impl ProtocolError {
    pub fn not_implemented(action: &str) -> Self {
        Self {
            code: ErrorCode::NotImplemented,
            description: format!("Action {action} is not supported"),
        }
    }
}

impl From<HandlerError> for ProtocolError {
    fn from(e: HandlerError) -> Self {
        let description = match &e {
            // internal details stay in the log
            HandlerError::Store(_) | HandlerError::Serialization(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        Self {
            code: e.error_code(),
            description,
        }
    }
}

pub(crate) fn parse_request<T: DeserializeOwned>(
    action: Action,
    payload: Value,
) -> Result<T, HandlerError> {
    serde_json::from_value(payload).map_err(|source| HandlerError::Formation { action, source })
}

pub(crate) fn to_payload<T: Serialize>(response: &T) -> Result<Value, HandlerError> {
    Ok(serde_json::to_value(response)?)
}

/// Routes a decoded call to its handler
pub struct ActionDispatcher {
    pub service: Arc<ChargingService>,
    pub command_sender: SharedCommandSender,
    pub settings: OcppSettings,
}

pub type SharedActionDispatcher = Arc<ActionDispatcher>;

impl ActionDispatcher {
    pub fn new(
        service: Arc<ChargingService>,
        command_sender: SharedCommandSender,
        settings: OcppSettings,
    ) -> Self {
        Self {
            service,
            command_sender,
            settings,
        }
    }

    pub async fn dispatch(
        &self,
        charge_point_id: &str,
        action: &str,
        payload: Value,
    ) -> Result<Value, ProtocolError> {
        let Some(action) = Action::from_name(action) else {
            warn!(charge_point_id, action, "Unsupported action");
            metrics::counter!(
                "ocpp_inbound_calls_total",
                "action" => "unknown",
                "outcome" => "not_implemented"
            )
            .increment(1);
            return Err(ProtocolError::not_implemented(action));
        };

        let started = Instant::now();
        let result = match action {
            Action::BootNotification => handle_boot_notification(self, charge_point_id, payload).await,
            Action::StatusNotification => {
                handle_status_notification(self, charge_point_id, payload).await
            }
            Action::Authorize => handle_authorize(self, charge_point_id, payload).await,
            Action::StartTransaction => handle_start_transaction(self, charge_point_id, payload).await,
            Action::StopTransaction => handle_stop_transaction(self, charge_point_id, payload).await,
            Action::MeterValues => handle_meter_values(self, charge_point_id, payload).await,
            Action::Heartbeat => handle_heartbeat(self, charge_point_id, payload).await,
        };

        metrics::histogram!("ocpp_inbound_call_duration_seconds", "action" => action.as_str())
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(response) => {
                metrics::counter!(
                    "ocpp_inbound_calls_total",
                    "action" => action.as_str(),
                    "outcome" => "ok"
                )
                .increment(1);
                Ok(response)
            }
            Err(e) => {
                let code = e.error_code();
                if code == ErrorCode::InternalError {
                    error!(charge_point_id, %action, error = %e, "Handler failed");
                } else {
                    warn!(charge_point_id, %action, error = %e, "Rejected call");
                }
                metrics::counter!(
                    "ocpp_inbound_calls_total",
                    "action" => action.as_str(),
                    "outcome" => code.as_str()
                )
                .increment(1);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::application::commands::create_command_sender;
    use crate::application::session::{SessionRegistry, SharedSessionRegistry};
    use crate::domain::ChargingStore;
    use crate::infrastructure::InMemoryStorage;
    use serde_json::json;
    use std::time::Duration;

    pub(crate) struct Fixture {
        pub dispatcher: ActionDispatcher,
        pub store: Arc<InMemoryStorage>,
        pub registry: SharedSessionRegistry,
    }

    pub(crate) fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStorage::new());
        let registry = SessionRegistry::shared();
        let command_sender = create_command_sender(registry.clone(), Duration::from_secs(5));
        let service = Arc::new(ChargingService::new(store.clone() as Arc<dyn ChargingStore>));
        Fixture {
            dispatcher: ActionDispatcher::new(service, command_sender, OcppSettings::default()),
            store,
            registry,
        }
    }

    pub(crate) async fn boot(dispatcher: &ActionDispatcher, charge_point_id: &str) {
        dispatcher
            .dispatch(
                charge_point_id,
                "BootNotification",
                json!({"chargePointVendor": "Acme", "chargePointModel": "Wallbox"}),
            )
            .await
            .unwrap();
    }

    #[test]
    fn action_names_round_trip() {
        for action in [
            Action::BootNotification,
            Action::StatusNotification,
            Action::Authorize,
            Action::StartTransaction,
            Action::StopTransaction,
            Action::MeterValues,
            Action::Heartbeat,
        ] {
            assert_eq!(Action::from_name(action.as_str()), Some(action));
        }
        assert_eq!(Action::from_name("heartbeat"), None);
    }

    #[tokio::test]
    async fn unknown_action_is_not_implemented() {
        let f = fixture();
        for action in ["DataTransfer", "FirmwareStatusNotification", ""] {
            let err = f.dispatcher.dispatch("CP-1", action, json!({})).await.unwrap_err();
            assert_eq!(err.code, ErrorCode::NotImplemented);
        }
    }

    #[tokio::test]
    async fn missing_field_is_formation_violation() {
        let f = fixture();
        let err = f
            .dispatcher
            .dispatch(
                "CP-1",
                "StartTransaction",
                json!({"connectorId": 1, "meterStart": 0, "timestamp": "2024-01-01T00:00:00Z"}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::FormationViolation);

        let err = f
            .dispatcher
            .dispatch("CP-1", "Authorize", json!({"idTag": 17}))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::FormationViolation);
    }

    #[tokio::test]
    async fn negative_meter_is_property_violation() {
        let f = fixture();
        boot(&f.dispatcher, "CP-1").await;
        let err = f
            .dispatcher
            .dispatch(
                "CP-1",
                "StartTransaction",
                json!({
                    "connectorId": 1,
                    "idTag": "TAG",
                    "meterStart": -5,
                    "timestamp": "2024-01-01T00:00:00Z"
                }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PropertyConstraintViolation);
        assert!(f.store.find_open_transaction("CP-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn charger_cannot_meter_or_stop_foreign_transaction() {
        let f = fixture();
        let d = &f.dispatcher;
        boot(d, "CP-1").await;
        boot(d, "CP-2").await;

        let start = d
            .dispatch(
                "CP-1",
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
        let tx_id = start["transactionId"].as_i64().unwrap();

        d.dispatch(
            "CP-2",
            "MeterValues",
            json!({
                "connectorId": 1,
                "transactionId": tx_id,
                "meterValue": [{
                    "timestamp": "2024-01-01T00:05:00Z",
                    "sampledValue": [{"value": "777"}]
                }]
            }),
        )
        .await
        .unwrap();
        let stop = d
            .dispatch(
                "CP-2",
                "StopTransaction",
                json!({
                    "transactionId": tx_id,
                    "meterStop": 100,
                    "timestamp": "2024-01-01T00:10:00Z"
                }),
            )
            .await
            .unwrap();
        assert_eq!(stop["idTagInfo"]["status"], "Accepted");

        let tx = f.store.find_transaction(tx_id as i32).await.unwrap().unwrap();
        assert!(tx.is_open());
        assert_eq!(tx.energy_wh, None);
        assert!(f.store.meter_values_for(tx.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scenario_boot_start_meter_stop() {
        let f = fixture();
        let d = &f.dispatcher;

        let boot = d
            .dispatch(
                "CP-1",
                "BootNotification",
                json!({"chargePointVendor": "Acme", "chargePointModel": "Wallbox"}),
            )
            .await
            .unwrap();
        assert_eq!(boot["status"], "Accepted");
        assert_eq!(boot["interval"], 300);

        let start = d
            .dispatch(
                "CP-1",
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
        assert_eq!(start["idTagInfo"]["status"], "Accepted");
        let tx_id = start["transactionId"].as_i64().unwrap();
        assert!(tx_id > 0);

        let meter = d
            .dispatch(
                "CP-1",
                "MeterValues",
                json!({
                    "connectorId": 1,
                    "transactionId": tx_id,
                    "meterValue": [{
                        "timestamp": "2024-01-01T00:10:00Z",
                        "sampledValue": [{"value": "250", "measurand": "Energy.Active.Import.Register", "unit": "Wh"}]
                    }]
                }),
            )
            .await
            .unwrap();
        assert_eq!(meter, json!({}));
        let charger = f.store.find_charger("CP-1").await.unwrap().unwrap();
        assert_eq!(charger.total_energy_wh, Some(250));

        let stop = d
            .dispatch(
                "CP-1",
                "StopTransaction",
                json!({
                    "transactionId": tx_id,
                    "meterStop": 250,
                    "timestamp": "2024-01-01T00:20:00Z"
                }),
            )
            .await
            .unwrap();
        assert_eq!(stop["idTagInfo"]["status"], "Accepted");

        let tx = f.store.find_transaction(tx_id as i32).await.unwrap().unwrap();
        assert_eq!(tx.energy_wh, Some(250));
        assert_eq!(f.store.meter_values_for(tx.id).await.unwrap().len(), 1);
    }
}
