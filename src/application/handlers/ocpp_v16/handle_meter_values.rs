//! MeterValues handler

use rust_ocpp::v1_6::messages::meter_values::{MeterValuesRequest, MeterValuesResponse};
use rust_ocpp::v1_6::types::{Measurand, UnitOfMeasure};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::application::handlers::dispatcher::{
    parse_request, to_payload, Action, ActionDispatcher, HandlerError,
};
use crate::domain::register_wh;

/// Energy register reading of a sample in Wh, or `None` when the sample is
/// another measurand or carries no usable value.
fn energy_register_wh(
    measurand: Option<&Measurand>,
    raw: &str,
    unit: Option<&UnitOfMeasure>,
) -> Option<f64> {
    // OCPP 1.6: an absent measurand means Energy.Active.Import.Register
    let measurand = measurand
        .cloned()
        .unwrap_or(Measurand::EnergyActiveImportRegister);
    if !matches!(measurand, Measurand::EnergyActiveImportRegister) {
        debug!(?measurand, "Skipping measurand");
        return None;
    }

    let value: f64 = match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(value = raw, "Unparseable energy reading");
            return None;
        }
    };
    let value_wh = match unit {
        Some(UnitOfMeasure::KWh) => value * 1000.0,
        _ => value,
    };
    if register_wh(value_wh).is_none() {
        warn!(value = raw, "Energy reading out of range");
        return None;
    }
    Some(value_wh)
}

pub async fn handle_meter_values(
    dispatcher: &ActionDispatcher,
    charge_point_id: &str,
    payload: Value,
) -> Result<Value, HandlerError> {
    let req: MeterValuesRequest = parse_request(Action::MeterValues, payload)?;

    info!(
        charge_point_id,
        connector_id = req.connector_id,
        transaction_id = ?req.transaction_id,
        samples = req.meter_value.len(),
        "MeterValues"
    );

    if !dispatcher.service.touch(charge_point_id).await? {
        warn!(charge_point_id, "MeterValues from unknown charger ignored");
        return to_payload(&MeterValuesResponse {});
    }

    for meter_value in &req.meter_value {
        for sample in &meter_value.sampled_value {
            let Some(value_wh) = energy_register_wh(
                sample.measurand.as_ref(),
                &sample.value,
                sample.unit.as_ref(),
            ) else {
                continue;
            };
            dispatcher
                .service
                .record_energy_sample(
                    charge_point_id,
                    req.transaction_id,
                    meter_value.timestamp,
                    value_wh,
                )
                .await?;
        }
    }

    to_payload(&MeterValuesResponse {})
}
