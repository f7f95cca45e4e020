//! Charger domain entity

use chrono::{DateTime, Utc};

use super::transaction::Transaction;

/// A registered charge point.
#[derive(Debug, Clone, PartialEq)]
pub struct Charger {
    /// Charge point identity, taken from the connection path
    pub identity: String,
    /// Display name; the identity until an operator renames it
    pub name: String,
    pub model: String,
    pub vendor: String,
    pub firmware_version: Option<String>,
    /// Administrative rating, never touched by the protocol engine
    pub max_output_kw: Option<f64>,
    pub last_seen: Option<DateTime<Utc>>,
    /// Cumulative energy register (Wh); `None` until the first accepted reading
    pub total_energy_wh: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Charger {
    /// Row created by the first BootNotification of `registration`.
    pub fn from_registration(registration: &ChargerRegistration) -> Self {
        Self {
            identity: registration.identity.clone(),
            name: registration.identity.clone(),
            model: registration.model.clone(),
            vendor: registration.vendor.clone(),
            firmware_version: registration.firmware_version.clone(),
            max_output_kw: None,
            last_seen: Some(registration.seen_at),
            total_energy_wh: None,
            created_at: registration.seen_at,
        }
    }

    /// Overwrite the station-reported fields, keeping name and energy.
    pub fn apply_registration(&mut self, registration: &ChargerRegistration) {
        self.model = registration.model.clone();
        self.vendor = registration.vendor.clone();
        self.firmware_version = registration.firmware_version.clone();
        self.last_seen = Some(registration.seen_at);
    }
}

/// Fields reported in a BootNotification.
#[derive(Debug, Clone)]
pub struct ChargerRegistration {
    pub identity: String,
    pub model: String,
    pub vendor: String,
    pub firmware_version: Option<String>,
    pub seen_at: DateTime<Utc>,
}

/// Lifecycle state of a charger, derived from stored rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargerState {
    /// No charger row yet
    Unknown,
    /// Registered with no open transaction
    Idle,
    /// Registered with an open transaction
    Charging,
}

impl ChargerState {
    pub fn derive(charger: Option<&Charger>, open_transaction: Option<&Transaction>) -> Self {
        match (charger, open_transaction) {
            (None, _) => Self::Unknown,
            (Some(_), Some(tx)) if tx.is_open() => Self::Charging,
            (Some(_), _) => Self::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transaction::NewTransaction;

    fn registration(model: &str) -> ChargerRegistration {
        ChargerRegistration {
            identity: "CP-1".into(),
            model: model.into(),
            vendor: "Acme".into(),
            firmware_version: Some("1.0".into()),
            seen_at: Utc::now(),
        }
    }

    #[test]
    fn name_defaults_to_identity() {
        let charger = Charger::from_registration(&registration("M1"));
        assert_eq!(charger.name, "CP-1");
        assert_eq!(charger.total_energy_wh, None);
    }

    #[test]
    fn re_registration_keeps_name_and_total() {
        let mut charger = Charger::from_registration(&registration("M1"));
        charger.name = "Garage".into();
        charger.total_energy_wh = Some(1200);

        charger.apply_registration(&registration("M2"));
        assert_eq!(charger.model, "M2");
        assert_eq!(charger.name, "Garage");
        assert_eq!(charger.total_energy_wh, Some(1200));
    }

    #[test]
    fn state_follows_open_transaction() {
        let charger = Charger::from_registration(&registration("M1"));
        let mut tx = NewTransaction {
            charger_identity: "CP-1".into(),
            connector_id: 1,
            id_tag: "TAG".into(),
            started_at: Utc::now(),
            meter_start_wh: 0,
        }
        .into_transaction(7);

        assert_eq!(ChargerState::derive(None, None), ChargerState::Unknown);
        assert_eq!(ChargerState::derive(Some(&charger), None), ChargerState::Idle);
        assert_eq!(
            ChargerState::derive(Some(&charger), Some(&tx)),
            ChargerState::Charging
        );

        tx.close(10, Utc::now(), None);
        assert_eq!(ChargerState::derive(Some(&charger), Some(&tx)), ChargerState::Idle);
    }
}
