//! Transaction domain entity

use chrono::{DateTime, Utc};

/// Charging transaction
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    /// Transaction id handed to the station
    pub id: i32,
    pub charger_identity: String,
    pub connector_id: u32,
    /// ID tag that started the transaction
    pub id_tag: String,
    pub started_at: DateTime<Utc>,
    /// Meter value at start (Wh)
    pub meter_start_wh: i64,
    pub stopped_at: Option<DateTime<Utc>>,
    /// Meter value at stop (Wh)
    pub meter_stop_wh: Option<i64>,
    pub stop_reason: Option<String>,
    /// Energy delivered (Wh), set when the transaction closes
    pub energy_wh: Option<i64>,
}

impl Transaction {
    pub fn is_open(&self) -> bool {
        self.stopped_at.is_none()
    }

    /// Close the transaction. Returns `false` if it was already closed.
    pub fn close(
        &mut self,
        meter_stop_wh: i64,
        stopped_at: DateTime<Utc>,
        reason: Option<String>,
    ) -> bool {
        if !self.is_open() {
            return false;
        }
        self.meter_stop_wh = Some(meter_stop_wh);
        self.stopped_at = Some(stopped_at);
        self.stop_reason = reason;
        self.energy_wh = Some(delivered_energy(self.meter_start_wh, meter_stop_wh));
        true
    }
}

/// Energy delivered between two register readings; a register that went
/// backwards (reset or replacement) counts as zero.
pub fn delivered_energy(meter_start_wh: i64, meter_stop_wh: i64) -> i64 {
    meter_stop_wh.saturating_sub(meter_start_wh).max(0)
}

/// Data for a transaction about to be opened.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub charger_identity: String,
    pub connector_id: u32,
    pub id_tag: String,
    pub started_at: DateTime<Utc>,
    pub meter_start_wh: i64,
}

impl NewTransaction {
    pub fn into_transaction(self, id: i32) -> Transaction {
        Transaction {
            id,
            charger_identity: self.charger_identity,
            connector_id: self.connector_id,
            id_tag: self.id_tag,
            started_at: self.started_at,
            meter_start_wh: self.meter_start_wh,
            stopped_at: None,
            meter_stop_wh: None,
            stop_reason: None,
            energy_wh: None,
        }
    }
}

/// StopTransaction data.
#[derive(Debug, Clone)]
pub struct TransactionStop {
    /// Charger reporting the stop; only its own transactions can be closed
    pub charger_identity: String,
    pub transaction_id: i32,
    pub meter_stop_wh: i64,
    pub stopped_at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Result of closing a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum CloseOutcome {
    Closed(Transaction),
    NotFound,
    AlreadyClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(meter_start_wh: i64) -> Transaction {
        NewTransaction {
            charger_identity: "CP-1".into(),
            connector_id: 1,
            id_tag: "TAG".into(),
            started_at: Utc::now(),
            meter_start_wh,
        }
        .into_transaction(1)
    }

    #[test]
    fn delivered_energy_is_never_negative() {
        assert_eq!(delivered_energy(0, 250), 250);
        assert_eq!(delivered_energy(5000, 4800), 0);
        assert_eq!(delivered_energy(100, 100), 0);
    }

    #[test]
    fn close_records_energy_once() {
        let mut tx = open(1000);
        assert!(tx.close(1750, Utc::now(), Some("Local".into())));
        assert_eq!(tx.energy_wh, Some(750));
        assert!(!tx.is_open());

        assert!(!tx.close(9000, Utc::now(), None));
        assert_eq!(tx.meter_stop_wh, Some(1750));
        assert_eq!(tx.stop_reason.as_deref(), Some("Local"));
    }
}
