use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque record contents. The ledger never interprets the keys; a sorted
/// map keeps the canonical hash input stable.
pub type Payload = BTreeMap<String, String>;

/// Current wall-clock time as fractional seconds since the Unix epoch.
pub fn unix_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// One record entry: who issued it, who it is about, and what it says.
///
/// Transactions are values. Once sealed into a block the ledger never
/// touches them again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    #[serde(rename = "data")]
    pub payload: Payload,
    pub timestamp: f64,
}

impl Transaction {
    /// Create a transaction stamped with the current time.
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, payload: Payload) -> Self {
        Self::with_timestamp(sender, recipient, payload, unix_timestamp())
    }

    pub fn with_timestamp(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        payload: Payload,
        timestamp: f64,
    ) -> Self {
        Transaction {
            sender: sender.into(),
            recipient: recipient.into(),
            payload,
            timestamp,
        }
    }

    pub fn is_addressed_to(&self, recipient: &str) -> bool {
        self.recipient == recipient
    }

    pub fn to_record(&self) -> Record {
        Record {
            sender: self.sender.clone(),
            payload: self.payload.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// What a recipient query hands back for each matching transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub sender: String,
    #[serde(rename = "data")]
    pub payload: Payload,
    pub timestamp: f64,
}

/// Build a payload from string pairs.
pub fn payload_from<K, V, I>(entries: I) -> Payload
where
    K: Into<String>,
    V: Into<String>,
    I: IntoIterator<Item = (K, V)>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
