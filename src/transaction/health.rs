//! Medical-record payloads.
//!
//! A doctor files a [`HealthRecord`] about a patient; it travels through the
//! ledger as a plain [`Payload`]. [`PatientRecord`] is the flattened view a
//! records screen shows for each entry found by a recipient query.

use super::types::{Payload, Record};
use serde::{Deserialize, Serialize};

pub const DIAGNOSIS_KEY: &str = "diagnosis";
pub const TREATMENT_KEY: &str = "treatment";
pub const NOTES_KEY: &str = "notes";
pub const DATE_KEY: &str = "date";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HealthRecord {
    pub diagnosis: String,
    pub treatment: String,
    #[serde(default)]
    pub notes: String,
    /// ISO-8601 local time; filled in when the payload is built if absent.
    #[serde(default)]
    pub date: Option<String>,
}

impl HealthRecord {
    pub fn new(diagnosis: impl Into<String>, treatment: impl Into<String>) -> Self {
        HealthRecord {
            diagnosis: diagnosis.into(),
            treatment: treatment.into(),
            ..Default::default()
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn into_payload(self) -> Payload {
        let date = self.date.unwrap_or_else(|| {
            chrono::Local::now()
                .naive_local()
                .format("%Y-%m-%dT%H:%M:%S%.6f")
                .to_string()
        });

        let mut payload = Payload::new();
        payload.insert(DIAGNOSIS_KEY.to_string(), self.diagnosis);
        payload.insert(TREATMENT_KEY.to_string(), self.treatment);
        payload.insert(NOTES_KEY.to_string(), self.notes);
        payload.insert(DATE_KEY.to_string(), date);
        payload
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub doctor: String,
    pub diagnosis: String,
    pub treatment: String,
    pub notes: String,
    pub date: String,
    pub timestamp: f64,
}

impl From<&Record> for PatientRecord {
    fn from(record: &Record) -> Self {
        let field = |key: &str| record.payload.get(key).cloned().unwrap_or_default();
        PatientRecord {
            doctor: record.sender.clone(),
            diagnosis: field(DIAGNOSIS_KEY),
            treatment: field(TREATMENT_KEY),
            notes: field(NOTES_KEY),
            date: field(DATE_KEY),
            timestamp: record.timestamp,
        }
    }
}
