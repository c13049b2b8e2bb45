use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{APP_NAMESPACE, PATIENTS_KEY};
use crate::error::MigrationError;
use crate::registry;
use crate::storage::Storage;

/// A patient record as stored from 1.0.1 on.
///
/// Only `email` is known here; every other field passes through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub struct Migration;

impl registry::Migration for Migration {
    fn version(&self) -> &str {
        "1.0.1"
    }

    fn description(&self) -> &str {
        "Add email field to patients"
    }

    fn up(&self, storage: &mut dyn Storage) -> Result<(), MigrationError> {
        let Some(mut patients) = storage.read_json::<Vec<Patient>>(APP_NAMESPACE, PATIENTS_KEY)?
        else {
            return Ok(());
        };
        for patient in &mut patients {
            patient.email.get_or_insert_with(String::new);
        }
        storage.write_json(APP_NAMESPACE, PATIENTS_KEY, &patients)
    }

    fn down(&self, storage: &mut dyn Storage) -> Result<(), MigrationError> {
        let Some(mut patients) = storage.read_json::<Vec<Patient>>(APP_NAMESPACE, PATIENTS_KEY)?
        else {
            return Ok(());
        };
        // Only the placeholder written by `up` goes; real addresses stay.
        for patient in &mut patients {
            if patient.email.as_deref() == Some("") {
                patient.email = None;
            }
        }
        storage.write_json(APP_NAMESPACE, PATIENTS_KEY, &patients)
    }
}
