use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{APP_NAMESPACE, NOTIFICATION_SETTINGS_KEY};
use crate::error::MigrationError;
use crate::registry;
use crate::storage::Storage;

/// Notification preferences, stored as a camelCase JSON object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    pub email_enabled: bool,
    pub push_enabled: bool,
    pub appointment_reminders: bool,
    pub reminder_lead_hours: u32,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            email_enabled: true,
            push_enabled: false,
            appointment_reminders: true,
            reminder_lead_hours: 24,
        }
    }
}

pub struct Migration;

impl registry::Migration for Migration {
    fn version(&self) -> &str {
        "1.0.2"
    }

    fn description(&self) -> &str {
        "Add default notification settings"
    }

    fn up(&self, storage: &mut dyn Storage) -> Result<(), MigrationError> {
        if storage.read(APP_NAMESPACE, NOTIFICATION_SETTINGS_KEY)?.is_some() {
            return Ok(());
        }
        storage.write_json(
            APP_NAMESPACE,
            NOTIFICATION_SETTINGS_KEY,
            &NotificationSettings::default(),
        )
    }

    /// Removes the settings only while they still equal the defaults `up`
    /// writes. Anything the user has saved is left in place.
    fn down(&self, storage: &mut dyn Storage) -> Result<(), MigrationError> {
        let Some(raw) = storage.read(APP_NAMESPACE, NOTIFICATION_SETTINGS_KEY)? else {
            return Ok(());
        };
        let Ok(stored) = serde_json::from_slice::<Value>(&raw) else {
            return Ok(());
        };
        let defaults = serde_json::to_value(NotificationSettings::default())
            .map_err(|e| MigrationError::Serialization(e.to_string()))?;
        if stored == defaults {
            storage.remove(APP_NAMESPACE, NOTIFICATION_SETTINGS_KEY)?;
        }
        Ok(())
    }
}
