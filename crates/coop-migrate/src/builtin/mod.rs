//! Migrations shipped with the cooperative dashboard.
//!
//! One module per migration, named after the version it brings the store
//! to. Append new migrations at the end of [`registry`].

use crate::error::MigrationError;
use crate::registry::MigrationRegistry;

mod m1_0_1_add_patient_email;
mod m1_0_2_default_notification_settings;

pub use m1_0_1_add_patient_email::Patient;
pub use m1_0_2_default_notification_settings::NotificationSettings;

/// Namespace holding the dashboard's application state.
pub const APP_NAMESPACE: &str = "app";

/// Key of the patient list.
pub const PATIENTS_KEY: &str = "patients";

/// Key of the notification settings object.
pub const NOTIFICATION_SETTINGS_KEY: &str = "notificationSettings";

/// The dashboard's migrations, in order.
pub fn registry() -> Result<MigrationRegistry, MigrationError> {
    let mut registry = MigrationRegistry::new();
    registry.register(m1_0_1_add_patient_email::Migration)?;
    registry.register(m1_0_2_default_notification_settings::Migration)?;
    Ok(registry)
}
