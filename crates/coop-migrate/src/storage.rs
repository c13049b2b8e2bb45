//! Object-safe view of a [`StateStore`] handed to migration transforms.
//!
//! [`StateStore`] has an associated error type, so it cannot be used as a
//! trait object. Migrations instead receive `&mut dyn Storage`, which every
//! `StateStore` implements through a blanket impl with backend errors
//! flattened into [`MigrationError::Storage`].

use std::fmt;

use coop_store::StateStore;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::MigrationError;

/// Key-value access available to migrations.
pub trait Storage {
    /// Read the raw value at `(namespace, key)`.
    fn read(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, MigrationError>;

    /// Write a raw value at `(namespace, key)`.
    fn write(&mut self, namespace: &str, key: &str, value: &[u8]) -> Result<(), MigrationError>;

    /// Remove `(namespace, key)`. Missing keys are not an error.
    fn remove(&mut self, namespace: &str, key: &str) -> Result<(), MigrationError>;

    /// List keys in a namespace.
    fn keys(&self, namespace: &str) -> Result<Vec<String>, MigrationError>;
}

pub(crate) fn storage_err(e: impl fmt::Display) -> MigrationError {
    MigrationError::Storage(e.to_string())
}

impl<S: StateStore> Storage for S {
    fn read(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, MigrationError> {
        self.get(namespace, key).map_err(storage_err)
    }

    fn write(&mut self, namespace: &str, key: &str, value: &[u8]) -> Result<(), MigrationError> {
        self.put(namespace, key, value).map_err(storage_err)
    }

    fn remove(&mut self, namespace: &str, key: &str) -> Result<(), MigrationError> {
        self.delete(namespace, key).map_err(storage_err)
    }

    fn keys(&self, namespace: &str) -> Result<Vec<String>, MigrationError> {
        self.list_keys(namespace).map_err(storage_err)
    }
}

impl dyn Storage + '_ {
    /// Read and decode a JSON value. Returns `None` if the key is absent.
    pub fn read_json<T: DeserializeOwned>(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Option<T>, MigrationError> {
        match self.read(namespace, key)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| MigrationError::Deserialization(format!("{namespace}/{key}: {e}"))),
            None => Ok(None),
        }
    }

    /// Encode a value as JSON and write it.
    pub fn write_json<T: Serialize + ?Sized>(
        &mut self,
        namespace: &str,
        key: &str,
        value: &T,
    ) -> Result<(), MigrationError> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| MigrationError::Serialization(format!("{namespace}/{key}: {e}")))?;
        self.write(namespace, key, &bytes)
    }
}
