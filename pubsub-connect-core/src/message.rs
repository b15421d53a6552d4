//! Message model shared by connectors and their workers.
//!
//! A [`SourceMessage`] is what a worker pulls from the upstream subscription: opaque payload
//! bytes plus string attributes. Partition assignment, destination key and timestamp
//! extraction only ever look at these two parts.

use std::collections::HashMap;

/// Message pulled from an upstream subscription
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMessage {
    /// Server-assigned id, empty when unknown
    pub message_id: String,
    pub payload: Vec<u8>,
    pub attributes: HashMap<String, String>,
}

impl SourceMessage {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            ..Self::default()
        }
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = id.into();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Attribute value; an attribute set to the empty string is still present
    pub fn get_attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}
