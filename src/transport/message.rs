//! Queue message: JSON body plus string attributes.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::payload::Payload;

/// Attribute carrying the payload type tag. Mandatory on every published message.
pub const TYPE_INFO_ATTRIBUTE: &str = "TypeInfo";
/// Attribute carrying the publisher's correlation id.
pub const CORRELATION_ID_ATTRIBUTE: &str = "correlation-id";
/// Attribute carrying the organisation a queued command targets.
pub const ORGANISATION_ID_ATTRIBUTE: &str = "organisation-id";

/// A message travelling over a [`QueueTransport`](super::QueueTransport).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub body: String,
    pub attributes: BTreeMap<String, String>,
}

impl Message {
    /// Raw message with the given body and no attributes.
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            body: body.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Serialize a payload, tagging it with its type and its own attributes.
    pub fn encode<P: Payload + Serialize>(payload: &P) -> Result<Self, serde_json::Error> {
        let mut message =
            Self::new(serde_json::to_string(payload)?).with_attribute(TYPE_INFO_ATTRIBUTE, P::TYPE_NAME);
        for (key, value) in payload.message_attributes() {
            message.attributes.insert(key, value);
        }
        Ok(message)
    }

    /// Deserialize the body.
    pub fn decode<P: DeserializeOwned>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// The payload type tag, if present.
    pub fn type_info(&self) -> Option<&str> {
        self.attribute(TYPE_INFO_ATTRIBUTE)
    }
}
