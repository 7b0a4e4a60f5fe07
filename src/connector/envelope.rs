//! Envelope codec
//!
//! An `Envelope` is the JSON object carried as the payload of one transport
//! frame: the application's fields plus a `sender` field naming the
//! connector that published it. Encoding always works on a copy of the
//! caller's message; decoding classifies each payload as accepted, an echo of
//! our own publication, or anonymous (no usable sender).

use serde::Serialize;
use serde_json::{Map, Value};

/// Name of the field stamped on every outgoing message.
pub const SENDER_FIELD: &str = "sender";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Envelope(Map<String, Value>);

impl Envelope {
    /// Serializes `message` and stamps the copy with `sender`, replacing any
    /// `sender` field the message already had. Fails with a reason when the
    /// message cannot be serialized or is not a JSON object.
    pub fn stamp<T: Serialize + ?Sized>(sender: &str, message: &T) -> Result<Self, String> {
        let mut fields = match serde_json::to_value(message) {
            Ok(Value::Object(fields)) => fields,
            Ok(other) => {
                return Err(format!(
                    "message must serialize to a JSON object, got {}",
                    json_kind(&other)
                ));
            }
            Err(e) => return Err(e.to_string()),
        };
        fields.insert(SENDER_FIELD.to_string(), Value::String(sender.to_string()));
        Ok(Self(fields))
    }

    /// Payload text for the transport.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }

    pub fn sender(&self) -> &str {
        self.0
            .get(SENDER_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl PartialEq<Value> for Envelope {
    fn eq(&self, other: &Value) -> bool {
        other.as_object() == Some(&self.0)
    }
}

/// Outcome of decoding an inbound payload that was valid JSON.
#[derive(Debug, PartialEq)]
pub enum Decoded {
    /// Published by another connector; deliver it.
    Accepted(Envelope),
    /// Published by this connector.
    Echo,
    /// Not an object, or no string `sender` field.
    Anonymous,
}

/// Decodes `payload` relative to the local sender identity. Only invalid JSON
/// is an error.
pub fn decode(local_sender: &str, payload: &str) -> Result<Decoded, serde_json::Error> {
    let Value::Object(fields) = serde_json::from_str::<Value>(payload)? else {
        return Ok(Decoded::Anonymous);
    };

    match fields.get(SENDER_FIELD) {
        Some(Value::String(sender)) if sender.is_empty() => Ok(Decoded::Anonymous),
        Some(Value::String(sender)) if sender == local_sender => Ok(Decoded::Echo),
        Some(Value::String(_)) => Ok(Decoded::Accepted(Envelope(fields))),
        _ => Ok(Decoded::Anonymous),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
