//! Envelope messages exchanged with execution contexts.
//!
//! Envelopes are JSON-encoded into owned byte buffers before they are put on
//! the channel, so nothing but bytes is shared between the caller and the
//! context.
//!
//! ```text
//! invocation: {"id": 1, "callable": "sum_range", "arguments": [5]}
//!             {"id": 1, "callable": "render", "input": {...}}
//! reply:      {"id": 1, "result": 10}
//!             {"id": 1, "error": "boom"}
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::callable::{Args, CallOutcome, CallableSource};
use crate::error::{Error, Result};

/// Request sent from the dispatcher to an execution context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    /// Per-context invocation number, echoed in the reply.
    pub id: u64,
    /// Which callable to run.
    pub callable: CallableSource,
    /// Call arguments.
    #[serde(flatten)]
    pub payload: Payload,
}

/// Argument envelope variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    /// Positional arguments.
    Arguments { arguments: Vec<Value> },
    /// A single fixed input value.
    Input { input: Value },
}

impl Payload {
    /// Arguments as seen by the callable.
    ///
    /// A fixed input becomes the callable's only positional argument.
    pub fn into_args(self) -> Args {
        match self {
            Self::Arguments { arguments } => Args::new(arguments),
            Self::Input { input } => Args::new(vec![input]),
        }
    }
}

/// Response sent from an execution context back to the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// Invocation this reply answers.
    pub id: u64,
    /// Result or error; exactly one is present on the wire.
    #[serde(flatten)]
    pub body: ReplyBody,
}

/// Reply payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyBody {
    /// The callable returned normally.
    Result(Value),
    /// The callable returned an error; only its message is kept.
    Error(String),
}

impl Reply {
    /// Build a reply from a callable outcome.
    pub fn from_outcome(id: u64, outcome: CallOutcome) -> Self {
        let body = match outcome {
            Ok(value) => ReplyBody::Result(value),
            Err(message) => ReplyBody::Error(message),
        };
        Self { id, body }
    }

    /// Convert back into a callable outcome.
    pub fn into_outcome(self) -> CallOutcome {
        match self.body {
            ReplyBody::Result(value) => Ok(value),
            ReplyBody::Error(message) => Err(message),
        }
    }
}

/// Encode an envelope into bytes.
///
/// # Errors
/// Returns `Serialization` if encoding fails or the encoded envelope exceeds
/// `max_bytes`.
pub fn encode<T: Serialize>(message: &T, max_bytes: usize) -> Result<Vec<u8>> {
    let bytes = serde_json::to_vec(message)
        .map_err(|e| Error::Serialization(format!("Failed to encode envelope: {}", e)))?;

    if bytes.len() > max_bytes {
        return Err(Error::Serialization(format!(
            "envelope too large: {} bytes (limit {})",
            bytes.len(),
            max_bytes
        )));
    }

    Ok(bytes)
}

/// Decode an envelope from bytes.
///
/// # Errors
/// Returns `Deserialization` if the bytes are not a valid envelope.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| Error::Deserialization(format!("Failed to decode envelope: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const LIMIT: usize = 1024 * 1024;

    #[test]
    fn test_invocation_wire_shape() {
        let invocation = Invocation {
            id: 7,
            callable: CallableSource::from("sum_range"),
            payload: Payload::Arguments {
                arguments: vec![json!(5)],
            },
        };

        let bytes = encode(&invocation, LIMIT).unwrap();
        let wire: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            wire,
            json!({"id": 7, "callable": "sum_range", "arguments": [5]})
        );

        let decoded: Invocation = decode(&bytes).unwrap();
        assert_eq!(decoded, invocation);
    }

    #[test]
    fn test_fixed_input_variant() {
        let bytes = br#"{"id": 1, "callable": "render", "input": {"rows": 3}}"#;
        let decoded: Invocation = decode(bytes).unwrap();

        match decoded.payload {
            Payload::Input { ref input } => assert_eq!(input, &json!({"rows": 3})),
            _ => panic!("Wrong payload variant"),
        }

        let args = decoded.payload.into_args();
        assert_eq!(args.len(), 1);
        assert_eq!(args.raw(0), Some(&json!({"rows": 3})));
    }

    #[test]
    fn test_reply_variants_are_exclusive() {
        let ok = Reply::from_outcome(3, Ok(json!(10)));
        let wire: Value = serde_json::from_slice(&encode(&ok, LIMIT).unwrap()).unwrap();
        assert_eq!(wire, json!({"id": 3, "result": 10}));

        let err = Reply::from_outcome(4, Err("boom".to_string()));
        let wire: Value = serde_json::from_slice(&encode(&err, LIMIT).unwrap()).unwrap();
        assert_eq!(wire, json!({"id": 4, "error": "boom"}));

        let decoded: Reply = decode(br#"{"id": 4, "error": "boom"}"#).unwrap();
        assert_eq!(decoded.into_outcome(), Err("boom".to_string()));
    }

    #[test]
    fn test_null_result_survives() {
        let decoded: Reply = decode(br#"{"id": 1, "result": null}"#).unwrap();
        assert_eq!(decoded.into_outcome(), Ok(Value::Null));
    }

    #[test]
    fn test_encode_rejects_oversized() {
        let reply = Reply::from_outcome(1, Ok(json!("x".repeat(64))));
        let err = encode(&reply, 16).unwrap_err();
        assert!(matches!(err, Error::Serialization(msg) if msg.contains("too large")));
    }

    #[test]
    fn test_decode_garbage() {
        let err = decode::<Invocation>(b"not json").unwrap_err();
        assert!(matches!(err, Error::Deserialization(_)));
    }
}
