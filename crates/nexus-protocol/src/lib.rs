#![forbid(unsafe_code)]

mod events;

use serde::Serialize;

pub use events::{BroadcastEvent, EventScope};

/// Current broadcast envelope version.
pub const PROTOCOL_VERSION: u16 = 1;
/// Maximum allowed envelope payload bytes.
pub const MAX_EVENT_BYTES: usize = 256 * 1024;

/// Versioned broadcast envelope. All events use `{ v, t, d }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope<T> {
    pub v: u16,
    pub t: BroadcastEvent,
    pub d: T,
}

impl<T> Envelope<T> {
    #[must_use]
    pub fn new(event: BroadcastEvent, data: T) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            t: event,
            d: data,
        }
    }
}

/// Serialize an outgoing envelope, enforcing `max_bytes`.
///
/// # Errors
/// Returns [`ProtocolError::OversizedPayload`] when the encoded envelope is
/// larger than `max_bytes`, or [`ProtocolError::Serialize`] when `data`
/// cannot be serialized.
pub fn encode_envelope<T: Serialize>(
    event: BroadcastEvent,
    data: &T,
    max_bytes: usize,
) -> Result<String, ProtocolError> {
    let payload = serde_json::to_string(&Envelope::new(event, data))?;
    if payload.len() > max_bytes {
        return Err(ProtocolError::OversizedPayload {
            max: max_bytes,
            actual: payload.len(),
        });
    }
    Ok(payload)
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("payload exceeds max size: max={max} bytes actual={actual} bytes")]
    OversizedPayload { max: usize, actual: usize },
    #[error("payload could not be serialized")]
    Serialize,
}

impl From<serde_json::Error> for ProtocolError {
    fn from(_: serde_json::Error) -> Self {
        Self::Serialize
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::{encode_envelope, BroadcastEvent, ProtocolError, PROTOCOL_VERSION};

    #[test]
    fn envelope_carries_version_type_and_data() {
        let payload = encode_envelope(
            BroadcastEvent::RoleUpdate,
            &serde_json::json!({"id": "srv-1"}),
            1024,
        )
        .unwrap();
        let envelope: Value = serde_json::from_str(&payload).unwrap();

        assert_eq!(envelope["v"], PROTOCOL_VERSION);
        assert_eq!(envelope["t"], "role_update");
        assert_eq!(envelope["d"]["id"], "srv-1");
        assert_eq!(envelope.as_object().unwrap().len(), 3);
    }

    #[test]
    fn encode_enforces_size_limit() {
        let error = encode_envelope(BroadcastEvent::MessageCreate, &"x".repeat(64), 32)
            .unwrap_err();
        assert!(matches!(
            error,
            ProtocolError::OversizedPayload { max: 32, .. }
        ));
    }
}
