//! Message framing: `serde` messages as JSON frames.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CallError;
use crate::transport::Frame;

pub fn encode<T: Serialize>(message: &T) -> Result<Frame, CallError> {
    serde_json::to_vec(message).map_err(|e| CallError::Encode {
        message: std::any::type_name::<T>(),
        reason: e.to_string(),
    })
}

pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T, CallError> {
    serde_json::from_slice(frame).map_err(|e| CallError::Decode {
        message: std::any::type_name::<T>(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        sequence: u64,
    }

    #[test]
    fn decode_reports_the_expected_message_type() {
        let err = decode::<Ping>(b"{\"sequence\":\"one\"}").unwrap_err();

        match err {
            CallError::Decode { message, .. } => assert!(message.ends_with("Ping")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn frames_are_json() {
        let frame = encode(&Ping { sequence: 3 }).unwrap();

        assert_eq!(frame, b"{\"sequence\":3}".to_vec());
        assert_eq!(decode::<Ping>(&frame).unwrap(), Ping { sequence: 3 });
    }
}
