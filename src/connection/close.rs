use crate::connection::WsProtocolError;

/// Outcome of the close handshake. `code` is `None` for an abnormal close
/// (EOF, I/O failure) or a close frame with an empty payload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WsCloseReason {
    pub code: Option<u16>,
    pub reason: String,
}

impl WsCloseReason {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            reason: reason.into(),
        }
    }
}

pub(crate) fn valid_close_code(code: u16) -> bool {
    matches!(code, 1000..=1003 | 1007..=1011 | 3000..=4999)
}

// Close payload: optional 2-byte big-endian status code followed by a
// UTF-8 reason.
pub(crate) fn parse_close_payload(payload: &[u8]) -> Result<WsCloseReason, WsProtocolError> {
    match payload.len() {
        0 => Ok(WsCloseReason::default()),
        1 => Err(WsProtocolError::TruncatedClosePayload),
        _ => {
            let code = u16::from_be_bytes([payload[0], payload[1]]);
            if !valid_close_code(code) {
                return Err(WsProtocolError::BadCloseCode(code));
            }
            let reason = std::str::from_utf8(&payload[2..])
                .map_err(|_| WsProtocolError::InvalidUtf8)?;
            Ok(WsCloseReason::new(code, reason))
        }
    }
}

pub(crate) fn close_payload(code: Option<u16>, reason: &str) -> Vec<u8> {
    match code {
        None => Vec::new(),
        Some(code) => {
            let mut payload = Vec::with_capacity(2 + reason.len());
            payload.extend_from_slice(&code.to_be_bytes());
            payload.extend_from_slice(reason.as_bytes());
            payload
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{close_payload, parse_close_payload, valid_close_code, WsCloseReason};
    use crate::connection::WsProtocolError;

    #[test]
    fn code_table() {
        for code in [1000, 1001, 1002, 1003, 1007, 1008, 1009, 1010, 1011, 3000, 4000, 4999] {
            assert!(valid_close_code(code), "{code} should be valid");
        }
        for code in [0, 999, 1004, 1005, 1006, 1012, 1015, 1016, 2999, 5000, 65535] {
            assert!(!valid_close_code(code), "{code} should be invalid");
        }
    }

    #[test]
    fn normal_close_payload_is_03e8() {
        assert_eq!(close_payload(Some(1000), ""), [0x03, 0xE8]);
        assert_eq!(close_payload(Some(1000), "kthxbye"), b"\x03\xE8kthxbye");
        assert!(close_payload(None, "ignored without a code").is_empty());
    }

    #[test]
    fn parse_round_trips() {
        let payload = close_payload(Some(1001), "going away");
        assert_eq!(
            parse_close_payload(&payload).unwrap(),
            WsCloseReason::new(1001, "going away")
        );
        assert_eq!(parse_close_payload(&[]).unwrap(), WsCloseReason::default());
    }

    #[test]
    fn one_byte_payload_is_malformed() {
        assert!(matches!(
            parse_close_payload(&[0x03]),
            Err(WsProtocolError::TruncatedClosePayload)
        ));
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert!(matches!(
            parse_close_payload(&1006u16.to_be_bytes()),
            Err(WsProtocolError::BadCloseCode(1006))
        ));
    }

    #[test]
    fn malformed_reason_is_rejected() {
        assert!(matches!(
            parse_close_payload(&[0x03, 0xE8, 0xFF]),
            Err(WsProtocolError::InvalidUtf8)
        ));
    }
}
