use crate::connection::WsProtocolError;
use crate::frame::{FrameHead, WsOpcode, MAX_CONTROL_PAYLOAD};

// Checks a decoded frame header against the connection rules that depend
// on direction and on whether a fragmented message is being reassembled.
// Control frames may interleave with a fragmented message; data frames may
// not.
pub(crate) fn validate(head: &FrameHead, assembling: bool) -> Result<(), WsProtocolError> {
    if head.rsv != 0 {
        return Err(WsProtocolError::RsvBits);
    }
    if head.mask.is_some() {
        return Err(WsProtocolError::MaskedServerFrame);
    }
    if head.opcode.is_control() {
        if head.payload_len > MAX_CONTROL_PAYLOAD {
            return Err(WsProtocolError::OversizedControl);
        }
        if !head.fin {
            return Err(WsProtocolError::FragmentedControl);
        }
        return Ok(());
    }
    match (head.opcode, assembling) {
        (WsOpcode::Continuation, false) => Err(WsProtocolError::StrayContinuation),
        (WsOpcode::Continuation, true) => Ok(()),
        (_, true) => Err(WsProtocolError::InterleavedMessage),
        (_, false) => Ok(()),
    }
}
