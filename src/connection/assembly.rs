use crate::connection::utf8_validation::process_utf8;
use crate::connection::WsProtocolError;
use crate::message::{WsEvent, WsMessageKind};
use utf8::Incomplete;

// Collects the fragments of one message in arrival order. Text payloads
// are validated incrementally as fragments arrive and once more on
// completion, which also catches a sequence truncated at the message
// boundary. Reset after every completed message.
pub(crate) struct MessageAssembly {
    kind: Option<WsMessageKind>,
    data: Vec<u8>,
    utf8: Option<Incomplete>,
}

impl MessageAssembly {
    pub fn new() -> Self {
        Self {
            kind: None,
            data: Vec::new(),
            utf8: None,
        }
    }
    pub fn in_progress(&self) -> bool {
        self.kind.is_some()
    }
    pub fn start(&mut self, kind: WsMessageKind, payload: &[u8]) -> Result<(), WsProtocolError> {
        debug_assert!(self.kind.is_none());
        self.kind = Some(kind);
        self.utf8 = match kind {
            WsMessageKind::Text => Some(Incomplete::empty()),
            WsMessageKind::Binary => None,
        };
        self.append(payload)
    }
    pub fn push(&mut self, payload: &[u8]) -> Result<(), WsProtocolError> {
        debug_assert!(self.kind.is_some());
        self.append(payload)
    }
    pub fn finish(&mut self) -> Result<WsEvent, WsProtocolError> {
        let kind = self.kind.take().ok_or(WsProtocolError::StrayContinuation)?;
        let data = std::mem::take(&mut self.data);
        let utf8 = self.utf8.take();
        match kind {
            WsMessageKind::Text => {
                if utf8.map_or(false, |state| !state.is_empty()) {
                    return Err(WsProtocolError::IncompleteUtf8);
                }
                String::from_utf8(data)
                    .map(WsEvent::Text)
                    .map_err(|_| WsProtocolError::InvalidUtf8)
            }
            WsMessageKind::Binary => Ok(WsEvent::Binary(data)),
        }
    }
    fn append(&mut self, payload: &[u8]) -> Result<(), WsProtocolError> {
        if let Some(state) = &mut self.utf8 {
            if !process_utf8(state, payload) {
                return Err(WsProtocolError::InvalidUtf8);
            }
        }
        self.data.extend_from_slice(payload);
        Ok(())
    }
}
