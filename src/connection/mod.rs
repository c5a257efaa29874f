mod assembly;
mod close;
mod utf8_validation;
mod validate;

pub use close::WsCloseReason;
pub(crate) use close::close_payload;

use crate::client::{WsCallback, WsClient};
use crate::frame::{FrameDecodeError, FrameDecoder, FrameHeadParseError, WsFrame, WsOpcode};
use crate::message::{WsEvent, WsMessageKind};
use assembly::MessageAssembly;
use close::parse_close_payload;
use validate::validate;

/// A violation of the framing rules by the peer. `status_code` is the
/// code the peer is told in the resulting close frame.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WsProtocolError {
    #[error("one or more RSV bits are set")]
    RsvBits,
    #[error("received a masked frame from the server")]
    MaskedServerFrame,
    #[error("data frame interleaved with a fragmented message")]
    InterleavedMessage,
    #[error("continuation frame without a message in progress")]
    StrayContinuation,
    #[error("fragmented control frame")]
    FragmentedControl,
    #[error("control frame payload exceeds 125 bytes")]
    OversizedControl,
    #[error("invalid opcode {0:#x}")]
    InvalidOpcode(u8),
    #[error("64-bit payload length has the high bit set")]
    LengthHighBit,
    #[error("invalid close code {0}")]
    BadCloseCode(u16),
    #[error("close payload of a single byte")]
    TruncatedClosePayload,
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("text ends inside a UTF-8 sequence")]
    IncompleteUtf8,
}

impl WsProtocolError {
    pub fn status_code(&self) -> u16 {
        match self {
            WsProtocolError::InvalidUtf8 | WsProtocolError::IncompleteUtf8 => 1007,
            _ => 1002,
        }
    }
}

// Runs until the connection terminates: decodes one frame at a time,
// polices it, reassembles fragmented messages and drives the user
// callback. The loop is the only reader of the transport; everything it
// sends goes through the client's send lock, which is never held while
// the callback runs.
pub(crate) async fn run(client: WsClient, callback: WsCallback) {
    let transport = client.transport();
    let reader = &*transport;
    let mut assembly = MessageAssembly::new();
    loop {
        // A fulfilled result slot means the connection was closed locally;
        // no further events may be delivered.
        if client.is_finished() {
            return;
        }
        let frame = match FrameDecoder::default().decode(reader).await {
            Ok((_, frame)) => frame,
            Err(FrameDecodeError::Io(err)) => {
                log::debug!("transport ended: {}", err);
                client.shutdown();
                client.finish(WsCloseReason::default(), &callback).await;
                return;
            }
            Err(FrameDecodeError::Parse(err)) => {
                let err = match err {
                    FrameHeadParseError::InvalidOpcode(n) => WsProtocolError::InvalidOpcode(n),
                    FrameHeadParseError::LengthHighBit => WsProtocolError::LengthHighBit,
                    // the decoder keeps reading until the head is complete
                    FrameHeadParseError::Incomplete(_) => unreachable!(),
                };
                fail(&client, &callback, err).await;
                return;
            }
            Err(FrameDecodeError::OversizedControl(_)) => {
                fail(&client, &callback, WsProtocolError::OversizedControl).await;
                return;
            }
        };
        log::trace!(
            "frame: opcode {:?}, fin {}, {} payload bytes",
            frame.opcode(),
            frame.fin(),
            frame.payload.len()
        );
        if let Err(err) = validate(&frame.head, assembly.in_progress()) {
            fail(&client, &callback, err).await;
            return;
        }
        match frame.opcode() {
            WsOpcode::Text | WsOpcode::Binary | WsOpcode::Continuation => {
                match assemble(&mut assembly, &frame) {
                    Ok(Some(event)) => callback(event, client.clone()).await,
                    Ok(None) => {}
                    Err(err) => {
                        fail(&client, &callback, err).await;
                        return;
                    }
                }
            }
            WsOpcode::Ping => {
                // the pong must be on the wire before the callback runs
                if let Err(err) = client.reply_pong(&frame.payload).await {
                    log::debug!("pong not sent: {}", err);
                    client.shutdown();
                    client.finish(WsCloseReason::default(), &callback).await;
                    return;
                }
                callback(WsEvent::Ping(frame.payload), client.clone()).await;
            }
            WsOpcode::Pong => callback(WsEvent::Pong(frame.payload), client.clone()).await,
            WsOpcode::Close => {
                match parse_close_payload(&frame.payload) {
                    Ok(reason) => {
                        if let Err(err) = client.send_close_frame(reason.code, "").await {
                            log::debug!("close reply not sent: {}", err);
                        }
                        client.shutdown();
                        client.finish(reason, &callback).await;
                    }
                    Err(err) => fail(&client, &callback, err).await,
                }
                return;
            }
        }
    }
}

fn assemble(
    assembly: &mut MessageAssembly,
    frame: &WsFrame,
) -> Result<Option<WsEvent>, WsProtocolError> {
    if let Some(kind) = WsMessageKind::from_opcode(frame.opcode()) {
        assembly.start(kind, &frame.payload)?;
    } else {
        assembly.push(&frame.payload)?;
    }
    match frame.fin() {
        true => assembly.finish().map(Some),
        false => Ok(None),
    }
}

// Tells the peer which rule it broke, tears the connection down and
// delivers the close event.
async fn fail(client: &WsClient, callback: &WsCallback, err: WsProtocolError) {
    let status = err.status_code();
    log::debug!("protocol violation ({}): {}", status, err);
    if let Err(io_err) = client.send_close_frame(Some(status), "").await {
        log::debug!("close frame not sent: {}", io_err);
    }
    client.shutdown();
    client
        .finish(WsCloseReason::new(status, ""), callback)
        .await;
}
