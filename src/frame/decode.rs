use crate::frame::{payload_mask, FrameHead, FrameHeadParseError, WsFrame, MAX_CONTROL_PAYLOAD};
use futures_lite::AsyncRead;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

// Per-poll read granularity. Keeps huge advertised lengths from reserving
// memory before any payload byte has actually arrived.
const READ_CHUNK: usize = 8192;

#[derive(Copy, Clone, Debug, Default)]
pub struct FrameDecoder {}

impl FrameDecoder {
    /// Reads exactly one frame from `transport`, unmasking the payload in
    /// place when the mask bit is set. The transport is handed back on
    /// completion so the caller can keep reading from it.
    pub fn decode<T: AsyncRead + Unpin>(self, transport: T) -> FrameDecode<T> {
        FrameDecode {
            transport: Some(transport),
            head_buffer: [0u8; 14],
            head_len: 0,
            payload: None,
        }
    }
}

pub struct FrameDecode<T: AsyncRead + Unpin> {
    transport: Option<T>,
    head_buffer: [u8; 14],
    head_len: usize,
    payload: Option<PayloadReader>,
}

impl<T: AsyncRead + Unpin> Future for FrameDecode<T> {
    type Output = Result<(T, WsFrame), FrameDecodeError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut transport = self.transport.take().unwrap();
        loop {
            let this = &mut *self;
            match &mut this.payload {
                None => {
                    let min = match FrameHead::parse(&this.head_buffer[0..this.head_len]) {
                        Ok(head) => {
                            // bail before a single payload byte is read or
                            // buffered; the declared length is attacker
                            // controlled
                            if head.opcode.is_control() && head.payload_len > MAX_CONTROL_PAYLOAD
                            {
                                return Poll::Ready(Err(FrameDecodeError::OversizedControl(
                                    head.payload_len,
                                )));
                            }
                            this.payload = Some(PayloadReader::new(head));
                            continue;
                        }
                        Err(FrameHeadParseError::Incomplete(min)) => min,
                        Err(err) => return Poll::Ready(Err(err.into())),
                    };
                    let head_len = this.head_len;
                    match Pin::new(&mut transport)
                        .poll_read(cx, &mut this.head_buffer[head_len..min])
                    {
                        Poll::Ready(Ok(0)) => {
                            return Poll::Ready(Err(io::Error::from(
                                io::ErrorKind::UnexpectedEof,
                            )
                            .into()))
                        }
                        Poll::Ready(Ok(n)) => this.head_len += n,
                        Poll::Ready(Err(err)) => return Poll::Ready(Err(err.into())),
                        Poll::Pending => {
                            this.transport = Some(transport);
                            return Poll::Pending;
                        }
                    }
                }
                Some(reader) => match reader.poll_read(&mut transport, cx) {
                    Poll::Ready(Ok(())) => {
                        let frame = this.payload.take().unwrap().into_frame();
                        return Poll::Ready(Ok((transport, frame)));
                    }
                    Poll::Ready(Err(err)) => return Poll::Ready(Err(err.into())),
                    Poll::Pending => {
                        this.transport = Some(transport);
                        return Poll::Pending;
                    }
                },
            }
        }
    }
}

struct PayloadReader {
    head: FrameHead,
    data: Vec<u8>,
}

impl PayloadReader {
    fn new(head: FrameHead) -> Self {
        let reserve = head.payload_len.min(READ_CHUNK as u64) as usize;
        Self {
            head,
            data: Vec::with_capacity(reserve),
        }
    }
    // Resolves once exactly `payload_len` bytes have been read, tolerating
    // arbitrarily short reads. A zero-length read mid-payload is EOF.
    fn poll_read<T: AsyncRead + Unpin>(
        &mut self,
        transport: &mut T,
        cx: &mut Context<'_>,
    ) -> Poll<io::Result<()>> {
        while (self.data.len() as u64) < self.head.payload_len {
            let remaining = self.head.payload_len - self.data.len() as u64;
            let mut chunk = [0u8; READ_CHUNK];
            let want = remaining.min(READ_CHUNK as u64) as usize;
            match Pin::new(&mut *transport).poll_read(cx, &mut chunk[0..want]) {
                Poll::Ready(Ok(0)) => {
                    return Poll::Ready(Err(io::ErrorKind::UnexpectedEof.into()))
                }
                Poll::Ready(Ok(n)) => {
                    if let Some(key) = self.head.mask {
                        payload_mask(key, self.data.len(), &mut chunk[0..n]);
                    }
                    self.data.extend_from_slice(&chunk[0..n]);
                }
                Poll::Ready(Err(err)) => return Poll::Ready(Err(err)),
                Poll::Pending => return Poll::Pending,
            }
        }
        Poll::Ready(Ok(()))
    }
    fn into_frame(self) -> WsFrame {
        WsFrame {
            head: self.head,
            payload: self.data,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum FrameDecodeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] FrameHeadParseError),
    #[error("control frame declares a {0} byte payload")]
    OversizedControl(u64),
}
