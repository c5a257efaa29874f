use crate::connection::{self, WsCloseReason};
use crate::frame::{FrameEncoder, WsOpcode};
use crate::http::{self, HandshakeError};
use crate::message::WsEvent;
use async_io::Async;
use futures::future::BoxFuture;
use futures::prelude::*;
use std::io;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;

/// Invoked by the receive loop for every delivered event. Runs on the
/// receiver thread with the send lock released, so calling back into
/// [`WsClient::send_text`] and friends from inside is fine.
pub type WsCallback = Arc<dyn Fn(WsEvent, WsClient) -> BoxFuture<'static, ()> + Send + Sync>;

pub struct WsConfig {
    pub host: String,
    pub port: u16,
    /// Request target of the upgrade, including any query string.
    pub path: String,
}

impl WsConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            path: "/".to_string(),
        }
    }
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }
}

#[derive(thiserror::Error, Debug)]
pub enum WsClientError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
    #[error("connection already closed")]
    Closed,
}

pub(crate) struct WsSender {
    transport: Arc<Async<TcpStream>>,
    encoder: FrameEncoder,
}

impl WsSender {
    async fn send(&mut self, opcode: WsOpcode, fin: bool, payload: &[u8]) -> io::Result<()> {
        let buffer = self.encoder.encode_vec(opcode, fin, payload);
        let mut transport = &*self.transport;
        transport.write_all(&buffer).await?;
        transport.flush().await
    }
}

// Single-assignment close outcome. The first fulfillment wins; later ones
// are no-ops.
struct ResultSlot {
    cell: Mutex<Option<WsCloseReason>>,
    cond: Condvar,
}

impl ResultSlot {
    fn new() -> Self {
        Self {
            cell: Mutex::new(None),
            cond: Condvar::new(),
        }
    }
    fn set_once(&self, reason: WsCloseReason) -> bool {
        let mut slot = self.cell.lock().unwrap_or_else(PoisonError::into_inner);
        match &*slot {
            Some(_) => false,
            None => {
                *slot = Some(reason);
                self.cond.notify_all();
                true
            }
        }
    }
    fn get(&self) -> Option<WsCloseReason> {
        self.cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
    fn wait(&self) -> WsCloseReason {
        let mut slot = self.cell.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(reason) = &*slot {
                return reason.clone();
            }
            slot = self
                .cond
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

struct Inner {
    transport: Arc<Async<TcpStream>>,
    sender: futures::lock::Mutex<WsSender>,
    result: ResultSlot,
}

/// Handle to one WebSocket connection. Cheap to clone; all clones refer
/// to the same connection.
#[derive(Clone)]
pub struct WsClient {
    inner: Arc<Inner>,
}

impl WsClient {
    /// Connects, performs the upgrade handshake and spawns the background
    /// receiver driving `callback`. Handshake failures are reported here
    /// and no receiver is started.
    pub async fn open(config: &WsConfig, callback: WsCallback) -> Result<WsClient, WsClientError> {
        let addr = (config.host.as_str(), config.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "host resolved to no address")
            })?;
        let mut transport = Async::<TcpStream>::connect(addr).await?;
        http::handshake(&mut transport, &config.host, config.port, &config.path).await?;
        log::debug!("connected to ws://{}:{}{}", config.host, config.port, config.path);
        let transport = Arc::new(transport);
        let client = WsClient {
            inner: Arc::new(Inner {
                transport: transport.clone(),
                sender: futures::lock::Mutex::new(WsSender {
                    transport,
                    encoder: FrameEncoder::client(),
                }),
                result: ResultSlot::new(),
            }),
        };
        let receiver = client.clone();
        thread::Builder::new()
            .name("smolws-recv".to_string())
            .spawn(move || futures::executor::block_on(connection::run(receiver, callback)))?;
        Ok(client)
    }

    pub async fn send_text(&self, text: &str) -> Result<(), WsClientError> {
        self.emit(WsOpcode::Text, true, text.as_bytes()).await
    }
    pub async fn send_binary(&self, payload: &[u8]) -> Result<(), WsClientError> {
        self.emit(WsOpcode::Binary, true, payload).await
    }
    pub async fn send_ping(&self, payload: &[u8]) -> Result<(), WsClientError> {
        self.emit(WsOpcode::Ping, true, payload).await
    }
    pub async fn send_pong(&self, payload: &[u8]) -> Result<(), WsClientError> {
        self.emit(WsOpcode::Pong, true, payload).await
    }

    /// Writes one frame under the send lock. Fails with
    /// [`WsClientError::Closed`] once the close outcome is set.
    pub async fn emit(
        &self,
        opcode: WsOpcode,
        fin: bool,
        payload: &[u8],
    ) -> Result<(), WsClientError> {
        let mut sender = self.inner.sender.lock().await;
        if self.inner.result.get().is_some() {
            return Err(WsClientError::Closed);
        }
        sender.send(opcode, fin, payload).await?;
        Ok(())
    }

    /// Initiates the close handshake: sends a close frame carrying `code`
    /// and `reason`, shuts the socket down (which unblocks the receiver)
    /// and fulfills the close outcome. Later calls are no-ops.
    pub async fn close(&self, code: Option<u16>, reason: &str) {
        let mut sender = self.inner.sender.lock().await;
        if self.inner.result.get().is_some() {
            return;
        }
        let payload = connection::close_payload(code, reason);
        if let Err(err) = sender.send(WsOpcode::Close, true, &payload).await {
            log::debug!("close frame not sent: {}", err);
        }
        self.shutdown();
        self.inner.result.set_once(WsCloseReason {
            code,
            reason: reason.to_string(),
        });
    }

    /// The close outcome, once the connection has terminated.
    pub fn result(&self) -> Option<WsCloseReason> {
        self.inner.result.get()
    }
    /// Blocks the calling thread until the close outcome is set.
    pub fn wait_result(&self) -> WsCloseReason {
        self.inner.result.wait()
    }

    pub(crate) fn transport(&self) -> Arc<Async<TcpStream>> {
        self.inner.transport.clone()
    }
    pub(crate) fn is_finished(&self) -> bool {
        self.inner.result.get().is_some()
    }
    pub(crate) async fn reply_pong(&self, payload: &[u8]) -> io::Result<()> {
        let mut sender = self.inner.sender.lock().await;
        sender.send(WsOpcode::Pong, true, payload).await
    }
    pub(crate) async fn send_close_frame(
        &self,
        code: Option<u16>,
        reason: &str,
    ) -> io::Result<()> {
        let mut sender = self.inner.sender.lock().await;
        let payload = connection::close_payload(code, reason);
        sender.send(WsOpcode::Close, true, &payload).await
    }
    pub(crate) fn shutdown(&self) {
        // the peer may already have torn the socket down
        let _ = self.inner.transport.get_ref().shutdown(Shutdown::Both);
    }
    // Sets the close outcome and, if this was the first fulfillment,
    // delivers the final close event. Called only from the receiver.
    pub(crate) async fn finish(&self, reason: WsCloseReason, callback: &WsCallback) {
        if self.inner.result.set_once(reason.clone()) {
            callback(WsEvent::Close(reason), self.clone()).await;
        }
    }
}
