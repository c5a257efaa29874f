use anyhow::Result;
use futures::executor::block_on;
use futures::FutureExt;
use log::LevelFilter;
use simple_logger::SimpleLogger;
use smolws::{WsCallback, WsClient, WsConfig, WsEvent};
use std::sync::Arc;
use std::time::Duration;

// Connects to an echo server, sends a ping and a text message, logs what
// comes back and closes after a second.
fn main() -> Result<()> {
    SimpleLogger::new().with_level(LevelFilter::Debug).init()?;
    let host = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let port = match std::env::args().nth(2) {
        Some(port) => port.parse()?,
        None => 9001,
    };
    block_on(async {
        let callback: WsCallback = Arc::new(|event, _client| {
            async move {
                match event {
                    WsEvent::Text(text) => log::info!("text: {}", text),
                    WsEvent::Binary(payload) => log::info!("binary: {} bytes", payload.len()),
                    WsEvent::Ping(payload) => log::info!("ping: {} bytes", payload.len()),
                    WsEvent::Pong(payload) => log::info!("pong: {} bytes", payload.len()),
                    WsEvent::Close(reason) => log::info!("closed: {:?}", reason),
                }
            }
            .boxed()
        });
        let client = WsClient::open(&WsConfig::new(host, port), callback).await?;
        client.send_ping(b"anyone home?").await?;
        client.send_text("echo me").await?;
        std::thread::sleep(Duration::from_secs(1));
        client.close(Some(1000), "done").await;
        Ok(())
    })
}
