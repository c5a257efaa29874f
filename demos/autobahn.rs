use anyhow::Result;
use futures::executor::block_on;
use futures::FutureExt;
use log::LevelFilter;
use simple_logger::SimpleLogger;
use smolws::{WsCallback, WsClient, WsConfig, WsEvent};
use std::sync::mpsc::channel;
use std::sync::{Arc, Mutex};

// Drives the Autobahn fuzzingserver client suite: fetch the case count,
// echo every message back for each case, then ask the server to write its
// reports. Start the fuzzingserver on port 9001 and point this at it.

const AGENT: &str = "smolws";

fn main() -> Result<()> {
    SimpleLogger::new().with_level(LevelFilter::Info).init()?;
    let host = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1".to_string());
    block_on(async {
        let count = case_count(&host).await?;
        log::info!("fuzzingserver offers {} cases", count);
        for case in 1..=count {
            run_case(&host, case).await?;
        }
        update_reports(&host).await?;
        log::info!("reports updated");
        Ok(())
    })
}

async fn run_case(host: &str, case: usize) -> Result<()> {
    let config =
        WsConfig::new(host, 9001).with_path(format!("/runCase?case={case}&agent={AGENT}"));
    let callback: WsCallback = Arc::new(|event, client| {
        async move {
            match event {
                WsEvent::Text(text) => {
                    let _ = client.send_text(&text).await;
                }
                WsEvent::Binary(payload) => {
                    let _ = client.send_binary(&payload).await;
                }
                _ => {}
            }
        }
        .boxed()
    });
    let client = WsClient::open(&config, callback).await?;
    let result = client.wait_result();
    log::info!("case {}: closed with {:?}", case, result.code);
    Ok(())
}

async fn case_count(host: &str) -> Result<usize> {
    let (tx, rx) = channel();
    let tx = Arc::new(Mutex::new(tx));
    let callback: WsCallback = Arc::new(move |event, _client| {
        if let WsEvent::Text(text) = event {
            let _ = tx.lock().unwrap().send(text);
        }
        async {}.boxed()
    });
    let config = WsConfig::new(host, 9001).with_path("/getCaseCount");
    let client = WsClient::open(&config, callback).await?;
    let count = rx.recv()?.trim().parse()?;
    client.wait_result();
    Ok(count)
}

async fn update_reports(host: &str) -> Result<()> {
    let config = WsConfig::new(host, 9001).with_path(format!("/updateReports?agent={AGENT}"));
    let callback: WsCallback = Arc::new(|_event, _client| async {}.boxed());
    let client = WsClient::open(&config, callback).await?;
    client.wait_result();
    Ok(())
}
