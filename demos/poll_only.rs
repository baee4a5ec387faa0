use incus_client::{IncusClient, IncusClientOptions};
use serde_json::json;
use std::time::Duration;

/// Talks to the bus over long-polling only, as a client without socket support would
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let address = std::env::var("INCUS_ADDRESS").unwrap_or_else(|_| "http://localhost:4000".to_string());

    let client = IncusClient::new(
        &address,
        "poll-user",
        IncusClientOptions {
            disable_socket: true,
            page: Some("lobby".to_string()),
            poll_timeout: Some(30_000),
            ..Default::default()
        },
    )?;

    let mut chat = client.listen("chat");
    client.on("connect", |_| println!("Long-poll connected"));

    client.set_groups(["demo"]);
    client.message_groups("chat", ["demo"], json!({"text": "sent via long-poll"}));

    loop {
        tokio::select! {
            Some(data) = chat.recv() => println!("chat: {}", data),
            _ = tokio::time::sleep(Duration::from_secs(10)) => {
                println!("state: {:?}, connected: {}", client.state(), client.is_connected());
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.close().await;
    Ok(())
}
