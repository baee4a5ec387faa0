use incus_client::{ConnectionState, IncusClient, IncusClientOptions};

/// Watches failover between socket and long-poll.
///
/// Restart or stop the bus while this runs to see the socket go stale,
/// retry, and hand traffic back to long-polling once it gives up.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let address = std::env::var("INCUS_ADDRESS").unwrap_or_else(|_| "http://localhost:4000".to_string());

    let client = IncusClient::new(
        &address,
        "reconnect-user",
        IncusClientOptions {
            max_retries: Some(3),
            retry_interval: Some(2_000),
            ..Default::default()
        },
    )?;

    let mut states = client.state_changes();
    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                println!("state -> {:?} (connected: {})", state, client.is_connected());
                if state == ConnectionState::Closed {
                    println!("No transport left, giving up");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                client.close().await;
                break;
            }
        }
    }

    Ok(())
}
