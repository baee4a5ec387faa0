use incus_client::IncusClient;
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let address = std::env::var("INCUS_ADDRESS").unwrap_or_else(|_| "http://localhost:4000".to_string());
    let user = std::env::var("INCUS_USER").unwrap_or_else(|_| "demo-user".to_string());

    // Create client; connecting starts right away
    println!("Connecting to {} as {}...", address, user);
    let client = IncusClient::connect(&address, &user)?;

    let greeter = client.clone();
    client.on("connect", move |_| {
        println!("Connected!");
        greeter.message_page("chat", "lobby", json!({"text": "hello from rust"}));
    });
    client.on("chat", |data| println!("chat: {}", data));

    client.set_page("lobby");

    // Keep connection alive
    tokio::signal::ctrl_c().await?;

    println!("Closing...");
    client.close().await;
    println!("Closed!");

    Ok(())
}
