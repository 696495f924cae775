use futures_util::{SinkExt, StreamExt};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

// Connects to the panel socket, prints the first rendered view and, when a
// channel index is given, sends a toggle-on command for it.
#[tokio::main]
async fn main() {
    let raw = std::env::args().nth(1).unwrap_or_else(|| "ws://127.0.0.1:8080/ws/panel".to_string());
    let toggle_channel = std::env::args().nth(2).and_then(|c| c.parse::<usize>().ok());

    let url = match Url::parse(&raw) {
        Ok(url) => url,
        Err(e) => {
            eprintln!("Invalid URL {}: {}", raw, e);
            std::process::exit(1);
        }
    };
    eprintln!("Connecting to {}", url);
    let (ws_stream, _) = match connect_async(url.as_str()).await {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("WS connect failed: {}", e);
            std::process::exit(1);
        }
    };
    let (mut write, mut read) = ws_stream.split();

    // Wait up to 5s for the first panel view, then print and exit
    match timeout(Duration::from_secs(5), read.next()).await {
        Ok(Some(Ok(Message::Text(t)))) => match serde_json::from_str::<serde_json::Value>(&t) {
            Ok(view) => {
                println!("Banner: {}", view["banner"].as_str().unwrap_or("?"));
                println!("Relays: {}", view["relays"].as_array().map(|r| r.len()).unwrap_or(0));
            }
            Err(e) => {
                eprintln!("Panel view is not JSON: {}", e);
                std::process::exit(5);
            }
        },
        Ok(Some(Ok(other))) => {
            println!("WS non-text message: {:?}", other);
        }
        Ok(Some(Err(e))) => {
            eprintln!("WS receive error: {}", e);
            std::process::exit(2);
        }
        Ok(None) => {
            eprintln!("WS closed by server");
            std::process::exit(3);
        }
        Err(_) => {
            eprintln!("Timeout waiting for panel view");
            std::process::exit(4);
        }
    }

    if let Some(channel) = toggle_channel {
        let cmd = serde_json::json!({"type": "toggle", "value": {"channel": channel, "on": true}});
        if let Err(e) = write.send(Message::Text(cmd.to_string())).await {
            eprintln!("Failed to send toggle: {}", e);
            std::process::exit(2);
        }
        println!("Sent toggle for channel {}", channel);
    }
    let _ = write.close().await;
}
