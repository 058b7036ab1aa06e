//! Drive a running Neovim instance over TCP.
//!
//! Start the instance first:
//!
//! ```text
//! nvim --listen 127.0.0.1:6666
//! cargo run --example attach [host:port]
//! ```

use nvim_rpc_client::{Client, ClientConfig, Value};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:6666".to_string());
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or("expected an address of the form host:port")?;
    let config = ClientConfig {
        host: host.to_string(),
        port: port.parse()?,
    };

    let client = Client::builder()
        .notification_sink(|method: &str, _params: Vec<Value>| {
            println!("notification: {method}");
        })
        .connect(&config)
        .await?;

    client.command("echo 'driven over msgpack-RPC'").await?;
    client.set_current_line("hello from nvim-rpc-client").await?;
    println!("current line: {}", client.get_current_line().await?);
    println!("1 + 2 = {}", client.eval("1 + 2").await?);

    client.disconnect().await;
    Ok(())
}
