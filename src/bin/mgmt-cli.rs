use std::net::IpAddr;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use mgmt_endpoint::protocol::{ProtocolConnectionConfig, DEFAULT_CONNECT_TIMEOUT_MS};

#[derive(Parser)]
#[command(name = "mgmt-cli")]
#[command(about = "Command-line client for the HTTP management endpoint", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:9990")]
    url: String,

    /// Bearer token for the management API.
    #[arg(short, long)]
    token: Option<String>,

    /// Local address outgoing connections are bound to.
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Connect timeout in milliseconds.
    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_MS)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a resource, e.g. `read subsystem/logging`
    Read {
        #[arg(default_value = "")]
        path: String,
    },
    /// Execute an operation against a resource address
    Exec {
        /// Operation name (read-resource, read-attribute, write-attribute)
        operation: String,
        #[arg(short, long, default_value = "")]
        address: String,
        #[arg(short, long)]
        name: Option<String>,
        /// Attribute value as JSON
        #[arg(short, long)]
        value: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = ProtocolConnectionConfig::create(&cli.url)?
        .with_connect_timeout(Duration::from_millis(cli.timeout_ms));
    if let Some(bind) = cli.bind {
        config = config.with_client_bind_address(bind);
    }
    if let Some(token) = cli.token {
        config = config.with_bearer_token(token);
    }
    let client = config.build_client()?;

    match cli.command {
        Commands::Read { path } => {
            let res = client.get(config.management_url(&path)?).send().await?;
            print_response(res).await?;
        }
        Commands::Exec {
            operation,
            address,
            name,
            value,
        } => {
            let value: Option<Value> = value.map(|v| serde_json::from_str(&v)).transpose()?;
            let address: Vec<&str> = address.split('/').filter(|s| !s.is_empty()).collect();
            let body = json!({
                "operation": operation,
                "address": address,
                "name": name,
                "value": value,
            });
            let res = client
                .post(config.management_url("")?)
                .json(&body)
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if let Some(state) = res.headers().get("x-process-state") {
        eprintln!("Process state: {}", state.to_str().unwrap_or("?"));
    }
    if !status.is_success() {
        eprintln!("Error: management API returned status {}", status);
    }

    let text = res.text().await?;
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
