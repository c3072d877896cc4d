use clap::{Parser, Subcommand};
use reqwest::Method;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "dispatch-cli")]
#[command(about = "Inspect and exercise a running service-dispatch gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List circuit breaker states
    Circuits,
    /// Send a request through the gateway
    Call {
        /// HTTP method (GET, POST, ...)
        method: String,
        /// Request path, e.g. /items/5?verbose=true
        path: String,
        /// JSON body
        #[arg(short, long)]
        data: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Circuits => {
            let res = client.get(format!("{base}/admin/circuits")).send().await?;
            print_response(res).await?;
        }
        Commands::Call { method, path, data } => {
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())?;
            let mut request = client.request(method, format!("{base}{path}"));
            if let Some(data) = data {
                let body: Value = serde_json::from_str(&data)?;
                request = request.json(&body);
            }
            print_response(request.send().await?).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    let rendered = match serde_json::from_str::<Value>(&text) {
        Ok(json) => serde_json::to_string_pretty(&json)?,
        Err(_) => text,
    };

    if status.is_success() {
        println!("{rendered}");
    } else {
        eprintln!("Error: gateway returned status {status}");
        eprintln!("{rendered}");
    }
    Ok(())
}
