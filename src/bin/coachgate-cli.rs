use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use coachgate::config::{load_config, parse_config};
use coachgate::identity::{TokenAuthenticator, TokenGrant};

#[derive(Parser)]
#[command(name = "coachgate-cli")]
#[command(about = "Operator CLI for the coachgate admin gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mint an admin bearer token from the configured secret
    Token {
        #[arg(short, long, env = "COACHGATE_CONFIG")]
        config: Option<PathBuf>,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "admin")]
        role: String,
    },
    /// Check gateway status
    Status {
        #[arg(short, long, default_value = "http://localhost:8080")]
        url: String,
        #[arg(short, long, env = "COACHGATE_TOKEN")]
        token: String,
    },
    /// Show the identity behind a token
    Me {
        #[arg(short, long, default_value = "http://localhost:8080")]
        url: String,
        #[arg(short, long, env = "COACHGATE_TOKEN")]
        token: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Token {
            config,
            subject,
            email,
            role,
        } => {
            let config = match config {
                Some(path) => load_config(&path)?,
                None => parse_config("")?,
            };
            let ttl = Duration::from_secs(config.auth.token_ttl_secs);
            let grant = TokenGrant::admin(subject, email, ttl).with_role(role);
            let token = TokenAuthenticator::new(&config.auth).issue(&grant)?;
            println!("{token}");
        }
        Commands::Status { url, token } => get(&url, "/admin/status", &token).await?,
        Commands::Me { url, token } => get(&url, "/admin/me", &token).await?,
    }

    Ok(())
}

async fn get(base: &str, path: &str, token: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}"))?,
    );

    let res = reqwest::Client::new()
        .get(format!("{}{}", base.trim_end_matches('/'), path))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {status}");
        if let Ok(text) = res.text().await {
            eprintln!("Response: {text}");
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
