//! Gazette command-line client.
//!
//! Logs in, then creates, updates or lists newsletters, or follows the live
//! change stream.

mod client;
mod error;
mod formatter;
mod sse;
mod watch;

use clap::{Parser, Subcommand};
use client::GazetteClient;
use error::CliError;
use formatter::{format_newsletters, OutputFormat};

/// Gazette command-line client
#[derive(Parser, Debug)]
#[command(name = "gazette")]
#[command(version, about = "Gazette command-line client")]
pub struct Args {
    /// Server base URL
    #[arg(short = 'H', long, env = "GAZETTE_SERVER", default_value = "http://localhost:8000")]
    pub server: String,

    /// Username to log in as
    #[arg(short, long, default_value = "demo")]
    pub username: String,

    /// Password (accepted by the server without verification)
    #[arg(short, long, default_value = "demo")]
    pub password: String,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a newsletter
    Create { title: String, content: String },
    /// Replace the title and content of a newsletter
    Update {
        id: i64,
        title: String,
        content: String,
    },
    /// List newsletters, newest first
    List,
    /// Print change events as they happen
    Watch,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gazette_cli=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let result = tokio::select! {
        result = run(args) => result,
        _ = tokio::signal::ctrl_c() => Ok(()),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), CliError> {
    let client = GazetteClient::login(&args.server, &args.username, &args.password).await?;

    match args.command {
        Command::Create { title, content } => {
            let row = client.create(&title, &content).await?;
            println!("Newsletter created successfully:");
            println!("{}", format_newsletters(&[row], args.format));
        }
        Command::Update { id, title, content } => {
            let reply = client.update(id, &title, &content).await?;
            println!("Successfully updated newsletter {}", id);
            println!("{}", reply);
        }
        Command::List => {
            let rows = client.list().await?;
            println!("{}", format_newsletters(&rows, args.format));
        }
        Command::Watch => watch::run(&client, args.format).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_update() {
        let args = Args::parse_from(["gazette", "update", "3", "Title", "Body"]);
        assert_eq!(args.server, "http://localhost:8000");
        assert_eq!(args.username, "demo");
        match args.command {
            Command::Update { id, title, content } => {
                assert_eq!(id, 3);
                assert_eq!(title, "Title");
                assert_eq!(content, "Body");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_watch_with_server() {
        let args = Args::parse_from([
            "gazette",
            "--server",
            "http://127.0.0.1:9000",
            "--format",
            "json",
            "watch",
        ]);
        assert_eq!(args.server, "http://127.0.0.1:9000");
        assert_eq!(args.format, OutputFormat::Json);
        assert!(matches!(args.command, Command::Watch));
    }

    #[test]
    fn test_update_id_must_be_numeric() {
        assert!(Args::try_parse_from(["gazette", "update", "abc", "t", "c"]).is_err());
    }
}
