use clap::Parser;
use log::info;
use server::game_manager::GameManager;
use server::network::Server;
use server::questions::{DirectorySource, QuestionPool};
use shared::DEFAULT_PORT;
use std::sync::Arc;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Directory holding the question files
    #[clap(short, long, default_value = "questions")]
    questions: String,
}

/// Parses the arguments, loads the question pool and serves until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let pool = Arc::new(QuestionPool::new(DirectorySource::new(&args.questions)));
    let manager = GameManager::new(pool);

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::bind(address, manager).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
