use clap::Parser;
use swapquoter::cli::{Cli, Commands};
use swapquoter::core::SwapError;

#[tokio::main]
async fn main() -> Result<(), SwapError> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    dotenv::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Quote(args) => {
            swapquoter::cli::commands::quote::execute(args).await?;
        }
    }

    Ok(())
}
