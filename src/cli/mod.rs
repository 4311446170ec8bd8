use clap::{Parser, Subcommand};

pub mod commands;
pub mod display;

#[derive(Parser)]
#[command(name = "swapquoter")]
#[command(about = "Cross-exchange swap quote aggregator", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch swap quotes from all eligible exchanges and pick the best
    Quote(QuoteArgs),
}

#[derive(Parser)]
pub struct QuoteArgs {
    /// Source coin (e.g. btc, usdc)
    pub coin_from: String,

    /// Amount to swap, in display units of the source coin
    pub amount: f64,

    /// Destination coin (e.g. eth)
    pub coin_to: String,

    /// Source chain (defaults to the coin itself)
    #[arg(long)]
    pub chain_from: Option<String>,

    /// Destination chain (defaults to the coin itself)
    #[arg(long)]
    pub chain_to: Option<String>,

    /// Token contract address when the source is an ERC-20 token
    #[arg(long)]
    pub token_address: Option<String>,

    /// ISO country code used for provider availability
    #[arg(short, long)]
    pub country: Option<String>,

    /// Show all offers, not just the best one
    #[arg(short, long)]
    pub all: bool,
}
