use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check one article for freshness and synthesize it when needed.
    Generate(GenerateArgs),
    /// Rebuild the complete audio file of a finished article.
    Assemble(AssembleArgs),
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Article id as it appears in the source wiki URL.
    #[arg(long)]
    pub id: String,

    /// Base URL of the source wiki (default: `ARTICLECAST_SOURCE_URL`).
    #[arg(long)]
    pub source_url: Option<String>,
}

#[derive(Debug, Args)]
pub struct AssembleArgs {
    /// Article id as it appears in the source wiki URL.
    #[arg(long)]
    pub id: String,
}
