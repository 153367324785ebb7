use anyhow::Result;
use clap::Parser;
use java_migration_cli::cli;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    match cli::run(args).await {
        // Explicit exit code: 0 on success, 1 when the engine reported failure
        Ok(code) => std::process::exit(code),
        Err(e) => Err(e),
    }
}
