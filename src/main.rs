use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = opssh::cli::Cli::parse();
    cli.run()
}
