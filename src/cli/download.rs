use crate::cli::{finish_batch, CliContext, KeySelection};
use crate::util::env::ReadEnv;
use crate::util::process::CommandRunner;
use anyhow::Result;
use clap::Args;

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Replace key files that already exist
    #[arg(short = 'o', long)]
    pub overwrite: bool,

    #[command(flatten)]
    pub keys: KeySelection,
}

pub fn run<R: CommandRunner + Clone>(
    ctx: &CliContext,
    args: DownloadArgs,
    runner: R,
    env: &impl ReadEnv,
) -> Result<()> {
    let selected = args.keys.selected();
    let mut bridge = ctx.bridge(runner, env)?;
    let report = bridge.materialize_key_files(selected.as_ref(), args.overwrite)?;
    finish_batch(&ctx.console, &report, "download")
}
