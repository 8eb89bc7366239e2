use crate::cli::{finish_batch, CliContext, KeySelection};
use crate::util::env::ReadEnv;
use crate::util::process::CommandRunner;
use anyhow::Result;
use clap::Args;

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Delete all identities from the agent first
    #[arg(short = 'D', long = "delete")]
    pub delete: bool,

    #[command(flatten)]
    pub keys: KeySelection,
}

pub fn run<R: CommandRunner + Clone>(
    ctx: &CliContext,
    args: AddArgs,
    runner: R,
    env: &impl ReadEnv,
) -> Result<()> {
    let selected = args.keys.selected();
    let mut bridge = ctx.bridge(runner, env)?;
    let report = bridge.add_keys_to_agent(selected.as_ref(), args.delete)?;
    finish_batch(&ctx.console, &report, "add")
}
