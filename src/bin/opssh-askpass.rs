//! `SSH_ASKPASS` program: prints the passphrase for `$SSH_KEY_ID`.

use anyhow::Result;
use opssh::core::askpass::PassphraseCallback;
use opssh::util::console::Verbosity;
use opssh::util::env::SystemEnv;
use opssh::util::logging;
use opssh::util::process::VaultProcessRunner;
use std::io;

fn main() -> Result<()> {
    // stdout carries the passphrase; diagnostics stay on stderr
    logging::init(Verbosity::Quiet);

    let env = SystemEnv;
    let callback = PassphraseCallback::from_env(&env)?;
    let runner = VaultProcessRunner::new(callback.config().timeout);
    callback.run(runner, &env, &mut io::stdout().lock())
}
