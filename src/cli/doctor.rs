//! Diagnostics for the external programs, keys directory and session environment.

use crate::cli::CliContext;
use crate::util::env::{non_empty, ReadEnv};
use crate::util::fs::mode_of;
use anyhow::{bail, Result};
use clap::Args;
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Also list every match on PATH for each program
    #[arg(long)]
    pub path: bool,
}

#[derive(Debug, Default)]
struct Tally {
    ok: u32,
    warn: u32,
    fail: u32,
}

impl Tally {
    fn pass(&mut self, msg: impl AsRef<str>) {
        println!("  [PASS] {}", msg.as_ref());
        self.ok += 1;
    }

    fn warn(&mut self, msg: impl AsRef<str>) {
        println!("  [WARN] {}", msg.as_ref());
        self.warn += 1;
    }

    fn fail(&mut self, msg: impl AsRef<str>) {
        println!("  [FAIL] {}", msg.as_ref());
        self.fail += 1;
    }
}

pub fn run(ctx: &CliContext, args: DoctorArgs, env: &impl ReadEnv) -> Result<()> {
    let mut tally = Tally::default();
    let search_path = non_empty(env, "PATH").unwrap_or_default();

    println!("Doctor: vault \"{}\", keys {}", ctx.session.subdomain, ctx.keys_path.display());
    match (&ctx.config_path, &ctx.config_load_warning) {
        (_, Some(w)) => tally.warn(format!("config ignored: {}", w)),
        (Some(path), None) if path.exists() => tally.pass(format!("config loaded: {}", path.display())),
        _ => println!("  [INFO] no config file, using defaults"),
    }

    let programs = [
        ("vault CLI", ctx.session.op_program.as_str()),
        ("ssh-add", ctx.tools.ssh_add.as_str()),
        ("ssh-keygen", ctx.tools.ssh_keygen.as_str()),
        ("askpass callback", ctx.tools.askpass.as_str()),
    ];
    for (role, program) in programs {
        let found = find_program(program, &search_path);
        match found.first() {
            Some(first) => tally.pass(format!("{} available: {}", role, first.display())),
            None => tally.fail(format!("{} not found: {}", role, program)),
        }
        if args.path && found.len() > 1 {
            println!("  [INFO] {} matches on PATH:", program);
            for p in &found {
                println!("    - {}", p.display());
            }
        }
    }

    let keys = &ctx.keys_path;
    if keys.is_dir() {
        match mode_of(keys) {
            Some(mode) if mode & 0o077 != 0 => tally.warn(format!(
                "keys directory mode {:04o} is group/world accessible: {}",
                mode,
                keys.display()
            )),
            Some(mode) => tally.pass(format!("keys directory mode ok: {:04o}", mode)),
            None => tally.pass(format!("keys directory exists: {}", keys.display())),
        }
    } else {
        tally.warn(format!(
            "keys directory missing: {} (created by `opssh download`)",
            keys.display()
        ));
    }

    let token_var = ctx.session.token_var();
    if non_empty(env, &token_var).is_some() {
        tally.pass(format!("{} is set; the existing session will be reused", token_var));
    } else {
        println!("  [INFO] {} not set; the next command will sign in", token_var);
    }

    println!();
    println!(
        "Doctor summary: {} pass, {} warn, {} fail",
        tally.ok, tally.warn, tally.fail
    );
    if tally.fail > 0 {
        bail!("doctor found {} failure(s)", tally.fail);
    }
    Ok(())
}

/// Executable matches for `program`: the path itself when it has a separator, else `PATH` lookups.
fn find_program(program: &str, search_path: &str) -> Vec<PathBuf> {
    if program.contains('/') {
        let path = PathBuf::from(program);
        return if is_executable_file(&path) { vec![path] } else { Vec::new() };
    }
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for dir in env::split_paths(search_path) {
        let candidate = dir.join(program);
        if is_executable_file(&candidate) && seen.insert(candidate.clone()) {
            out.push(candidate);
        }
    }
    out
}

fn is_executable_file(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(meta) = fs::metadata(path) {
            return (meta.permissions().mode() & 0o111) != 0;
        }
        false
    }
    #[cfg(not(unix))]
    {
        true
    }
}
