//! End to end: agent add and key download through the askpass callback, with
//! `op`, `ssh-add` and `ssh-keygen` played by an in-memory runner.

use anyhow::{anyhow, Result};
use opssh::core::agent::{AgentBridge, AgentTools, Outcome};
use opssh::core::askpass::PassphraseCallback;
use opssh::core::catalog::VaultCatalog;
use opssh::core::resolver::KeyResolver;
use opssh::core::session::{SessionConfig, SessionManager};
use opssh::util::console::{Console, Verbosity};
use opssh::util::process::{CommandRunner, CommandSpec, ProcessOutput, StdinMode};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use tempfile::TempDir;
use zeroize::Zeroizing;

const TOKEN: &str = "e2e-token";

/// Vault plus agent. `ssh-add` and `ssh-keygen` obtain passphrases by running the callback.
struct World {
    items: Vec<Value>,
    documents: HashMap<String, Vec<u8>>,
    agent: RefCell<Vec<(String, String)>>,
    calls: RefCell<Vec<CommandSpec>>,
}

impl World {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            documents: HashMap::new(),
            agent: RefCell::new(Vec::new()),
            calls: RefCell::new(Vec::new()),
        }
    }

    fn key(mut self, uuid: &str, name: &str, passphrase: &str) -> Self {
        self.items.push(json!({
            "uuid": uuid,
            "overview": {"title": name, "tags": ["SSH_KEY"]},
            "details": {"sections": [{"name": "", "fields": [
                {"t": "Passphrase", "k": "concealed", "v": passphrase},
                {"t": "KeyName", "k": "string", "v": name}
            ]}]}
        }));
        self
    }

    fn key_file(mut self, uuid: &str, name: &str, filename: &str, bytes: &[u8]) -> Self {
        self.items.push(json!({
            "uuid": uuid,
            "overview": {"title": filename, "tags": ["SSH_KEY_FILE"]},
            "details": {
                "documentAttributes": {"fileName": filename},
                "sections": [{"name": "", "fields": [{"t": "KeyName", "k": "string", "v": name}]}]
            }
        }));
        self.documents.insert(uuid.to_string(), bytes.to_vec());
        self
    }

    fn calls_to(&self, program: &str) -> Vec<CommandSpec> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.program == program)
            .cloned()
            .collect()
    }

    /// What a real askpass-driven program would read from the callback.
    fn ask(&self, spec: &CommandSpec) -> Result<String> {
        let env: HashMap<String, String> = spec.env.iter().cloned().collect();
        let mut out = Vec::new();
        PassphraseCallback::from_env(&env)?.run(self, &env, &mut out)?;
        Ok(String::from_utf8(out)?)
    }

    fn op(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
        let signed_in = matches!(&spec.stdin, StdinMode::Bytes(b) if b.as_slice() == TOKEN.as_bytes());
        if !signed_in {
            return Ok(output(1, Vec::new()));
        }
        let args: Vec<&str> = spec.args.iter().map(String::as_str).collect();
        match args.as_slice() {
            ["list", "items"] => {
                let list: Vec<Value> = self
                    .items
                    .iter()
                    .map(|i| json!({"uuid": i["uuid"], "overview": i["overview"]}))
                    .collect();
                Ok(output(0, serde_json::to_vec(&list)?))
            }
            ["get", "item", uuid] => self
                .items
                .iter()
                .find(|i| i["uuid"] == *uuid)
                .map(|i| output(0, i.to_string().into_bytes()))
                .ok_or_else(|| anyhow!("no item {}", uuid)),
            ["get", "document", uuid] => self
                .documents
                .get(*uuid)
                .map(|d| output(0, d.clone()))
                .ok_or_else(|| anyhow!("no document {}", uuid)),
            other => Err(anyhow!("unexpected op {:?}", other)),
        }
    }
}

impl CommandRunner for World {
    fn execute(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
        self.calls.borrow_mut().push(spec.clone());
        match spec.program.as_str() {
            "op" => self.op(spec),
            "ssh-add" => {
                let passphrase = self.ask(spec)?;
                let path = spec.args.last().cloned().unwrap_or_default();
                self.agent.borrow_mut().push((path, passphrase));
                Ok(output(0, Vec::new()))
            }
            "ssh-keygen" => {
                let passphrase = self.ask(spec)?;
                Ok(output(0, format!("ssh-ed25519 AAAA{} e2e\n", passphrase).into_bytes()))
            }
            other => Err(anyhow!("unexpected program {}", other)),
        }
    }
}

fn output(code: i32, stdout: Vec<u8>) -> ProcessOutput {
    ProcessOutput {
        stdout: Zeroizing::new(stdout),
        stderr: Vec::new(),
        code: Some(code),
    }
}

fn bridge<'a>(world: &'a World, keys: &TempDir) -> AgentBridge<VaultCatalog<&'a World>, &'a World> {
    let mut config = SessionConfig::new("my");
    config.verbosity = Verbosity::Quiet;
    config.interactive = false;
    let session = SessionManager::new(config, world).with_token(TOKEN.as_bytes().to_vec());
    let console = Console::new(Verbosity::Quiet);
    let resolver = KeyResolver::new(VaultCatalog::load(session).unwrap(), console);
    AgentBridge::new(
        resolver,
        world,
        AgentTools::default(),
        keys.path().to_path_buf(),
        console,
    )
}

#[test]
fn add_key_serves_passphrase_through_callback() {
    let world = World::new().key("k1", "work", "s3cret");
    let keys = TempDir::new().unwrap();

    let report = bridge(&world, &keys).add_keys_to_agent(None, false).unwrap();
    assert!(report.is_success());

    let adds = world.calls_to("ssh-add");
    assert_eq!(adds.len(), 1);
    assert_eq!(adds[0].env_value("SSH_KEY_ID"), Some("work"));

    let agent = world.agent.borrow();
    assert_eq!(agent.len(), 1);
    assert_eq!(agent[0].0, keys.path().join("work").display().to_string());
    assert_eq!(agent[0].1, "s3cret");
}

#[test]
fn download_writes_key_and_public_half() {
    let world = World::new()
        .key("k1", "work", "s3cret")
        .key_file("f1", "work", "id_work", b"PRIVATE KEY BYTES");
    let keys = TempDir::new().unwrap();

    let report = bridge(&world, &keys)
        .materialize_key_files(None, false)
        .unwrap();
    assert!(report.is_success());

    assert_eq!(fs::read(keys.path().join("id_work")).unwrap(), b"PRIVATE KEY BYTES");
    assert_eq!(
        fs::read_to_string(keys.path().join("id_work.pub")).unwrap(),
        "ssh-ed25519 AAAAs3cret e2e\n"
    );

    // second run without overwrite leaves both files alone
    let report = bridge(&world, &keys)
        .materialize_key_files(None, false)
        .unwrap();
    let private = keys.path().join("id_work").display().to_string();
    assert_eq!(report.outcome_for("work", &private), Some(&Outcome::Exists));
    assert_eq!(world.calls_to("ssh-keygen").len(), 1);
}

#[test]
fn callback_without_session_fails_cleanly() {
    let world = World::new().key("k1", "work", "s3cret");
    let env: HashMap<String, String> = [
        ("SSH_KEY_ID", "work"),
        ("OP_SESSION_SUBDOMAIN", "my"),
        ("OP_SESSION_my", "stale-token"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let mut out = Vec::new();
    let result = PassphraseCallback::from_env(&env)
        .unwrap()
        .run(&world, &env, &mut out);
    assert!(result.is_err());
    assert!(out.is_empty());
    assert!(world.calls_to("op").iter().all(|c| c.args[0] != "signin"));
}
