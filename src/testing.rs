//! In-process stand-in for `op`, `ssh-add`, and `ssh-keygen`.

use crate::util::process::{CommandRunner, CommandSpec, ProcessOutput, StdinMode};
use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use zeroize::Zeroizing;

#[derive(Default)]
pub struct FakeOp {
    items: Vec<Value>,
    documents: HashMap<String, Vec<u8>>,
    signin_failures: Cell<u32>,
    expiries: Cell<u32>,
    signins: Cell<u32>,
    agent_failures: BTreeSet<String>,
    keygen_fails: bool,
    delete_fails: bool,
    calls: RefCell<Vec<CommandSpec>>,
}

impl FakeOp {
    pub const TOKEN: &'static str = "fake-session-token";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(mut self, item: Value) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_document(mut self, uuid: &str, bytes: &[u8]) -> Self {
        self.documents.insert(uuid.to_string(), bytes.to_vec());
        self
    }

    /// The next `n` sign-ins exit non-zero.
    pub fn failing_signins(self, n: u32) -> Self {
        self.signin_failures.set(n);
        self
    }

    /// The next `n` vault commands fail as if the session had expired.
    pub fn expiring(self, n: u32) -> Self {
        self.expiries.set(n);
        self
    }

    pub fn failing_agent(mut self, key_id: &str) -> Self {
        self.agent_failures.insert(key_id.to_string());
        self
    }

    pub fn failing_keygen(mut self) -> Self {
        self.keygen_fails = true;
        self
    }

    /// `ssh-add -D` exits non-zero, as with no agent running.
    pub fn failing_delete(mut self) -> Self {
        self.delete_fails = true;
        self
    }

    pub fn signins(&self) -> u32 {
        self.signins.get()
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.borrow().clone()
    }

    pub fn calls_to(&self, program: &str) -> Vec<CommandSpec> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.program == program)
            .cloned()
            .collect()
    }

    pub fn key_item(uuid: &str, name: &str, passphrase: &str) -> Value {
        json!({
            "uuid": uuid,
            "overview": {"title": name, "tags": ["SSH_KEY"]},
            "details": {"sections": [
                {"name": "linked items", "title": "Related Items"},
                {"name": "", "title": "", "fields": [
                    {"t": "KeyName", "k": "string", "v": name},
                    {"t": "Passphrase", "k": "concealed", "v": passphrase}
                ]}
            ]}
        })
    }

    pub fn key_file_item(uuid: &str, name: &str, filename: &str) -> Value {
        json!({
            "uuid": uuid,
            "overview": {"title": filename, "tags": ["SSH_KEY_FILE"]},
            "details": {
                "documentAttributes": {"fileName": filename},
                "sections": [
                    {"name": "", "title": "", "fields": [
                        {"t": "KeyName", "k": "string", "v": name}
                    ]}
                ]
            }
        })
    }

    fn token_ok(spec: &CommandSpec) -> bool {
        matches!(&spec.stdin, StdinMode::Bytes(b) if b.as_slice() == Self::TOKEN.as_bytes())
    }

    fn op(&self, spec: &CommandSpec, args: &[&str]) -> Result<ProcessOutput> {
        if let ["signin", ..] = args {
            self.signins.set(self.signins.get() + 1);
            if self.signin_failures.get() > 0 {
                self.signin_failures.set(self.signin_failures.get() - 1);
                return Ok(failed("[ERROR] authentication failed"));
            }
            return Ok(ok(format!("  {}\n", Self::TOKEN).into_bytes()));
        }

        if self.expiries.get() > 0 {
            self.expiries.set(self.expiries.get() - 1);
            return Ok(failed("[ERROR] session expired, sign in to create a new session"));
        }
        if !Self::token_ok(spec) {
            return Ok(failed("[ERROR] You are not currently signed in"));
        }

        match args {
            ["list", "items"] => {
                let summaries: Vec<Value> = self
                    .items
                    .iter()
                    .map(|item| json!({"uuid": item["uuid"], "overview": item["overview"]}))
                    .collect();
                Ok(ok(serde_json::to_vec(&summaries)?))
            }
            ["get", "item", uuid] => self
                .items
                .iter()
                .find(|item| item["uuid"] == *uuid)
                .map(|item| ok(item.to_string().into_bytes()))
                .ok_or_else(|| anyhow!("fake op: no item {}", uuid)),
            ["get", "document", uuid] => self
                .documents
                .get(*uuid)
                .map(|doc| ok(doc.clone()))
                .ok_or_else(|| anyhow!("fake op: no document {}", uuid)),
            other => Err(anyhow!("fake op: unexpected arguments {:?}", other)),
        }
    }
}

impl CommandRunner for FakeOp {
    fn execute(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
        self.calls.borrow_mut().push(spec.clone());
        let args: Vec<&str> = spec.args.iter().map(String::as_str).collect();
        let key_id = spec.env_value("SSH_KEY_ID").unwrap_or_default().to_string();

        match (spec.program.as_str(), args.as_slice()) {
            ("op", args) => self.op(spec, args),
            ("ssh-add", ["-D"]) if self.delete_fails => {
                Ok(failed("Could not open a connection to your authentication agent."))
            }
            ("ssh-add", ["-D"]) => Ok(ok(Vec::new())),
            ("ssh-add", ["-q", _path]) if self.agent_failures.contains(&key_id) => {
                Ok(failed("Bad passphrase"))
            }
            ("ssh-add", ["-q", _path]) => Ok(ok(Vec::new())),
            ("ssh-keygen", ["-y", "-f", _path]) if self.keygen_fails => {
                Ok(failed("Load key: incorrect passphrase supplied"))
            }
            ("ssh-keygen", ["-y", "-f", _path]) => {
                Ok(ok(format!("ssh-ed25519 AAAAC3fake{} {}\n", key_id, key_id).into_bytes()))
            }
            (program, args) => Err(anyhow!("fake: unexpected command {} {:?}", program, args)),
        }
    }
}

fn ok(stdout: Vec<u8>) -> ProcessOutput {
    ProcessOutput {
        stdout: Zeroizing::new(stdout),
        stderr: Vec::new(),
        code: Some(0),
    }
}

fn failed(stderr: &str) -> ProcessOutput {
    ProcessOutput {
        stdout: Zeroizing::new(Vec::new()),
        stderr: stderr.as_bytes().to_vec(),
        code: Some(1),
    }
}
