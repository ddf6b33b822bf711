//!
//! facegate command-line client and enrollment manager
//! ---------------------------------------------------
//! Local subcommands (enroll/identities/remove) operate directly on the
//! enrollment store folder; a running server picks the changes up on the
//! next authentication. Remote subcommands (auth/exec/run) talk to a
//! facegate server over HTTP.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use base64::Engine;

use facegate::server::INTRUDER_SENTINEL;
use facegate::store::SharedStore;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8080";
const DEFAULT_DB_FOLDER: &str = "facegate-data";

fn usage() -> ! {
    println!(
        "facegate CLI\n\nUSAGE:\n  facegate_cli <subcommand> [args] [options]\n\nSUBCOMMANDS:\n  enroll <name> <uid> <image-file>   Enroll an identity with one sample (local store)\n  identities                         List enrolled identities (local store)\n  remove <name>                      Remove an identity and its samples (local store)\n  auth <image-file>                  Authenticate against a server, print the session token\n  exec <token> <command> [args...]   Execute a command through a server session\n  run <image-file> <command> [args...]  Authenticate, then execute in one step\n\nOPTIONS:\n  --db-folder PATH   Enrollment store folder (default {DEFAULT_DB_FOLDER})\n  --server URL       Server base URL (default {DEFAULT_SERVER})\n"
    );
    std::process::exit(2);
}

fn split_args(args: &[String]) -> (Vec<String>, HashMap<String, String>) {
    let mut positional = Vec::new();
    let mut options = HashMap::new();
    let mut i = 0;
    while i < args.len() {
        if let Some(name) = args[i].strip_prefix("--") {
            if i + 1 < args.len() {
                options.insert(name.to_string(), args[i + 1].clone());
                i += 2;
            } else {
                options.insert(name.to_string(), String::new());
                i += 1;
            }
        } else {
            positional.push(args[i].clone());
            i += 1;
        }
    }
    (positional, options)
}

fn encode_image(path: &str) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("reading image file '{}'", path))?;
    if bytes.is_empty() {
        bail!("image file '{}' is empty", path);
    }
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

fn open_store(options: &HashMap<String, String>) -> Result<SharedStore> {
    let root = options
        .get("db-folder")
        .cloned()
        .unwrap_or_else(|| DEFAULT_DB_FOLDER.to_string());
    SharedStore::open(Path::new(&root))
        .with_context(|| format!("enrollment store unavailable at '{}'", root))
}

fn server_base(options: &HashMap<String, String>) -> String {
    options
        .get("server")
        .cloned()
        .unwrap_or_else(|| DEFAULT_SERVER.to_string())
        .trim_end_matches('/')
        .to_string()
}

async fn remote_authenticate(server: &str, image_path: &str) -> Result<String> {
    let payload = encode_image(image_path)?;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{server}/authenticate"))
        .json(&serde_json::json!({"image_data": payload}))
        .send()
        .await
        .with_context(|| format!("connecting to {server}"))?;
    let status = resp.status();
    let v: serde_json::Value = resp.json().await.unwrap_or(serde_json::json!({"status":"error"}));
    let token = v.get("token").and_then(|t| t.as_str()).unwrap_or("").to_string();
    if status.is_success() && v.get("status").and_then(|s| s.as_str()) == Some("ok") {
        return Ok(token);
    }
    if token == INTRUDER_SENTINEL {
        bail!("rejected: {INTRUDER_SENTINEL}");
    }
    Err(anyhow!("authentication failed: {}", v))
}

async fn remote_execute(server: &str, token: &str, command: &str, arguments: &str) -> Result<()> {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{server}/execute"))
        .json(&serde_json::json!({
            "session_id": token,
            "command": command,
            "arguments": arguments,
        }))
        .send()
        .await
        .with_context(|| format!("connecting to {server}"))?;
    let status = resp.status();
    let v: serde_json::Value = resp.json().await.unwrap_or(serde_json::json!({"status":"error"}));
    if !status.is_success() {
        return Err(anyhow!("remote error: {}", v));
    }
    if let Some(out) = v.get("stdout").and_then(|s| s.as_str()) {
        print!("{out}");
    }
    if let Some(err) = v.get("stderr").and_then(|s| s.as_str()) {
        if !err.is_empty() {
            eprint!("{err}");
        }
    }
    if let Some(msg) = v.get("error").and_then(|e| e.as_str()) {
        eprintln!("{msg}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (positional, options) = split_args(&args);
    let Some(subcommand) = positional.first() else { usage() };

    match subcommand.as_str() {
        "enroll" => {
            if positional.len() != 4 {
                usage();
            }
            let name = &positional[1];
            let uid: i64 = positional[2].parse().context("uid must be an integer")?;
            let sample = encode_image(&positional[3])?;
            let store = open_store(&options)?;
            let guard = store.0.lock();
            let identity = guard.enroll(name, uid)?;
            guard.add_template(&identity.id, &sample)?;
            println!("enrolled '{}' (uid {}) id {}", identity.name, identity.uid, identity.id);
        }
        "identities" => {
            let store = open_store(&options)?;
            let guard = store.0.lock();
            let identities = guard.list_identities()?;
            if identities.is_empty() {
                println!("no identities enrolled");
                return Ok(());
            }
            let templates = guard.list_all_templates()?;
            for identity in identities {
                let count = templates.iter().filter(|t| t.identity_id == identity.id).count();
                println!("{}\tuid {}\t{} sample(s)\t{}", identity.name, identity.uid, count, identity.id);
            }
        }
        "remove" => {
            if positional.len() != 2 {
                usage();
            }
            let store = open_store(&options)?;
            let guard = store.0.lock();
            let Some(identity) = guard.find_identity_by_name(&positional[1])? else {
                bail!("identity '{}' is not enrolled", positional[1]);
            };
            guard.delete_identity(&identity.id)?;
            println!("removed '{}' and its samples", identity.name);
        }
        "auth" => {
            if positional.len() != 2 {
                usage();
            }
            let token = remote_authenticate(&server_base(&options), &positional[1]).await?;
            println!("{token}");
        }
        "exec" => {
            if positional.len() < 3 {
                usage();
            }
            let arguments = positional[3..].join(" ");
            remote_execute(&server_base(&options), &positional[1], &positional[2], &arguments).await?;
        }
        "run" => {
            if positional.len() < 3 {
                usage();
            }
            let server = server_base(&options);
            let token = remote_authenticate(&server, &positional[1]).await?;
            let arguments = positional[3..].join(" ");
            remote_execute(&server, &token, &positional[2], &arguments).await?;
        }
        _ => usage(),
    }
    Ok(())
}
