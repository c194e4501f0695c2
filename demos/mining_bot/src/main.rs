//! Mining Bot Example
//!
//! A small mining game driven through the Switchboard runtime. Interactions
//! come from a script instead of a chat gateway; replies are printed.
//!
//! # Script Format
//!
//! One interaction per line, `#` starts a comment:
//!
//! ```text
//! <actor> <kind> <identifier> [json arguments]
//! sleep <seconds>
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package mining-bot
//! cargo run --package mining-bot -- --script demos/mining_bot/session.txt --user-cooldown 1
//! ```

use std::any::Any;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use clap::Parser;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use switchboard::core::{ReplyError, ReplyResult};
use switchboard::framework::MemoryStore;
use switchboard::prelude::*;
use tokio::sync::oneshot;
use tracing::{info, warn};

const DEFAULT_SCRIPT: &str = r#"
# A fresh miner digs, then hits the cooldown of that identifier
alice command mine
alice command mine
alice button mine_again
alice button mine_again
sleep 3
alice command mine
alice button mine_stats

# Unknown and retired identifiers
alice button ghost_panel
alice button mine_legacy

# Banking, including a failure the recovery pipeline reports
alice command bank {"amount": 4}
alice button bank_vault

# Requirements are checked before any cooldown is consumed
mallory command mine
"#;

#[derive(Parser, Debug)]
#[command(name = "mining-bot", about = "Scripted Switchboard demo")]
struct Args {
    /// Configuration file (TOML).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Script to run instead of the built-in session.
    #[arg(long)]
    script: Option<PathBuf>,

    /// User-wide cooldown in seconds.
    #[arg(long)]
    user_cooldown: Option<u64>,
}

// ============================================================================
// Console Interaction
// ============================================================================

/// Prints replies and signals the script driver once the dispatcher drops it.
struct ConsoleInteraction {
    kind: String,
    actor_id: String,
    identifier: String,
    arguments: Value,
    state: Mutex<ReplyState>,
    done: Option<oneshot::Sender<()>>,
}

impl ConsoleInteraction {
    fn print(&self, channel: &str, reply: &Reply) {
        let mut line = format!("  [{channel} -> {}] {}", self.actor_id, reply.content);
        if reply.ephemeral {
            line.push_str(" (only you)");
        }
        if let Some(retry) = &reply.retry {
            line.push_str(&format!(" [{}: {}]", retry.label, retry.identifier));
        }
        println!("{line}");
    }

    fn transition(&self, from: ReplyState, to: ReplyState) -> ReplyResult<()> {
        let mut state = self.state.lock();
        if *state != from {
            return Err(ReplyError::AlreadyAcknowledged);
        }
        *state = to;
        Ok(())
    }
}

impl Drop for ConsoleInteraction {
    fn drop(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
    }
}

#[async_trait]
impl Interaction for ConsoleInteraction {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn actor_id(&self) -> &str {
        &self.actor_id
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn arguments(&self) -> Value {
        self.arguments.clone()
    }

    fn reply_state(&self) -> ReplyState {
        *self.state.lock()
    }

    async fn reply(&self, reply: Reply) -> ReplyResult<()> {
        self.transition(ReplyState::Pending, ReplyState::Responded)?;
        self.print("reply", &reply);
        Ok(())
    }

    async fn defer(&self) -> ReplyResult<()> {
        self.transition(ReplyState::Pending, ReplyState::Deferred)?;
        println!("  [deferred]");
        Ok(())
    }

    async fn edit_reply(&self, reply: Reply) -> ReplyResult<()> {
        self.transition(ReplyState::Deferred, ReplyState::Responded)?;
        self.print("edit", &reply);
        Ok(())
    }

    async fn follow_up(&self, reply: Reply) -> ReplyResult<()> {
        self.print("follow-up", &reply);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Handlers
// ============================================================================

const ORE_PER_DIG: u64 = 3;

fn coins(record: &Option<Value>) -> u64 {
    record
        .as_ref()
        .and_then(|r| r["coins"].as_u64())
        .unwrap_or(0)
}

async fn dig(ctx: Arc<InteractionContext>) -> Result<Reply> {
    let store = ctx.require_store()?;
    let balance = coins(&store.get(ctx.actor_id()).await?) + ORE_PER_DIG;
    store
        .update(ctx.actor_id(), json!({ "coins": balance }))
        .await?;
    Ok(Reply::text(format!(
        "You dug up {ORE_PER_DIG} ore. Balance: {balance} coins. [mine_again] [mine_stats]"
    )))
}

async fn stats(ctx: Arc<InteractionContext>) -> Result<Reply> {
    let record = ctx.require_store()?.get(ctx.actor_id()).await?;
    Ok(Reply::text(format!("You hold {} coins.", coins(&record))).ephemeral())
}

async fn legacy_button(ctx: Arc<InteractionContext>) -> Reply {
    Reply::text(format!(
        "The '{}' panel was retired; use /mine instead.",
        ctx.action().unwrap_or("unknown")
    ))
    .ephemeral()
}

#[derive(Deserialize)]
struct Deposit {
    amount: u64,
}

async fn bank(ctx: Arc<InteractionContext>) -> Result<Reply> {
    let Deposit { amount } = ctx.args()?;
    let store = ctx.require_store()?;
    let balance = coins(&store.get(ctx.actor_id()).await?);
    if amount > balance {
        bail!("Invalid amount: you only hold {balance} coins");
    }
    Ok(Reply::text(format!("Deposited {amount} coins. [bank_vault]")))
}

async fn vault(_ctx: Arc<InteractionContext>) -> Result<Reply> {
    bail!("Database connection failed while opening the vault")
}

fn mine_module() -> CommandModule {
    CommandModule::new("mine", dig)
        .description("Dig for ore")
        .cooldown_secs(3)
        .button("again", dig)
        .button("stats", stats)
        .fallback(InteractionKind::Button, legacy_button)
        .requirement("not_banned", |ctx| {
            if ctx.actor_id() == "mallory" {
                Err("You are banned from the mines.".to_string())
            } else {
                Ok(())
            }
        })
}

fn bank_module() -> CommandModule {
    CommandModule::new("bank", bank)
        .description("Deposit coins")
        .option(CommandOption::new("amount", "Coins to deposit", OptionType::Integer).required())
        .button("vault", vault)
}

// ============================================================================
// Script Driver
// ============================================================================

async fn run_script(ingress: Ingress, script: &str) -> Result<()> {
    for (number, line) in script.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.splitn(4, ' ');
        let (Some(first), Some(second)) = (parts.next(), parts.next()) else {
            warn!(line = number + 1, "Skipping malformed line");
            continue;
        };
        if first == "sleep" {
            let secs: u64 = second.parse().context("sleep takes whole seconds")?;
            println!("... {secs}s later");
            tokio::time::sleep(Duration::from_secs(secs)).await;
            continue;
        }
        let Some(identifier) = parts.next() else {
            warn!(line = number + 1, "Skipping line without identifier");
            continue;
        };
        let arguments = match parts.next() {
            Some(raw) => serde_json::from_str(raw)
                .with_context(|| format!("invalid arguments on line {}", number + 1))?,
            None => Value::Null,
        };

        println!("> {first} {second} {identifier}");
        let (done, finished) = oneshot::channel();
        ingress
            .send(Arc::new(ConsoleInteraction {
                kind: second.to_string(),
                actor_id: first.to_string(),
                identifier: identifier.to_string(),
                arguments,
                state: Mutex::new(ReplyState::Pending),
                done: Some(done),
            }))
            .await?;
        let _ = finished.await;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = SwitchboardRuntime::builder().store(Arc::new(MemoryStore::new()));
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    if let Some(secs) = args.user_cooldown {
        let mut config = SwitchboardConfig::default();
        config.dispatch.user_cooldown_secs = secs;
        builder = builder.merge(config);
    }
    let runtime = builder.build()?;

    let report = runtime
        .registry()
        .register_commands(vec![mine_module(), bank_module()]);
    info!(%report, "Commands registered");

    let script = match &args.script {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => DEFAULT_SCRIPT.to_string(),
    };

    let ingress = runtime.ingress();
    let (finished, stop) = oneshot::channel::<()>();
    let driver = tokio::spawn(async move {
        let result = run_script(ingress, &script).await;
        let _ = finished.send(());
        result
    });

    runtime
        .run_until(async {
            let _ = stop.await;
        })
        .await?;
    driver.await??;

    let dispatcher = runtime.dispatcher();
    println!("{}", dispatcher.stats());
    for record in dispatcher.recovery().recent_errors() {
        println!(
            "  {} [{}] {}: {}",
            record.category.as_str(),
            record.severity,
            record.context_tag,
            record.message
        );
    }
    Ok(())
}
