// Path: crates/aex-cli/src/commands/agent.rs
//! `aex agent`: provisions and inspects agent identities directly against
//! the store, bypassing the HTTP surface. Mirrors `ioi-cli::keys`'s
//! `Provision` pattern for one-shot secret issuance: the raw bearer
//! token is printed once and never persisted in plaintext.

use aex_store::{RedbStore, Store};
use aex_types::agent::{Agent, Capabilities, Scope};
use aex_types::{Clock, Micro, SystemClock};
use clap::{Parser, Subcommand};
use rand::RngCore;
use std::path::PathBuf;

#[derive(Parser, Debug)]
pub struct AgentArgs {
    #[clap(long, env = "AEX_DB_PATH", default_value = "aex.redb")]
    db_path: PathBuf,

    #[clap(subcommand)]
    command: AgentCommands,
}

#[derive(Subcommand, Debug)]
enum AgentCommands {
    /// Creates a new agent and prints its bearer token once.
    Create {
        #[clap(long)]
        agent_id: String,
        #[clap(long)]
        name: String,
        #[clap(long)]
        budget_micro: u64,
        #[clap(long, default_value_t = 60)]
        rpm_limit: u32,
        #[clap(long, default_value_t = 60_000)]
        tpm_limit: u32,
        /// Caller-facing model names this agent may route to. Empty means all.
        #[clap(long = "allow-model")]
        allowed_models: Vec<String>,
        #[clap(long)]
        streaming: bool,
        #[clap(long)]
        tools: bool,
        #[clap(long)]
        vision: bool,
        #[clap(long)]
        strict: bool,
        /// Grants the `x-aex-provider-key` passthrough header (§6).
        #[clap(long = "allow-passthrough")]
        allow_passthrough: bool,
    },

    /// Lists every agent known to the store.
    List,
}

fn random_bearer_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("aex_{}", hex::encode(bytes))
}

pub async fn run(args: AgentArgs) -> anyhow::Result<()> {
    let store = RedbStore::open(&args.db_path)?;

    match args.command {
        AgentCommands::Create { agent_id, name, budget_micro, rpm_limit, tpm_limit, allowed_models, streaming, tools, vision, strict, allow_passthrough } => {
            if store.get_agent(&agent_id).await?.is_some() {
                anyhow::bail!("agent '{agent_id}' already exists");
            }

            let token = random_bearer_token();
            let token_hash = aex_crypto::hex32(aex_crypto::sha256(&token));
            let now_ms = SystemClock.now_ms();

            let agent = Agent {
                agent_id: agent_id.clone(),
                name,
                token_hash,
                legacy_raw_token: None,
                token_expires_at: None,
                scope: Scope::Execution,
                budget_micro: Micro(budget_micro),
                spent_micro: Micro(0),
                reserved_micro: Micro(0),
                rpm_limit,
                tpm_limit,
                capabilities: Capabilities { allowed_models, streaming, tools, vision, strict, allow_passthrough },
                created_at: now_ms,
                last_activity_at: None,
            };
            agent.check_invariant()?;

            store.create_agent(agent).await?;

            println!("created agent '{agent_id}'");
            println!("bearer token (shown once, not recoverable): {token}");
        }
        AgentCommands::List => {
            let agents = store.list_agents().await?;
            for agent in agents {
                println!(
                    "{}\t{}\tbudget={}\tspent={}\treserved={}\trpm={}\ttpm={}",
                    agent.agent_id,
                    agent.name,
                    agent.budget_micro.0,
                    agent.spent_micro.0,
                    agent.reserved_micro.0,
                    agent.rpm_limit,
                    agent.tpm_limit,
                );
            }
        }
    }

    Ok(())
}
