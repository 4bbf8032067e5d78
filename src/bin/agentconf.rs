use agentconf::entities::{AgentFields, RoleFields, RoleMapper};
use agentconf::store::{Mapper, Record};
use agentconf::{
    AgentInput, AgentStore, AgentsDocument, JsonFileAdapter, RoleInput, RoleStore, RolesDocument,
    StoreOptions, StorePolicy,
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "agentconf")]
#[command(about = "Manage AI-agent roles and agents stored as JSON settings")]
struct Cli {
    /// Settings directory holding roles.json and agents.json
    #[arg(long, default_value = ".")]
    dir: PathBuf,
    /// JSON file with store policy overrides
    #[arg(long)]
    policy: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Roles {
        #[command(subcommand)]
        action: RoleAction,
    },
    Agents {
        #[command(subcommand)]
        action: AgentAction,
    },
}

#[derive(Subcommand)]
enum RoleAction {
    List,
    Add {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        instructions: String,
    },
    Rename {
        id: String,
        name: String,
    },
    Remove {
        id: String,
    },
    /// Print the roles document, or write it to --out
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Replace all roles with the contents of a roles document
    Import {
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum AgentAction {
    List,
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        provider: String,
        #[arg(long)]
        model: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        role_id: Option<String>,
        #[arg(long)]
        temperature: Option<f64>,
        #[arg(long)]
        max_tokens: Option<i64>,
        #[arg(long)]
        disabled: bool,
    },
    Remove {
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let options = StoreOptions::default().policy(load_policy(cli.policy.as_deref())?);

    match cli.command {
        Command::Roles { action } => run_roles(&cli.dir, options, action).await,
        Command::Agents { action } => run_agents(&cli.dir, options, action).await,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}

fn load_policy(path: Option<&Path>) -> Result<StorePolicy> {
    let policy = match path {
        Some(path) => StorePolicy::from_file(path)
            .with_context(|| format!("Failed to load store policy '{}'", path.display()))?,
        None => StorePolicy::default(),
    };
    policy
        .with_env_overrides()
        .context("Invalid AGENTCONF_* environment override")
}

async fn open_roles(dir: &Path, options: StoreOptions) -> Result<RoleStore> {
    let store = RoleStore::roles(options);
    let adapter = Arc::new(JsonFileAdapter::<RolesDocument>::new(dir.join("roles.json")));
    store
        .initialize(adapter)
        .await
        .context("Failed to load roles")?;
    Ok(store)
}

async fn open_agents(dir: &Path, options: StoreOptions) -> Result<AgentStore> {
    let store = AgentStore::agents(options);
    let adapter = Arc::new(JsonFileAdapter::<AgentsDocument>::new(dir.join("agents.json")));
    store
        .initialize(adapter)
        .await
        .context("Failed to load agents")?;
    Ok(store)
}

async fn run_roles(dir: &Path, options: StoreOptions, action: RoleAction) -> Result<()> {
    let roles = open_roles(dir, options).await?;
    let outcome = apply_role_action(&roles, action).await;
    roles.destroy();
    outcome
}

async fn apply_role_action(roles: &RoleStore, action: RoleAction) -> Result<()> {
    match action {
        RoleAction::List => {
            for record in roles.items() {
                print_role(&record);
            }
            Ok(())
        }
        RoleAction::Add {
            name,
            description,
            instructions,
        } => {
            let input = RoleInput::new(name)
                .description(description)
                .instructions(instructions);
            let id = roles.create_item(input).context("Role rejected")?;
            roles
                .persist_changes()
                .await
                .context("Failed to save roles")?;
            println!("{id}");
            Ok(())
        }
        RoleAction::Rename { id, name } => {
            let current = roles
                .get_by_id(&id)
                .ok_or_else(|| anyhow!("No role with id '{id}'"))?;
            let mut input = RoleInput::from(&current.fields);
            input.name = name;
            roles.update_item(&id, input).context("Rename rejected")?;
            roles
                .persist_changes()
                .await
                .context("Failed to save roles")
        }
        RoleAction::Remove { id } => {
            roles.delete_item(&id).context("Remove rejected")?;
            roles
                .persist_changes()
                .await
                .context("Failed to save roles")
        }
        RoleAction::Export { out } => {
            let json = serde_json::to_string_pretty(&roles.export_collection())?;
            match out {
                Some(path) => std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write '{}'", path.display())),
                None => {
                    println!("{json}");
                    Ok(())
                }
            }
        }
        RoleAction::Import { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read '{}'", file.display()))?;
            let document: RolesDocument = serde_json::from_str(&raw)
                .with_context(|| format!("'{}' is not a roles document", file.display()))?;
            let records = RoleMapper.from_persisted(document);
            let count = records.len();
            roles
                .import_collection(records)
                .await
                .context("Import failed")?;
            println!("imported {count} role(s)");
            Ok(())
        }
    }
}

async fn run_agents(dir: &Path, options: StoreOptions, action: AgentAction) -> Result<()> {
    let agents = open_agents(dir, options).await?;
    let outcome = apply_agent_action(&agents, action).await;
    agents.destroy();
    outcome
}

async fn apply_agent_action(agents: &AgentStore, action: AgentAction) -> Result<()> {
    match action {
        AgentAction::List => {
            for record in agents.items() {
                print_agent(&record);
            }
            Ok(())
        }
        AgentAction::Add {
            name,
            provider,
            model,
            description,
            role_id,
            temperature,
            max_tokens,
            disabled,
        } => {
            let input = AgentInput {
                name,
                description,
                role_id,
                provider,
                model_id: model,
                temperature,
                max_tokens,
                enabled: Some(!disabled),
            };
            let id = agents.create_item(input).context("Agent rejected")?;
            agents
                .persist_changes()
                .await
                .context("Failed to save agents")?;
            println!("{id}");
            Ok(())
        }
        AgentAction::Remove { id } => {
            agents.delete_item(&id).context("Remove rejected")?;
            agents
                .persist_changes()
                .await
                .context("Failed to save agents")
        }
    }
}

fn print_role(record: &Record<RoleFields>) {
    println!("{}  {}", record.id, record.fields.name);
    if !record.fields.description.is_empty() {
        println!("    {}", record.fields.description);
    }
}

fn print_agent(record: &Record<AgentFields>) {
    let fields = &record.fields;
    let state = if fields.enabled { "enabled" } else { "disabled" };
    println!(
        "{}  {}  {}/{}  t={}  {}",
        record.id, fields.name, fields.model.provider, fields.model.model_id, fields.temperature, state
    );
}
