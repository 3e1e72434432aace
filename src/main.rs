use anyhow::{bail, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use rallypoint::identity::IdentityDirectory;
use rallypoint::model::{FieldUpdates, Item, NewItem, User};
use rallypoint::provider::{GroupOperation, GroupOperationClient, InMemoryGroupProvider, RecordingNotifier};
use rallypoint::store::{Kind, Precondition, RecordKey, RecordStore};
use rallypoint::{
    init_telemetry, load_env_file, membership_metrics, AttendanceCoordinator, CachingDirectory, GroupLifecycleManager,
    HttpGroupClient, HttpTokenVerifier, InMemoryRecordStore, RallypointConfig, StoreIdentityDirectory, TokenVerifier,
};

#[derive(Parser)]
#[command(name = "rallypoint")]
#[command(about = "Meetup membership coordination with push-notification groups")]
#[command(long_about = "Rallypoint keeps shared meetup records and their push-notification device groups \
                       in step. The CLI inspects configuration, drives the group provider directly and \
                       runs an in-memory simulation of the membership flows.")]
struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or write configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Send a raw operation to the push-notification group provider
    Group {
        #[command(subcommand)]
        action: GroupAction,
    },
    /// Check a device registration token against the verification service
    VerifyToken {
        #[arg(long, help = "Registration token to verify")]
        token: String,
    },
    /// Run the item and group scenarios against in-memory collaborators
    Simulate,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration with secrets masked
    Show,
    /// Write the default configuration as TOML
    Init {
        #[arg(long, default_value = "rallypoint.toml")]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum GroupAction {
    /// Create a device group owned by one address
    Create {
        #[arg(long, help = "Stable group key name")]
        name: String,
        #[arg(long, help = "Messaging address of the owner")]
        address: String,
    },
    /// Add addresses to an existing device group
    Add {
        #[arg(long)]
        name: String,
        #[arg(long, help = "Provider-assigned group key")]
        key: String,
        #[arg(long = "address", required = true)]
        addresses: Vec<String>,
    },
    /// Remove addresses from an existing device group
    Remove {
        #[arg(long)]
        name: String,
        #[arg(long, help = "Provider-assigned group key")]
        key: String,
        #[arg(long = "address", required = true)]
        addresses: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    load_env_file()?;
    let config = RallypointConfig::load_with(cli.config.as_deref())?;

    match cli.command {
        Commands::Config { action } => config_command(&config, action),
        Commands::Group { action } => {
            init_telemetry(&config.observability)?;
            tokio::runtime::Runtime::new()?.block_on(async { group_command(&config, action).await })
        }
        Commands::VerifyToken { token } => {
            init_telemetry(&config.observability)?;
            tokio::runtime::Runtime::new()?.block_on(async { verify_token_command(&config, &token).await })
        }
        Commands::Simulate => {
            init_telemetry(&config.observability)?;
            tokio::runtime::Runtime::new()?.block_on(async { simulate_command(&config).await })
        }
    }
}

fn config_command(config: &RallypointConfig, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            print!("{}", toml::to_string_pretty(&config.redacted())?);
        }
        ConfigAction::Init { path, force } => {
            if path.exists() && !force {
                bail!("{} already exists, pass --force to overwrite", path.display());
            }
            RallypointConfig::default().save_to_file(&path)?;
            println!("✅ Wrote default configuration to {}", path.display());
        }
    }
    Ok(())
}

async fn group_command(config: &RallypointConfig, action: GroupAction) -> Result<()> {
    let client = HttpGroupClient::new(&config.provider)?;
    let operation = match action {
        GroupAction::Create { name, address } => GroupOperation::create(name, address),
        GroupAction::Add { name, key, addresses } => GroupOperation::add(name, key, addresses),
        GroupAction::Remove { name, key, addresses } => GroupOperation::remove(name, key, addresses),
    };

    let key = client.send(&operation).await?;
    println!("✅ {} on {} applied", operation.operation, operation.key_name);
    println!("   notification_key: {key}");
    Ok(())
}

async fn verify_token_command(config: &RallypointConfig, token: &str) -> Result<()> {
    let verifier = HttpTokenVerifier::new(&config.identity, &config.provider)?;
    if verifier.verify(token).await? {
        println!("✅ Token is authentic for {}", config.identity.app_namespace);
        Ok(())
    } else {
        bail!("token was not issued for {}", config.identity.app_namespace)
    }
}

async fn seed_user(store: &dyn RecordStore, instance_id: &str) -> Result<String> {
    let user = User {
        instance_id: instance_id.to_string(),
        registration_token: format!("{instance_id}:device"),
        last_update_time: Utc::now(),
    };
    let id = store
        .put(Kind::User, RecordKey::Incomplete, serde_json::to_value(&user)?, Precondition::None)
        .await?;
    Ok(id)
}

fn describe(item: &Item) -> String {
    let members: Vec<String> = item
        .members
        .iter()
        .map(|m| format!("{{{}, {}}}", m.user_key, m.attendant))
        .collect();
    format!("Attendant={}/{} Members=[{}]", item.attendant, item.people, members.join(", "))
}

async fn simulate_command(config: &RallypointConfig) -> Result<()> {
    let store = Arc::new(InMemoryRecordStore::new());
    let provider = Arc::new(InMemoryGroupProvider::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let directory: Arc<dyn IdentityDirectory> = Arc::new(CachingDirectory::new(
        Arc::new(StoreIdentityDirectory::new(store.clone())),
        &config.identity,
    ));

    let u1 = seed_user(&*store, "inst-u1").await?;
    let u2 = seed_user(&*store, "inst-u2").await?;
    println!("👥 Registered U1={u1} U2={u2}");

    let coordinator = AttendanceCoordinator::new(
        store.clone(),
        directory.clone(),
        provider.clone(),
        notifier.clone(),
        &config.coordinator,
    );
    let unchanged = FieldUpdates::default();

    println!("\n📍 ITEM SCENARIO");
    let created = coordinator
        .create_item(
            "inst-u1",
            NewItem {
                image: "meetup.jpg".to_string(),
                people: 4,
                attendant: 1,
                latitude: 35.68,
                longitude: 139.76,
            },
        )
        .await?;
    println!("   create(U1)        -> {} ({})", describe(&created.item), created.status());

    let steps = [
        ("join(U2, +2)", "inst-u2", 2),
        ("attend(U2, -2)", "inst-u2", -2),
        ("attend(U1, -1)", "inst-u1", -1),
    ];
    for (label, identity, delta) in steps {
        let report = coordinator
            .apply_attendance(&created.id, identity, delta, &unchanged)
            .await?;
        let state = match &report.item {
            Some(item) => describe(item),
            None => "item deleted".to_string(),
        };
        println!("   {label:<17} -> {:?}: {state}", report.outcome);
    }
    println!("   item still stored: {}", coordinator.get_item(&created.id).await.is_ok());

    println!("\n👪 GROUP SCENARIO");
    let groups = GroupLifecycleManager::new(store.clone(), directory.clone(), provider.clone(), &config.coordinator);
    println!("   join(U1, teamA)   -> {:?}", groups.join("inst-u1", "teamA").await?);
    println!("   join(U2, teamA)   -> {:?}", groups.join("inst-u2", "teamA").await?);
    let group = groups.get_group("teamA").await?;
    println!("   teamA key={} members={:?}", group.notification_key, group.members);
    println!("   leave(U1, teamA)  -> {:?}", groups.leave("inst-u1", "teamA").await?);
    println!("   group still stored: {}", groups.get_group("teamA").await.is_ok());

    println!("\n📊 PROVIDER");
    println!("   operations sent: {}", provider.operations().await.len());
    println!("   live groups: {}", provider.group_count().await);
    println!("   broadcasts: {}", notifier.sent().await.len());

    membership_metrics().log_stats();
    Ok(())
}
