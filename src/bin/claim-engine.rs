//! Claim engine CLI driver.
//!
//! Mirrors `original_source/run.py`'s `RunContext`/`main`: loads a
//! deployment layout and provider profiles into a store, then runs a claim
//! configuration against it and prints the resulting claim(s).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use claim_engine::catalog::Catalog;
use claim_engine::config::Config;
use claim_engine::error::Result;
use claim_engine::loader::{ClaimConfig, DeploymentConfig, ProviderProfile};
use claim_engine::request::ClaimRequest;
use claim_engine::store::{ClaimStore, InMemoryStore};

#[derive(Parser)]
#[command(name = "claim-engine")]
#[command(about = "Constraint-matching claim engine for a resource-placement service", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose (debug-level) logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a deployment config and claim config against a fresh in-memory
    /// store and run the resulting claim requests.
    Reset {
        /// Path to the deployment configuration YAML file
        #[arg(long)]
        deployment_config: PathBuf,

        /// Paths to provider profile YAML files referenced by the
        /// deployment config
        #[arg(long = "provider-profile")]
        provider_profiles: Vec<PathBuf>,

        /// Path to the claim configuration YAML file
        #[arg(long)]
        claim_config: PathBuf,
    },

    /// Print an example TOML configuration file to stdout's path.
    CreateExampleConfig {
        /// Output path for the example configuration
        #[arg(short, long, default_value = "claim-engine.toml")]
        output: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();
}

async fn reset_command(
    config_path: Option<PathBuf>,
    deployment_config: PathBuf,
    provider_profiles: Vec<PathBuf>,
    claim_config: PathBuf,
) -> Result<()> {
    let profiles: HashMap<String, ProviderProfile> = provider_profiles
        .iter()
        .map(|path| ProviderProfile::load(path).map(|p| (p.name.clone(), p)))
        .collect::<Result<_>>()?;

    let deployment = DeploymentConfig::load(&deployment_config, &profiles)?;
    let claims = ClaimConfig::load(&claim_config)?;

    let store: Arc<dyn ClaimStore> = match config_path {
        Some(path) => {
            let config = Config::from_file_with_env(&path)
                .map_err(|e| claim_engine::error::ClaimError::Config(e.to_string()))?;
            config
                .validate()
                .map_err(|e| claim_engine::error::ClaimError::Config(e.to_string()))?;
            match config.mode {
                claim_engine::config::OperationalMode::Postgres => {
                    use claim_engine::store::PostgresStore;
                    Arc::new(PostgresStore::connect(&config.database.connection_url()).await?)
                        as Arc<dyn ClaimStore>
                }
                claim_engine::config::OperationalMode::InMemory => {
                    let store = Arc::new(InMemoryStore::new());
                    seed_store(&store, &deployment, &profiles).await;
                    store as Arc<dyn ClaimStore>
                }
            }
        }
        None => {
            let store = Arc::new(InMemoryStore::new());
            seed_store(&store, &deployment, &profiles).await;
            store as Arc<dyn ClaimStore>
        }
    };
    let catalog = Catalog::new(store.clone());

    let request = ClaimRequest {
        consumer_uuid: Uuid::now_v7(),
        owner_project: Uuid::now_v7(),
        owner_user: Uuid::now_v7(),
        acquire_time: 0,
        release_time: 3600,
        groups: claims.groups,
    };

    match claim_engine::executor::process_and_execute(&store, &catalog, &request).await? {
        Some(claim) => {
            tracing::info!(consumer_id = %claim.consumer_id, "claim satisfied");
            println!("claim satisfied for consumer {}", claim.consumer_id);
        }
        None => {
            tracing::info!("claim request is infeasible");
            println!("claim request is infeasible");
        }
    }

    Ok(())
}

async fn seed_store(
    store: &Arc<InMemoryStore>,
    deployment: &DeploymentConfig,
    profiles: &HashMap<String, ProviderProfile>,
) {
    use claim_engine::model::{Provider, ProviderId};

    for (index, planned) in deployment.providers.iter().enumerate() {
        let profile = &profiles[&planned.profile_name];
        let provider_id = ProviderId((index + 1) as i64);
        let provider = Provider {
            id: provider_id,
            uuid: Uuid::now_v7(),
            generation: 1,
            partition: Some("part0".to_string()),
            groups: Vec::new(),
        };
        store.put_provider(provider).await;

        for code in &profile.capabilities {
            let capability_id = store.ensure_capability(code).await;
            store.grant_capability(provider_id, capability_id).await;
        }

        for (resource_code, spec) in &profile.inventory {
            let resource_type_id = store.ensure_resource_type(resource_code).await;
            store
                .put_inventory(
                    provider_id,
                    resource_type_id,
                    claim_engine::model::Inventory {
                        total: spec.total,
                        reserved: spec.reserved,
                        min_unit: spec.min_unit,
                        max_unit: spec.max_unit,
                        step_size: spec.step_size,
                        allocation_ratio: spec.allocation_ratio,
                    },
                )
                .await;
        }
    }
}

async fn create_example_config_command(output: PathBuf) -> Result<()> {
    Config::create_example(&output).map_err(|e| claim_engine::error::ClaimError::Config(e.to_string()))?;
    println!("wrote example configuration to {}", output.display());
    Ok(())
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Reset {
            deployment_config,
            provider_profiles,
            claim_config,
        } => {
            reset_command(cli.config, deployment_config, provider_profiles, claim_config).await?;
        }
        Commands::CreateExampleConfig { output } => {
            create_example_config_command(output).await?;
        }
    }

    Ok(())
}
