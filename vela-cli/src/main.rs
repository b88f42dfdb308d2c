mod apply;
mod config;
mod plan;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::debug;

use vela_core::provider::Provider;
use vela_core::resource::{Resource, ResourceId, State};
use vela_provider_azurerm::resources::resource_handlers;
use vela_provider_azurerm::{AzurermProvider, ConfigOverrides, ProviderConfig};
use vela_state::{BackendConfig, LocalBackend, LockInfo, StateBackend, StateFile, create_backend};

use crate::plan::Plan;

#[derive(Parser)]
#[command(name = "vela")]
#[command(about = "Manage Azure resources declared in a JSON configuration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to the state file
    #[arg(long, global = true, default_value = LocalBackend::DEFAULT_STATE_FILE)]
    state: PathBuf,

    /// Azure subscription (overrides ARM_SUBSCRIPTION_ID)
    #[arg(long, global = true)]
    subscription_id: Option<String>,

    /// Azure tenant (overrides ARM_TENANT_ID)
    #[arg(long, global = true)]
    tenant_id: Option<String>,

    /// Resource Manager endpoint (overrides ARM_ENDPOINT)
    #[arg(long, global = true)]
    endpoint: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration file
    Validate {
        /// Path to the configuration file
        #[arg(default_value = "vela.json")]
        file: PathBuf,
    },
    /// Show execution plan without applying changes
    Plan {
        /// Path to the configuration file
        #[arg(default_value = "vela.json")]
        file: PathBuf,
    },
    /// Apply changes to reach the desired state
    Apply {
        /// Path to the configuration file
        #[arg(default_value = "vela.json")]
        file: PathBuf,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Update the state with what the remote API reports
    Refresh,
    /// Bring an existing remote object under management
    Import {
        /// Path to the configuration file
        file: PathBuf,
        /// Name of the configured resource to import into
        name: String,
        /// Remote identifier (ARM resource ID)
        identifier: String,
    },
    /// Remove a stale state lock left behind by an interrupted run
    ForceUnlock {
        /// ID of the lock to remove
        lock_id: String,
    },
    /// Destroy all resources defined in the configuration file
    Destroy {
        /// Path to the configuration file
        #[arg(default_value = "vela.json")]
        file: PathBuf,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();

    let result = match &cli.command {
        Commands::Validate { file } => run_validate(file),
        Commands::Plan { file } => run_plan(&cli, file).await,
        Commands::Apply { file, auto_approve } => run_apply(&cli, file, *auto_approve).await,
        Commands::Refresh => run_refresh(&cli).await,
        Commands::Import {
            file,
            name,
            identifier,
        } => run_import(&cli, file, name, identifier).await,
        Commands::ForceUnlock { lock_id } => run_force_unlock(&cli, lock_id).await,
        Commands::Destroy { file, auto_approve } => run_destroy(&cli, file, *auto_approve).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn get_provider(cli: &Cli) -> Result<AzurermProvider, String> {
    let overrides = ConfigOverrides {
        subscription_id: cli.subscription_id.clone(),
        tenant_id: cli.tenant_id.clone(),
        endpoint: cli.endpoint.clone(),
        ..ConfigOverrides::default()
    };
    let config = ProviderConfig::from_env(overrides).map_err(|e| e.to_string())?;
    debug!(
        "using endpoint {} for subscription {}",
        config.endpoint, config.subscription_id
    );
    AzurermProvider::new(&config).map_err(|e| format!("Failed to create client: {}", e))
}

fn open_backend(cli: &Cli) -> Result<Box<dyn StateBackend>, String> {
    create_backend(&BackendConfig::local(cli.state.to_string_lossy())).map_err(|e| e.to_string())
}

/// Decode every resource, reporting all violations at once
fn normalize_resources(
    resources: &[Resource],
    normalize: impl Fn(&Resource) -> Result<Resource, String>,
) -> Result<Vec<Resource>, String> {
    let mut normalized = Vec::with_capacity(resources.len());
    let mut errors = Vec::new();
    for resource in resources {
        match normalize(resource) {
            Ok(r) => normalized.push(r),
            Err(e) => errors.push(e),
        }
    }
    if errors.is_empty() {
        Ok(normalized)
    } else {
        Err(errors.join("\n"))
    }
}

fn run_validate(file: &Path) -> Result<(), String> {
    let resources = config::load(file)?;
    let handlers = resource_handlers();

    normalize_resources(&resources, |resource| {
        let handler = handlers
            .iter()
            .find(|h| h.name() == resource.id.resource_type)
            .ok_or_else(|| format!("{}: unknown resource type", resource.id))?;
        handler.normalize(resource).map_err(|e| e.to_string())
    })?;

    println!(
        "{}",
        format!("✓ {} resources validated successfully.", resources.len()).green()
    );
    Ok(())
}

fn load_desired(provider: &AzurermProvider, file: &Path) -> Result<Vec<Resource>, String> {
    let resources = config::load(file)?;
    normalize_resources(&resources, |r| provider.normalize(r).map_err(|e| e.to_string()))
}

async fn read_state(backend: &dyn StateBackend) -> Result<StateFile, String> {
    Ok(backend
        .read_state()
        .await
        .map_err(|e| format!("Failed to read state: {}", e))?
        .unwrap_or_default())
}

async fn write_state(backend: &dyn StateBackend, state: &mut StateFile) -> Result<(), String> {
    state.increment_serial();
    backend
        .write_state(state)
        .await
        .map_err(|e| format!("Failed to write state: {}", e))
}

async fn release(backend: &dyn StateBackend, lock: &LockInfo) {
    if let Err(e) = backend.release_lock(lock).await {
        eprintln!("{} {}", "Warning:".yellow().bold(), e);
    }
}

fn confirm(prompt: &str) -> Result<bool, String> {
    print!("{} ", prompt);
    io::stdout().flush().map_err(|e| e.to_string())?;

    let mut input = String::new();
    io::stdin()
        .lock()
        .read_line(&mut input)
        .map_err(|e| format!("Failed to read input: {}", e))?;
    Ok(input.trim() == "yes")
}

async fn run_plan(cli: &Cli, file: &Path) -> Result<(), String> {
    let provider = get_provider(cli)?;
    let desired = load_desired(&provider, file)?;
    let backend = open_backend(cli)?;

    let mut state = read_state(backend.as_ref()).await?;
    apply::refresh(&provider, &mut state).await?;

    let plan = Plan::build(&desired, &state, |t| provider.schema(t))?;
    print!("{}", plan::render(&plan));
    Ok(())
}

async fn run_apply(cli: &Cli, file: &Path, auto_approve: bool) -> Result<(), String> {
    let provider = get_provider(cli)?;
    let desired = load_desired(&provider, file)?;
    let backend = open_backend(cli)?;

    let lock = backend
        .acquire_lock("apply")
        .await
        .map_err(|e| e.to_string())?;
    let result = apply_locked(&provider, backend.as_ref(), &desired, auto_approve).await;
    release(backend.as_ref(), &lock).await;
    result
}

async fn apply_locked(
    provider: &AzurermProvider,
    backend: &dyn StateBackend,
    desired: &[Resource],
    auto_approve: bool,
) -> Result<(), String> {
    let mut state = read_state(backend).await?;
    apply::refresh(provider, &mut state).await?;

    let plan = Plan::build(desired, &state, |t| provider.schema(t))?;
    print!("{}", plan::render(&plan));
    if plan.is_empty() {
        return write_state(backend, &mut state).await;
    }

    println!();
    if !auto_approve && !confirm("Do you want to apply these changes? Only 'yes' will be accepted:")? {
        println!("{}", "Apply cancelled.".yellow());
        return Ok(());
    }

    println!("{}", "Applying changes...".cyan().bold());
    let outcome = apply::apply_plan(provider, &plan, &mut state).await;
    write_state(backend, &mut state).await?;

    println!();
    if outcome.failed == 0 {
        println!(
            "{}",
            format!("Apply complete! {} changes applied.", outcome.succeeded)
                .green()
                .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Apply failed. {} succeeded, {} failed.",
            outcome.succeeded, outcome.failed
        ))
    }
}

async fn run_refresh(cli: &Cli) -> Result<(), String> {
    let provider = get_provider(cli)?;
    let backend = open_backend(cli)?;

    let lock = backend
        .acquire_lock("refresh")
        .await
        .map_err(|e| e.to_string())?;
    let result = async {
        let mut state = read_state(backend.as_ref()).await?;
        let dropped = apply::refresh(&provider, &mut state).await?;
        for id in &dropped {
            println!("  {} {} {}", "-".red(), id, "(no longer exists)".dimmed());
        }
        write_state(backend.as_ref(), &mut state).await?;
        println!(
            "{}",
            format!("Refreshed {} resources.", state.resources.len()).green()
        );
        Ok::<(), String>(())
    }
    .await;
    release(backend.as_ref(), &lock).await;
    result
}

async fn run_import(cli: &Cli, file: &Path, name: &str, identifier: &str) -> Result<(), String> {
    let provider = get_provider(cli)?;
    let desired = load_desired(&provider, file)?;
    let id = find_configured(&desired, name)?;
    let backend = open_backend(cli)?;

    let lock = backend
        .acquire_lock("import")
        .await
        .map_err(|e| e.to_string())?;
    let result = async {
        let mut state = read_state(backend.as_ref()).await?;
        apply::import(&provider, &id, identifier, &mut state).await?;
        write_state(backend.as_ref(), &mut state).await?;
        println!("{}", format!("Imported {} as {}.", identifier, id).green());
        Ok::<(), String>(())
    }
    .await;
    release(backend.as_ref(), &lock).await;
    result
}

async fn run_force_unlock(cli: &Cli, lock_id: &str) -> Result<(), String> {
    open_backend(cli)?
        .force_unlock(lock_id)
        .await
        .map_err(|e| e.to_string())?;
    println!("{}", format!("Lock {} removed.", lock_id).green());
    Ok(())
}

fn find_configured(resources: &[Resource], name: &str) -> Result<ResourceId, String> {
    let mut matches = resources.iter().filter(|r| r.id.name == name);
    match (matches.next(), matches.next()) {
        (Some(resource), None) => Ok(resource.id.clone()),
        (None, _) => Err(format!("No resource named {} in the configuration", name)),
        (Some(_), Some(_)) => Err(format!(
            "Several resources are named {}; names must be unique to import",
            name
        )),
    }
}

async fn run_destroy(cli: &Cli, file: &Path, auto_approve: bool) -> Result<(), String> {
    let provider = get_provider(cli)?;
    let desired = load_desired(&provider, file)?;
    let backend = open_backend(cli)?;

    let lock = backend
        .acquire_lock("destroy")
        .await
        .map_err(|e| e.to_string())?;
    let result = destroy_locked(&provider, backend.as_ref(), &desired, auto_approve).await;
    release(backend.as_ref(), &lock).await;
    result
}

async fn destroy_locked(
    provider: &AzurermProvider,
    backend: &dyn StateBackend,
    desired: &[Resource],
    auto_approve: bool,
) -> Result<(), String> {
    let mut state = read_state(backend).await?;
    apply::refresh(provider, &mut state).await?;

    // Reverse configuration order
    let targets: Vec<State> = desired
        .iter()
        .rev()
        .map(|r| state.current(&r.id))
        .filter(|s| s.exists)
        .collect();

    if targets.is_empty() {
        println!("{}", "No resources to destroy.".yellow());
        return write_state(backend, &mut state).await;
    }

    println!("{}", "The following resources will be destroyed:".red().bold());
    for target in &targets {
        println!("  {} {}", "-".red().bold(), target.id.to_string().cyan().bold());
    }
    println!();

    if !auto_approve && !confirm("Do you really want to destroy all resources? Only 'yes' will be accepted:")? {
        println!("{}", "Destroy cancelled.".yellow());
        return Ok(());
    }

    println!("{}", "Destroying resources...".red().bold());
    let outcome = apply::destroy_all(provider, &targets, &mut state).await;
    write_state(backend, &mut state).await?;

    println!();
    if outcome.failed == 0 {
        println!(
            "{}",
            format!("Destroy complete! {} resources destroyed.", outcome.succeeded)
                .green()
                .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Destroy failed. {} succeeded, {} failed.",
            outcome.succeeded, outcome.failed
        ))
    }
}

#[cfg(test)]
mod tests {
    use vela_core::resource::Value;

    use super::*;

    #[test]
    fn find_configured_by_name() {
        let resources = vec![
            Resource::new("azurerm_impact_connectors", "main"),
            Resource::new("azurerm_data_factory_linked_custom_service", "blob"),
        ];
        assert_eq!(
            find_configured(&resources, "blob").unwrap(),
            ResourceId::new("azurerm_data_factory_linked_custom_service", "blob")
        );
        assert!(find_configured(&resources, "nope").is_err());

        let duplicated = vec![
            Resource::new("azurerm_impact_connectors", "x"),
            Resource::new("azurerm_data_factory_linked_custom_service", "x"),
        ];
        assert!(find_configured(&duplicated, "x").unwrap_err().contains("unique"));
    }

    #[test]
    fn normalize_collects_every_error() {
        let handlers = resource_handlers();
        let normalize = |resource: &Resource| {
            handlers
                .iter()
                .find(|h| h.name() == resource.id.resource_type)
                .ok_or_else(|| format!("{}: unknown resource type", resource.id))?
                .normalize(resource)
                .map_err(|e| e.to_string())
        };

        let valid = Resource::new("azurerm_impact_connectors", "ok")
            .with_attribute("name", Value::String("conn-1".to_string()))
            .with_attribute("connector_type", Value::String("AzureMonitor".to_string()));
        assert_eq!(normalize_resources(&[valid.clone()], normalize).unwrap().len(), 1);

        let err = normalize_resources(
            &[
                valid,
                Resource::new("azurerm_impact_connectors", "bad"),
                Resource::new("azurerm_unknown", "x"),
            ],
            normalize,
        )
        .unwrap_err();
        assert_eq!(err.lines().count(), 2);
        assert!(err.contains("azurerm_unknown.x: unknown resource type"));
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::try_parse_from([
            "vela",
            "plan",
            "infra.json",
            "--state",
            "custom.json",
            "--subscription-id",
            "sub",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.state, PathBuf::from("custom.json"));
        assert_eq!(cli.subscription_id.as_deref(), Some("sub"));
        assert!(matches!(cli.command, Commands::Plan { file } if file == PathBuf::from("infra.json")));
    }
}
