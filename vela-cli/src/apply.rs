//! Execution of plans and single-resource commands against a provider
//!
//! Every step records its outcome in the in-memory [`StateFile`]; the caller
//! persists it once the run is over, whether or not every step succeeded.

use colored::Colorize;
use log::info;
use vela_core::differ::Diff;
use vela_core::provider::{Provider, ProviderError};
use vela_core::resource::{Resource, ResourceId, State};
use vela_state::StateFile;

use crate::plan::Plan;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub succeeded: usize,
    pub failed: usize,
}

impl Outcome {
    fn record(&mut self, label: &str, id: &ResourceId, result: Result<(), ProviderError>) {
        match result {
            Ok(()) => {
                println!("  {} {} {}", "✓".green(), label, id);
                self.succeeded += 1;
            }
            Err(e) => {
                println!("  {} {} {} - {}", "✗".red(), label, id, e);
                if e.is_import_required() {
                    println!(
                        "    {}",
                        format!("Run `vela import <file> {} <identifier>` to manage it.", id.name)
                            .yellow()
                    );
                }
                self.failed += 1;
            }
        }
    }
}

fn tracked_identifier(state: &State) -> Result<String, ProviderError> {
    state
        .identifier
        .clone()
        .ok_or_else(|| ProviderError::InvalidIdentifier {
            input: state.id.to_string(),
            message: "state has no remote identifier".to_string(),
        })
}

async fn create(
    provider: &dyn Provider,
    resource: &Resource,
    state: &mut StateFile,
) -> Result<(), ProviderError> {
    let created = provider.create(resource).await?;
    state.record(&created, provider.name());
    Ok(())
}

async fn destroy(
    provider: &dyn Provider,
    tracked: &State,
    state: &mut StateFile,
) -> Result<(), ProviderError> {
    let identifier = tracked_identifier(tracked)?;
    provider.delete(&tracked.id, &identifier).await?;
    state.record(&State::not_found(tracked.id.clone()), provider.name());
    Ok(())
}

/// Execute a plan: removals of unconfigured resources first, then each diff
pub async fn apply_plan(provider: &dyn Provider, plan: &Plan, state: &mut StateFile) -> Outcome {
    let mut outcome = Outcome::default();

    for orphan in &plan.orphans {
        let result = destroy(provider, orphan, state).await;
        outcome.record("delete", &orphan.id, result);
    }

    for diff in &plan.diffs {
        match diff {
            Diff::Create(resource) => {
                let result = create(provider, resource, state).await;
                outcome.record("create", &resource.id, result);
            }
            Diff::Update { id, from, to, .. } => {
                let result = async {
                    let identifier = tracked_identifier(from)?;
                    let updated = provider.update(id, &identifier, from, to).await?;
                    state.record(&updated, provider.name());
                    Ok::<(), ProviderError>(())
                }
                .await;
                outcome.record("update", id, result);
            }
            Diff::Replace { from, to, .. } => {
                info!("replacing {}", to.id);
                let result = match destroy(provider, from, state).await {
                    Ok(()) => create(provider, to, state).await,
                    Err(e) => Err(e),
                };
                outcome.record("replace", &to.id, result);
            }
            Diff::NoChange(_) => {}
        }
    }

    outcome
}

/// Read every tracked resource and record what the remote API reports
///
/// Resources that no longer exist are dropped from the state.
pub async fn refresh(provider: &dyn Provider, state: &mut StateFile) -> Result<Vec<ResourceId>, String> {
    let tracked: Vec<State> = state.resources.iter().map(|r| r.to_state()).collect();
    let mut dropped = Vec::new();

    for entry in tracked {
        let identifier = tracked_identifier(&entry).map_err(|e| e.to_string())?;
        let current = provider
            .read(&entry.id, &identifier)
            .await
            .map_err(|e| format!("Failed to refresh {}: {}", entry.id, e))?;
        if !current.exists {
            dropped.push(entry.id.clone());
        }
        state.record(&current, provider.name());
    }

    Ok(dropped)
}

/// Adopt an existing remote object into state under the given resource
pub async fn import(
    provider: &dyn Provider,
    id: &ResourceId,
    identifier: &str,
    state: &mut StateFile,
) -> Result<State, String> {
    if state.find_resource(id).is_some() {
        return Err(format!("{} is already managed", id));
    }
    let imported = provider
        .import(id, identifier)
        .await
        .map_err(|e| e.to_string())?;
    state.record(&imported, provider.name());
    Ok(imported)
}

/// Delete the given tracked resources in order
pub async fn destroy_all(provider: &dyn Provider, targets: &[State], state: &mut StateFile) -> Outcome {
    let mut outcome = Outcome::default();
    for target in targets {
        let result = destroy(provider, target, state).await;
        outcome.record("delete", &target.id, result);
    }
    outcome
}
