//! Drives a blueprint through `StageChanges` then `Deploy` (and optionally
//! `Destroy`) against the in-memory collaborators, printing every event as
//! it arrives - the local, no-backend analogue of exercising the full
//! engine phase sequence end to end.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use blueprint_config::EngineConfig;
use blueprint_core::blueprint::BlueprintSpec;
use blueprint_core::child_resolver::ChildBlueprintResolver;
use blueprint_core::mapping::MappingNode;
use blueprint_core::provider::ProviderRegistry;
use blueprint_core::state_container::StateContainer;
use blueprint_core::substitution::SubstitutionResolver;
use blueprint_core::ElementId;
use blueprint_engine::{DeployRequest, Loader, StageChangesRequest};
use blueprint_stage::StagingEvent;

use crate::memory::{EchoProvider, FileChildResolver, InMemoryStateContainer, PassthroughResolver};

/// Parses `key=value` pairs from `--var` flags into a variable map.
pub fn parse_vars(raw: &[String]) -> Result<BTreeMap<String, MappingNode>> {
    let mut vars = BTreeMap::new();
    for entry in raw {
        let (key, value) = entry
            .split_once('=')
            .with_context(|| format!("'--var {entry}' is not of the form key=value"))?;
        vars.insert(key.to_string(), MappingNode::String(value.to_string()));
    }
    Ok(vars)
}

fn load_loader(config_path: Option<&str>) -> Result<Loader> {
    let config = match config_path {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading config file: {path}"))?;
            blueprint_config::parse_engine_config(&text).with_context(|| format!("parsing config file: {path}"))?
        }
        None => EngineConfig::default(),
    };

    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(EchoProvider));

    let resolver: Arc<dyn SubstitutionResolver> = Arc::new(PassthroughResolver);
    let child_resolver: Arc<dyn ChildBlueprintResolver> = Arc::new(FileChildResolver);
    let state_container: Arc<dyn StateContainer> = Arc::new(InMemoryStateContainer::new());

    Ok(Loader::new(Arc::new(registry), resolver, child_resolver, state_container).with_config(config))
}

#[allow(clippy::too_many_arguments)]
pub async fn run(
    blueprint_path: &str,
    instance_name: Option<String>,
    vars: Vec<String>,
    config_path: Option<String>,
    destroy_after: bool,
) -> Result<()> {
    let content =
        std::fs::read_to_string(blueprint_path).with_context(|| format!("reading blueprint file: {blueprint_path}"))?;
    let blueprint: BlueprintSpec =
        serde_json::from_str(&content).with_context(|| format!("parsing blueprint file: {blueprint_path}"))?;

    let loader = load_loader(config_path.as_deref())?;
    let container = loader.load(blueprint);

    let variables = parse_vars(&vars)?;

    println!("--- staging ---");
    let (mut staging_rx, staging_handle) = container.stage_changes(StageChangesRequest {
        instance_id: None,
        variables,
        destroy: false,
    });
    while let Some(event) = staging_rx.recv().await {
        match event {
            StagingEvent::ResourceStaged { name, change } => {
                println!("  resource '{name}' staged{}", if change.is_some() { "" } else { " (unchanged)" });
            }
            StagingEvent::LinkStaged { name, change } => {
                println!("  link '{name}' staged{}", if change.is_some() { "" } else { " (unchanged)" });
            }
            StagingEvent::ChildStaged { name, .. } => {
                println!("  child '{name}' staged");
            }
            StagingEvent::Complete(_) => {
                println!("  staging complete");
            }
        }
    }
    let changes = staging_handle.await.context("staging task panicked")??;

    println!("--- deploying ---");
    let name = instance_name.unwrap_or_else(|| "cli-instance".to_string());
    let (mut deploy_rx, deploy_handle) = container.deploy(DeployRequest {
        instance_id: None,
        instance_name: Some(name),
        changes,
        rollback: false,
    });

    let mut instance_id = None;
    while let Some(event) = deploy_rx.recv().await {
        instance_id = print_engine_event(event).or(instance_id);
    }
    deploy_handle.await.context("deploy task panicked")??;

    let Some(instance_id) = instance_id else {
        bail!("deploy finished without reporting an instance ID");
    };

    if destroy_after {
        println!("--- destroying ---");
        let (mut destroy_rx, destroy_handle) =
            container.destroy(blueprint_engine::DestroyRequest::whole_instance(instance_id));
        while let Some(event) = destroy_rx.recv().await {
            print_engine_event(event);
        }
        destroy_handle.await.context("destroy task panicked")??;
    }

    Ok(())
}

fn print_engine_event(event: blueprint_core::events::EngineEvent) -> Option<ElementId> {
    use blueprint_core::events::EngineEvent;
    match event {
        EngineEvent::ResourceUpdate(ev) => {
            println!("  resource '{}' -> {:?}", ev.resource_name, ev.precise_status);
            if let Some(reason) = ev.failure_reason {
                println!("    reason: {reason}");
            }
            Some(ev.instance_id)
        }
        EngineEvent::LinkUpdate(ev) => {
            println!("  link '{}' -> {:?}", ev.link_name, ev.precise_status);
            Some(ev.instance_id)
        }
        EngineEvent::ChildUpdate(ev) => {
            println!("  child '{}' -> {:?}", ev.child_name, ev.status);
            Some(ev.instance_id)
        }
        EngineEvent::DeploymentUpdate(ev) => {
            println!("  instance {} -> {:?}", ev.instance_id, ev.status);
            Some(ev.instance_id)
        }
        EngineEvent::Finish(ev) => {
            println!(
                "  finished: {:?} ({} failed element(s))",
                ev.status,
                ev.failed_elements.len()
            );
            for reason in &ev.failure_reasons {
                println!("    - {reason}");
            }
            Some(ev.instance_id)
        }
        EngineEvent::Err(ev) => {
            println!("  error: {} ({:?})", ev.message, ev.reason);
            Some(ev.instance_id)
        }
    }
}
