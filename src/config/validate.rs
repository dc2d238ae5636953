// src/config/validate.rs

use std::collections::HashSet;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::ConfigFile;
use crate::errors::ConfigError;

/// Run semantic validation against a loaded configuration.
///
/// This checks:
/// - there is at least one procedure
/// - procedure names are unique
/// - all `depends_on` entries refer to procedures declared *earlier* in the
///   list (which also rules out self-dependencies)
/// - the dependency graph has no cycles
pub fn validate_config(cfg: &ConfigFile) -> Result<(), ConfigError> {
    ensure_has_procedures(cfg)?;
    validate_unique_names(cfg)?;
    validate_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_procedures(cfg: &ConfigFile) -> Result<(), ConfigError> {
    if cfg.procedures.is_empty() {
        return Err(ConfigError::NoProcedures);
    }
    Ok(())
}

fn validate_unique_names(cfg: &ConfigFile) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for proc in cfg.procedures.iter() {
        if !seen.insert(proc.name.as_str()) {
            return Err(ConfigError::DuplicateProcedure(proc.name.clone()));
        }
    }
    Ok(())
}

fn validate_dependencies(cfg: &ConfigFile) -> Result<(), ConfigError> {
    let mut declared: HashSet<&str> = HashSet::new();
    for proc in cfg.procedures.iter() {
        for dep in proc.depends_on.iter() {
            if dep == &proc.name {
                return Err(ConfigError::SelfDependency(proc.name.clone()));
            }
            if declared.contains(dep.as_str()) {
                continue;
            }
            // Not declared yet: either unknown entirely, or declared later.
            if cfg.procedures.iter().any(|p| &p.name == dep) {
                return Err(ConfigError::ForwardDependency {
                    procedure: proc.name.clone(),
                    dependency: dep.clone(),
                });
            }
            return Err(ConfigError::UnknownDependency {
                procedure: proc.name.clone(),
                dependency: dep.clone(),
            });
        }
        declared.insert(proc.name.as_str());
    }
    Ok(())
}

fn validate_dag(cfg: &ConfigFile) -> Result<(), ConfigError> {
    // Edge direction: dependency -> dependent. Declaration-order checking
    // above already rules out cycles, but a toposort keeps the guarantee
    // independent of that rule.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for proc in cfg.procedures.iter() {
        graph.add_node(proc.name.as_str());
    }

    for proc in cfg.procedures.iter() {
        for dep in proc.depends_on.iter() {
            graph.add_edge(dep.as_str(), proc.name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(ConfigError::DependencyCycle(cycle.node_id().to_string())),
    }
}
