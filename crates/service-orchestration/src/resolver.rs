//! Dependency resolution over the pending set
//!
//! Resolution is a fixed-point loop: every pass starts each pending service
//! whose dependencies are all active, and passes repeat while the previous
//! one started something. Services that remain pending are not an error;
//! they are reported as blocked and retried on the next registration.

use crate::{Error, lifecycle::LifecycleRunner};
use service_registry::{RegistrationGuard, ServiceDescriptor, ServiceRegistry};
use std::collections::HashMap;
use tracing::{debug, error, warn};

/// A pending service waiting on dependencies that are not active
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedService {
    /// Service name
    pub name: String,
    /// Declared dependencies absent from the active set
    pub missing: Vec<String>,
}

/// Outcome of one drain of the pending set
#[derive(Debug, Default)]
pub struct DrainReport {
    /// Services started, in start order
    pub started: Vec<String>,
    /// Services that failed to construct or start
    pub failed: Vec<(String, Error)>,
    /// Services left pending
    pub blocked: Vec<BlockedService>,
    /// A dependency cycle among the blocked services, if any
    pub cycle: Option<Vec<String>>,
    /// Number of passes run
    pub passes: usize,
}

impl DrainReport {
    /// Remove and return the start failure of `name`
    pub fn take_failure(&mut self, name: &str) -> Option<Error> {
        let index = self.failed.iter().position(|(failed, _)| failed == name)?;
        Some(self.failed.remove(index).1)
    }

    /// Whether `name` is still waiting on dependencies
    pub fn is_blocked(&self, name: &str) -> bool {
        self.blocked.iter().any(|blocked| blocked.name == name)
    }
}

/// Decides which pending services can start and starts them
#[derive(Debug, Default, Clone, Copy)]
pub struct DependencyResolver;

impl DependencyResolver {
    /// Create a resolver
    pub fn new() -> Self {
        Self
    }

    /// Declared dependencies of `descriptor` that are not active, in
    /// declaration order
    pub fn missing_dependencies(
        descriptor: &ServiceDescriptor,
        registry: &ServiceRegistry,
    ) -> Vec<String> {
        descriptor
            .dependencies
            .iter()
            .filter(|dep| !registry.contains(dep))
            .cloned()
            .collect()
    }

    /// Whether every dependency of `descriptor` is active
    pub fn is_ready(descriptor: &ServiceDescriptor, registry: &ServiceRegistry) -> bool {
        descriptor
            .dependencies
            .iter()
            .all(|dep| registry.contains(dep))
    }

    /// Pending services that could start right now, in registration order
    pub fn ready(&self, guard: &RegistrationGuard<'_>) -> Vec<String> {
        guard
            .pending_descriptors()
            .into_iter()
            .filter(|descriptor| Self::is_ready(descriptor, guard.registry()))
            .map(|descriptor| descriptor.name)
            .collect()
    }

    /// Start everything the active set allows, until no pass makes progress
    pub async fn drain(
        &self,
        guard: &mut RegistrationGuard<'_>,
        runner: &LifecycleRunner,
    ) -> DrainReport {
        debug!("Loading all pending services...");
        let mut report = DrainReport::default();

        loop {
            report.passes += 1;
            let mut progress = false;

            for name in guard.pending_names() {
                let ready = guard
                    .descriptor(&name)
                    .is_some_and(|descriptor| Self::is_ready(descriptor, guard.registry()));
                if !ready {
                    continue;
                }
                let Some(service) = guard.take(&name) else {
                    continue;
                };

                match runner.start(service).await {
                    Ok(()) => {
                        report.started.push(name);
                        progress = true;
                    }
                    Err(e) => {
                        error!("Failed to start service ({}): {}", name, e);
                        report.failed.push((name, e));
                    }
                }
            }

            debug!(
                "Resolver pass {} done, {} services pending",
                report.passes,
                guard.len()
            );
            if !progress {
                break;
            }
        }

        let pending = guard.pending_descriptors();
        report.blocked = pending
            .iter()
            .map(|descriptor| BlockedService {
                name: descriptor.name.clone(),
                missing: Self::missing_dependencies(descriptor, guard.registry()),
            })
            .collect();

        if !report.blocked.is_empty() {
            let summary: Vec<String> = report
                .blocked
                .iter()
                .map(|blocked| format!("{} (missing: {})", blocked.name, blocked.missing.join(", ")))
                .collect();
            warn!(
                "Some services could not be loaded due to unsatisfied dependencies: {}",
                summary.join("; ")
            );

            report.cycle = find_cycle(&pending);
            if let Some(cycle) = &report.cycle {
                warn!(
                    "Dependency cycle among pending services: {}",
                    cycle.join(" -> ")
                );
            }
        }

        report
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

/// First dependency cycle among `pending`, as a path that ends where it
/// starts (`a -> b -> a`). Dependencies outside `pending` are ignored.
pub(crate) fn find_cycle(pending: &[ServiceDescriptor]) -> Option<Vec<String>> {
    let graph: HashMap<&str, &[String]> = pending
        .iter()
        .map(|descriptor| (descriptor.name.as_str(), descriptor.dependencies.as_slice()))
        .collect();

    let mut state = HashMap::new();
    let mut path = Vec::new();

    pending
        .iter()
        .find_map(|descriptor| visit(&descriptor.name, &graph, &mut state, &mut path))
}

fn visit<'a>(
    node: &'a str,
    graph: &HashMap<&'a str, &'a [String]>,
    state: &mut HashMap<&'a str, Visit>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    match state.get(node) {
        Some(Visit::Done) => return None,
        Some(Visit::InProgress) => {
            let start = path.iter().position(|step| *step == node)?;
            let mut cycle: Vec<String> = path[start..].iter().map(|step| step.to_string()).collect();
            cycle.push(node.to_string());
            return Some(cycle);
        }
        None => {}
    }

    state.insert(node, Visit::InProgress);
    path.push(node);

    let dependencies = graph.get(node).copied().unwrap_or_default();
    for dep in dependencies {
        if graph.contains_key(dep.as_str()) {
            if let Some(cycle) = visit(dep, graph, state, path) {
                return Some(cycle);
            }
        }
    }

    path.pop();
    state.insert(node, Visit::Done);
    None
}
