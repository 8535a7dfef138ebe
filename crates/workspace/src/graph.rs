//! Project dependency graph using petgraph.
//!
//! Both edge directions are built in one pass when the graph is constructed,
//! so [`ProjectGraph::consuming_projects`] can never observe a partially
//! inverted graph. Edges run from a dependency to its dependent, which makes
//! a topological walk visit producers before consumers.

use crate::error::{Error, Result};
use crate::manifest::{DependencyKind, PackageManifest};
use crate::project::Project;
use crate::specifier::DependencySpecifier;
use petgraph::Direction;
use petgraph::algo::{is_cyclic_directed, tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::BTreeMap;
use tracing::debug;

/// The immutable project graph of a workspace.
#[derive(Debug, Clone)]
pub struct ProjectGraph {
    graph: DiGraph<Project, ()>,
    by_name: BTreeMap<String, NodeIndex>,
}

impl ProjectGraph {
    /// Builds the graph from a list of projects.
    ///
    /// A project depends on a local project when a runtime, dev or optional
    /// declaration names it (directly or through an `npm:` alias), the name
    /// is not decoupled, and the declaration either uses the workspace
    /// protocol or is satisfied by the local project's version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateProject`] when two projects share a name and
    /// [`Error::CycleDetected`] when local dependencies form a cycle.
    pub fn new(projects: impl IntoIterator<Item = Project>) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut by_name = BTreeMap::new();

        for project in projects {
            let name = project.name().to_string();
            if by_name.contains_key(&name) {
                return Err(Error::DuplicateProject { name });
            }
            let idx = graph.add_node(project);
            by_name.insert(name, idx);
        }

        let mut edges = Vec::new();
        for &consumer_idx in by_name.values() {
            let consumer = &graph[consumer_idx];
            for kind in DependencyKind::GRAPH {
                for (key, value) in consumer.manifest().table(kind) {
                    let specifier = DependencySpecifier::parse(value);
                    let target = specifier.alias_target().unwrap_or(key);
                    if consumer.is_decoupled(key) || consumer.is_decoupled(target) {
                        continue;
                    }
                    let Some(&producer_idx) = by_name.get(target) else {
                        continue;
                    };
                    if producer_idx == consumer_idx {
                        continue;
                    }
                    let producer = &graph[producer_idx];
                    let linked = specifier.is_workspace()
                        || producer
                            .parsed_version()
                            .is_ok_and(|version| specifier.satisfies(&version));
                    if linked {
                        edges.push((producer_idx, consumer_idx));
                    } else {
                        debug!(
                            consumer = consumer.name(),
                            dependency = target,
                            range = %value,
                            local_version = producer.version(),
                            "Local version does not satisfy range; not linking"
                        );
                    }
                }
            }
        }
        for (producer, consumer) in edges {
            graph.update_edge(producer, consumer, ());
        }

        let project_graph = Self { graph, by_name };
        project_graph.check_cycles()?;
        debug!(
            projects = project_graph.graph.node_count(),
            edges = project_graph.graph.edge_count(),
            "Built project graph"
        );
        Ok(project_graph)
    }

    /// Rebuilds the graph with some manifests replaced.
    ///
    /// Used after versions were rewritten in memory so that edges are
    /// re-evaluated against the new versions.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`ProjectGraph::new`].
    pub fn with_updated_manifests(
        &self,
        manifests: &BTreeMap<String, PackageManifest>,
    ) -> Result<Self> {
        Self::new(self.projects().map(|project| {
            match manifests.get(project.name()) {
                Some(manifest) => project.clone().with_manifest(manifest.clone()),
                None => project.clone(),
            }
        }))
    }

    fn check_cycles(&self) -> Result<()> {
        if !is_cyclic_directed(&self.graph) {
            return Ok(());
        }
        let mut projects: Vec<String> = tarjan_scc(&self.graph)
            .into_iter()
            .find(|component| component.len() > 1)
            .unwrap_or_default()
            .into_iter()
            .map(|idx| self.graph[idx].name().to_string())
            .collect();
        projects.sort();
        Err(Error::CycleDetected { projects })
    }

    /// Number of projects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Whether the workspace has no projects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Whether a project with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Looks up a project.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Project> {
        self.by_name.get(name).map(|&idx| &self.graph[idx])
    }

    /// Looks up a project, failing if it is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProjectNotFound`] for unknown names.
    pub fn project(&self, name: &str) -> Result<&Project> {
        self.get(name).ok_or_else(|| Error::project_not_found(name))
    }

    /// All projects, ordered by name.
    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.by_name.values().map(|&idx| &self.graph[idx])
    }

    /// Projects `name` depends on, ordered by name.
    #[must_use]
    pub fn dependency_projects(&self, name: &str) -> Vec<&Project> {
        self.neighbors(name, Direction::Incoming)
    }

    /// Projects that depend on `name`, ordered by name.
    #[must_use]
    pub fn consuming_projects(&self, name: &str) -> Vec<&Project> {
        self.neighbors(name, Direction::Outgoing)
    }

    /// Whether `consumer` has a graph edge to `producer`.
    #[must_use]
    pub fn depends_on(&self, consumer: &str, producer: &str) -> bool {
        match (self.by_name.get(consumer), self.by_name.get(producer)) {
            (Some(&c), Some(&p)) => self.graph.contains_edge(p, c),
            _ => false,
        }
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<&Project> {
        let Some(&idx) = self.by_name.get(name) else {
            return Vec::new();
        };
        let mut projects: Vec<&Project> = self
            .graph
            .neighbors_directed(idx, direction)
            .map(|n| &self.graph[n])
            .collect();
        projects.sort_by(|a, b| a.name().cmp(b.name()));
        projects
    }

    /// Projects in dependency order: every producer before its consumers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CycleDetected`] if the graph is cyclic, which cannot
    /// happen for a graph built by [`ProjectGraph::new`].
    pub fn topological_order(&self) -> Result<Vec<&Project>> {
        let order = toposort(&self.graph, None).map_err(|cycle| Error::CycleDetected {
            projects: vec![self.graph[cycle.node_id()].name().to_string()],
        })?;
        Ok(order.into_iter().map(|idx| &self.graph[idx]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(projects: &[&Project]) -> Vec<String> {
        projects.iter().map(|p| p.name().to_string()).collect()
    }

    #[test]
    fn test_edges_are_inverted_consistently() {
        let graph = ProjectGraph::new([
            Project::builder("c", "1.0.0").build(),
            Project::builder("b", "1.0.0").dependency("c", "^1.0.0").build(),
            Project::builder("a", "1.0.0")
                .dependency("b", "^1.0.0")
                .dev_dependency("c", "~1.0.0")
                .build(),
        ])
        .unwrap();

        assert_eq!(names(&graph.dependency_projects("a")), ["b", "c"]);
        assert_eq!(names(&graph.consuming_projects("c")), ["a", "b"]);
        assert!(graph.depends_on("b", "c"));
        assert!(!graph.depends_on("c", "b"));
    }

    #[test]
    fn test_unsatisfied_range_is_not_an_edge() {
        let graph = ProjectGraph::new([
            Project::builder("lib", "2.0.0").build(),
            Project::builder("app", "1.0.0").dependency("lib", "^1.0.0").build(),
        ])
        .unwrap();
        assert!(graph.consuming_projects("lib").is_empty());
    }

    #[test]
    fn test_workspace_protocol_always_links() {
        let graph = ProjectGraph::new([
            Project::builder("lib", "5.0.0").build(),
            Project::builder("app", "1.0.0")
                .dependency("lib", "workspace:*")
                .build(),
        ])
        .unwrap();
        assert_eq!(names(&graph.consuming_projects("lib")), ["app"]);
    }

    #[test]
    fn test_peer_dependencies_do_not_link() {
        let graph = ProjectGraph::new([
            Project::builder("lib", "1.0.0").build(),
            Project::builder("plugin", "1.0.0")
                .peer_dependency("lib", "^1.0.0")
                .build(),
        ])
        .unwrap();
        assert!(graph.dependency_projects("plugin").is_empty());
    }

    #[test]
    fn test_cycle_detected() {
        let err = ProjectGraph::new([
            Project::builder("a", "1.0.0").dependency("b", "^1.0.0").build(),
            Project::builder("b", "1.0.0").dependency("a", "^1.0.0").build(),
        ])
        .unwrap_err();
        match err {
            Error::CycleDetected { projects } => assert_eq!(projects, ["a", "b"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decoupled_cycle_is_allowed() {
        let graph = ProjectGraph::new([
            Project::builder("a", "1.0.0").dependency("b", "^1.0.0").build(),
            Project::builder("b", "1.0.0")
                .dev_dependency("a", "^1.0.0")
                .decouple("a")
                .build(),
        ])
        .unwrap();
        assert_eq!(names(&graph.consuming_projects("b")), ["a"]);
        assert!(graph.consuming_projects("a").is_empty());
    }

    #[test]
    fn test_duplicate_projects_rejected() {
        let err = ProjectGraph::new([
            Project::builder("a", "1.0.0").build(),
            Project::builder("a", "2.0.0").build(),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::DuplicateProject { name } if name == "a"));
    }

    #[test]
    fn test_topological_order() {
        let graph = ProjectGraph::new([
            Project::builder("a", "1.0.0").dependency("b", "^1.0.0").build(),
            Project::builder("b", "1.0.0").dependency("c", "^1.0.0").build(),
            Project::builder("c", "1.0.0").build(),
        ])
        .unwrap();
        let order = names(&graph.topological_order().unwrap());
        assert_eq!(order, ["c", "b", "a"]);
    }

    #[test]
    fn test_with_updated_manifests_relinks() {
        let graph = ProjectGraph::new([
            Project::builder("lib", "1.0.0").build(),
            Project::builder("app", "1.0.0").dependency("lib", "^1.0.0").build(),
        ])
        .unwrap();
        let mut manifests = BTreeMap::new();
        manifests.insert("lib".to_string(), PackageManifest::new("lib", "2.0.0"));

        let updated = graph.with_updated_manifests(&manifests).unwrap();
        assert_eq!(updated.project("lib").unwrap().version(), "2.0.0");
        assert!(!updated.depends_on("app", "lib"));
        assert!(graph.depends_on("app", "lib"));
    }

    #[test]
    fn test_project_lookup() {
        let graph = ProjectGraph::new([Project::builder("a", "1.0.0").build()]).unwrap();
        assert!(graph.contains("a"));
        assert_eq!(graph.len(), 1);
        assert!(matches!(
            graph.project("zzz"),
            Err(Error::ProjectNotFound { .. })
        ));
    }
}
