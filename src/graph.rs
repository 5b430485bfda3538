//! Dependency graph construction and origin-path enumeration.
//!
//! Builds a directed graph from the flat adjacency listing produced by the
//! external tree-inspection tool, then computes every distinct root-to-node
//! path ("origin") per package. Graph keys and lookups are case-normalized;
//! rendered path segments keep the casing the sources declared (manifest
//! casing for roots, tree-listing casing for children).
//!
//! The walk is iterative: each work-list frame carries the full path taken
//! so far, so enumeration is bounded by the configured ceilings instead of
//! the call stack. A child already on the current path is never descended
//! into, which breaks cycles while keeping the edge available for reverse
//! ("who depends on me") lookups.

use std::collections::{HashMap, VecDeque};

use tracing::warn;

use crate::models::canonical_name;
use crate::resolver::TreeEntry;

/// Origin rendered for packages never reached from any root.
pub const DIRECT_ORIGIN: &str = "direct";

/// Ceilings applied during path enumeration.
///
/// Application dependency trees are small in practice, but fan-out times
/// depth is combinatorial in the worst case. When a ceiling is hit the
/// walker stops expanding that frontier and flags the result truncated;
/// paths already recorded stay valid.
#[derive(Debug, Clone, Copy)]
pub struct OriginLimits {
    /// Maximum nodes in a single path (inclusive of both ends)
    pub max_path_depth: usize,

    /// Maximum recorded paths per node
    pub max_paths_per_node: usize,
}

impl Default for OriginLimits {
    fn default() -> Self {
        Self {
            max_path_depth: 64,
            max_paths_per_node: 1024,
        }
    }
}

/// Directed dependency graph keyed by canonical package names.
///
/// Edge lists store the names exactly as the tree listing declared them, so
/// origin paths render with the source casing while every lookup stays
/// case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// canonical parent -> declared runtime dependencies (display names)
    edges: HashMap<String, Vec<String>>,

    /// canonical child -> packages that depend on it (display names)
    reverse: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Build the graph from the external tool's flat adjacency listing.
    ///
    /// Names are case-normalized before use as keys; the listing and the
    /// manifest frequently disagree on casing. Entries without a usable
    /// package name are skipped.
    pub fn from_tree(entries: &[TreeEntry]) -> Self {
        let mut graph = Self::default();

        for entry in entries {
            let parent = match entry.package.name() {
                Some(name) => name.to_string(),
                None => {
                    warn!("Skipping tree entry without a package name");
                    continue;
                }
            };
            let parent_key = canonical_name(&parent);

            let children = graph.edges.entry(parent_key.clone()).or_default();
            for dep in &entry.dependencies {
                let child = match dep.name() {
                    Some(name) => name.to_string(),
                    None => continue,
                };
                let child_key = canonical_name(&child);
                if !children.iter().any(|c| canonical_name(c) == child_key) {
                    children.push(child);
                }
            }

            let children = children.clone();
            for child in children {
                let child_key = canonical_name(&child);
                graph.edges.entry(child_key.clone()).or_default();
                let parents = graph.reverse.entry(child_key).or_default();
                if !parents.iter().any(|p| canonical_name(p) == parent_key) {
                    parents.push(parent.clone());
                }
            }
        }

        graph
    }

    /// Number of distinct packages in the graph.
    pub fn node_count(&self) -> usize {
        self.edges.len()
    }

    /// Whether the package appears in the graph.
    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(&canonical_name(name))
    }

    /// Declared dependencies of a package, as named in the tree listing.
    pub fn dependencies(&self, name: &str) -> &[String] {
        self.edges
            .get(&canonical_name(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Packages that declare a dependency on the given package.
    pub fn dependents(&self, name: &str) -> &[String] {
        self.reverse
            .get(&canonical_name(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Enumerate all root-to-node paths with default ceilings.
    pub fn compute_origins(&self, roots: &[String]) -> OriginMap {
        self.compute_origins_with(roots, OriginLimits::default())
    }

    /// Enumerate all root-to-node paths.
    ///
    /// Roots are walked in the order given (manifest declaration order), so
    /// serialized origins list paths from earlier roots first. Path segments
    /// keep the caller's casing for roots and the tree listing's casing for
    /// everything below them; only lookups are normalized. The walk is
    /// deterministic: re-running it over an unchanged graph yields identical
    /// origins.
    pub fn compute_origins_with(&self, roots: &[String], limits: OriginLimits) -> OriginMap {
        let mut paths: HashMap<String, Vec<Vec<String>>> = HashMap::new();
        let mut truncated = false;

        for root in roots {
            let mut queue: VecDeque<Vec<String>> = VecDeque::new();
            queue.push_back(vec![root.clone()]);

            while let Some(path) = queue.pop_front() {
                let node = path.last().expect("work-list paths are never empty").clone();
                let node_key = canonical_name(&node);

                let node_paths = paths.entry(node_key.clone()).or_default();
                if node_paths.len() >= limits.max_paths_per_node {
                    truncated = true;
                    continue;
                }
                node_paths.push(path.clone());

                if path.len() >= limits.max_path_depth {
                    truncated = true;
                    continue;
                }

                for child in self.dependencies(&node_key) {
                    let child_key = canonical_name(child);
                    // Cycle guard: never revisit a node on the current path
                    if path.iter().any(|seen| canonical_name(seen) == child_key) {
                        continue;
                    }
                    let mut next = path.clone();
                    next.push(child.clone());
                    queue.push_back(next);
                }
            }
        }

        if truncated {
            warn!(
                "Origin enumeration truncated (depth ceiling {}, per-node path ceiling {})",
                limits.max_path_depth, limits.max_paths_per_node
            );
        }

        OriginMap { paths, truncated }
    }
}

/// All enumerated origin paths, keyed by canonical package name.
#[derive(Debug, Clone, Default)]
pub struct OriginMap {
    paths: HashMap<String, Vec<Vec<String>>>,
    truncated: bool,
}

impl OriginMap {
    /// Recorded paths for a package (each inclusive of root and target).
    pub fn paths(&self, name: &str) -> &[Vec<String>] {
        self.paths
            .get(&canonical_name(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether any ceiling was hit during enumeration.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Serialize a package's origin.
    ///
    /// Path segments join with `" -> "`, distinct paths with `"; "`. A
    /// package with no recorded path renders as the `"direct"` sentinel.
    pub fn render(&self, name: &str) -> String {
        let paths = self.paths(name);
        if paths.is_empty() {
            return DIRECT_ORIGIN.to_string();
        }
        paths
            .iter()
            .map(|path| path.join(" -> "))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(json: &str) -> Vec<TreeEntry> {
        serde_json::from_str(json).expect("test tree JSON is valid")
    }

    fn simple_tree() -> Vec<TreeEntry> {
        tree(
            r#"[
                {"package": {"package_name": "rootA", "installed_version": "1.0"},
                 "dependencies": [{"package_name": "mid"}]},
                {"package": {"package_name": "mid", "installed_version": "0.5"},
                 "dependencies": [{"package_name": "pkg"}]},
                {"package": {"package_name": "rootB", "installed_version": "2.0"},
                 "dependencies": [{"package_name": "pkg"}]},
                {"package": {"package_name": "pkg", "installed_version": "0.1"},
                 "dependencies": []}
            ]"#,
        )
    }

    #[test]
    fn builds_case_normalized_adjacency() {
        let entries = tree(
            r#"[
                {"package": {"package_name": "Flask", "installed_version": "2.1.0"},
                 "dependencies": [{"package_name": "Click"}, {"package_name": "Jinja2"}]}
            ]"#,
        );
        let graph = DependencyGraph::from_tree(&entries);

        assert!(graph.contains("flask"));
        assert!(graph.contains("FLASK"));
        assert_eq!(graph.dependencies("flask"), ["Click", "Jinja2"]);
        assert_eq!(graph.dependencies("FLASK"), ["Click", "Jinja2"]);
        assert_eq!(graph.dependents("jinja2"), ["Flask"]);
    }

    #[test]
    fn accepts_key_field_for_dependency_names() {
        let entries = tree(
            r#"[
                {"package": {"key": "flask", "installed_version": "2.1.0"},
                 "dependencies": [{"key": "click"}]}
            ]"#,
        );
        let graph = DependencyGraph::from_tree(&entries);
        assert_eq!(graph.dependencies("flask"), ["click"]);
    }

    #[test]
    fn two_roots_serialize_in_declaration_order() {
        let graph = DependencyGraph::from_tree(&simple_tree());
        let origins =
            graph.compute_origins(&["rootA".to_string(), "rootB".to_string()]);

        assert_eq!(origins.render("pkg"), "rootA -> mid -> pkg; rootB -> pkg");
        assert_eq!(origins.render("mid"), "rootA -> mid");
    }

    #[test]
    fn path_segments_keep_declared_casing() {
        let entries = tree(
            r#"[
                {"package": {"package_name": "Django", "installed_version": "4.2"},
                 "dependencies": [{"package_name": "asgiref"}, {"package_name": "SQLParse"}]}
            ]"#,
        );
        let graph = DependencyGraph::from_tree(&entries);
        // Manifest casing differs from the tree listing's
        let origins = graph.compute_origins(&["django".to_string()]);

        assert_eq!(origins.render("django"), "django");
        assert_eq!(origins.render("asgiref"), "django -> asgiref");
        assert_eq!(origins.render("sqlparse"), "django -> SQLParse");
        // Lookup stays case-insensitive
        assert_eq!(origins.render("SQLPARSE"), "django -> SQLParse");
    }

    #[test]
    fn unreached_package_renders_direct_sentinel() {
        let graph = DependencyGraph::from_tree(&simple_tree());
        let origins = graph.compute_origins(&["rootA".to_string()]);

        assert_eq!(origins.render("rootb"), DIRECT_ORIGIN);
        assert_eq!(origins.render("never-seen"), DIRECT_ORIGIN);
    }

    #[test]
    fn cycle_terminates_without_duplicate_paths() {
        let entries = tree(
            r#"[
                {"package": {"package_name": "a"}, "dependencies": [{"package_name": "b"}]},
                {"package": {"package_name": "b"}, "dependencies": [{"package_name": "a"}]}
            ]"#,
        );
        let graph = DependencyGraph::from_tree(&entries);
        let origins = graph.compute_origins(&["a".to_string()]);

        assert_eq!(origins.render("a"), "a");
        assert_eq!(origins.render("b"), "a -> b");
        assert!(!origins.is_truncated());
    }

    #[test]
    fn diamond_records_one_path_per_route() {
        let entries = tree(
            r#"[
                {"package": {"package_name": "a"},
                 "dependencies": [{"package_name": "b"}, {"package_name": "c"}]},
                {"package": {"package_name": "b"}, "dependencies": [{"package_name": "d"}]},
                {"package": {"package_name": "c"}, "dependencies": [{"package_name": "d"}]}
            ]"#,
        );
        let graph = DependencyGraph::from_tree(&entries);
        let origins = graph.compute_origins(&["a".to_string()]);

        assert_eq!(origins.paths("d").len(), 2);
        assert_eq!(origins.render("d"), "a -> b -> d; a -> c -> d");
    }

    #[test]
    fn enumeration_is_idempotent() {
        let graph = DependencyGraph::from_tree(&simple_tree());
        let roots = vec!["rootA".to_string(), "rootB".to_string()];

        let first = graph.compute_origins(&roots);
        let second = graph.compute_origins(&roots);

        for name in ["roota", "rootb", "mid", "pkg"] {
            assert_eq!(first.render(name), second.render(name));
        }
    }

    #[test]
    fn depth_ceiling_truncates_long_chains() {
        let entries = tree(
            r#"[
                {"package": {"package_name": "a"}, "dependencies": [{"package_name": "b"}]},
                {"package": {"package_name": "b"}, "dependencies": [{"package_name": "c"}]},
                {"package": {"package_name": "c"}, "dependencies": [{"package_name": "d"}]}
            ]"#,
        );
        let graph = DependencyGraph::from_tree(&entries);
        let limits = OriginLimits {
            max_path_depth: 2,
            max_paths_per_node: 1024,
        };
        let origins = graph.compute_origins_with(&["a".to_string()], limits);

        assert!(origins.is_truncated());
        assert_eq!(origins.render("b"), "a -> b");
        // c is beyond the ceiling and was never reached
        assert_eq!(origins.render("c"), DIRECT_ORIGIN);
    }

    #[test]
    fn per_node_path_ceiling_caps_recorded_paths() {
        // Two routes into "sink"; cap at one recorded path
        let entries = tree(
            r#"[
                {"package": {"package_name": "a"},
                 "dependencies": [{"package_name": "b"}, {"package_name": "c"}]},
                {"package": {"package_name": "b"}, "dependencies": [{"package_name": "sink"}]},
                {"package": {"package_name": "c"}, "dependencies": [{"package_name": "sink"}]}
            ]"#,
        );
        let graph = DependencyGraph::from_tree(&entries);
        let limits = OriginLimits {
            max_path_depth: 64,
            max_paths_per_node: 1,
        };
        let origins = graph.compute_origins_with(&["a".to_string()], limits);

        assert!(origins.is_truncated());
        assert_eq!(origins.paths("sink").len(), 1);
    }

    #[test]
    fn self_dependency_is_not_descended() {
        let entries = tree(
            r#"[
                {"package": {"package_name": "a"}, "dependencies": [{"package_name": "a"}]}
            ]"#,
        );
        let graph = DependencyGraph::from_tree(&entries);
        let origins = graph.compute_origins(&["a".to_string()]);
        assert_eq!(origins.paths("a").len(), 1);
    }
}
