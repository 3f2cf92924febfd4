// orrery-common/src/dependency/resolver.rs
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, error};

use crate::catalog::Catalog;
use crate::dependency::{Dependency, DependencyTag};
use crate::error::{OrreryError, Result};
use crate::model::formula::Formula;

// --- ResolutionContext ---
pub struct ResolutionContext<'a> {
    pub catalog: &'a Catalog,
    pub include_optional: bool,
    pub include_test: bool,
    pub skip_recommended: bool,
}

impl<'a> ResolutionContext<'a> {
    /// Runtime, build and recommended edges; optional and test edges are left out.
    pub fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            include_optional: false,
            include_test: false,
            skip_recommended: false,
        }
    }

    pub fn should_consider_edge(&self, edge_tags: DependencyTag) -> bool {
        if edge_tags.contains(DependencyTag::TEST) && !self.include_test {
            return false;
        }
        if edge_tags.contains(DependencyTag::OPTIONAL) && !self.include_optional {
            return false;
        }
        if edge_tags.contains(DependencyTag::RECOMMENDED) && self.skip_recommended {
            return false;
        }
        true
    }
}

// --- ResolvedFormula ---
#[derive(Debug, Clone)]
pub struct ResolvedFormula {
    pub formula: Arc<Formula>,
    /// OR of the tags of every edge that reached this formula.
    pub accumulated_tags: DependencyTag,
    /// Named on the command line rather than pulled in as a dependency.
    pub requested: bool,
    /// Canonical names of the direct dependencies that were followed.
    pub dependencies: Vec<String>,
}

impl ResolvedFormula {
    pub fn name(&self) -> &str {
        self.formula.name()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedGraph {
    /// Every formula appears after all of its dependencies.
    pub install_plan: Vec<ResolvedFormula>,
}

impl ResolvedGraph {
    pub fn names(&self) -> Vec<&str> {
        self.install_plan.iter().map(ResolvedFormula::name).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ResolvedFormula> {
        self.install_plan.iter().find(|r| r.name() == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.install_plan.iter().position(|r| r.name() == name)
    }

    /// All formulas `name` depends on, directly or not, in install order.
    pub fn transitive_dependencies(&self, name: &str) -> Vec<&ResolvedFormula> {
        let mut wanted = HashSet::new();
        let mut stack = vec![name.to_string()];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.get(&current) {
                for dep in &node.dependencies {
                    if wanted.insert(dep.clone()) {
                        stack.push(dep.clone());
                    }
                }
            }
        }
        self.install_plan
            .iter()
            .filter(|r| wanted.contains(r.name()))
            .collect()
    }
}

pub struct DependencyResolver<'a> {
    context: ResolutionContext<'a>,
    // DFS stack, kept ordered so a detected cycle can be reported as a path.
    visiting: Vec<String>,
    visited: HashSet<String>,
    plan_index: HashMap<String, usize>,
    install_plan: Vec<ResolvedFormula>,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(context: ResolutionContext<'a>) -> Self {
        Self {
            context,
            visiting: Vec::new(),
            visited: HashSet::new(),
            plan_index: HashMap::new(),
            install_plan: Vec::new(),
        }
    }

    pub fn resolve_targets(&mut self, targets: &[String]) -> Result<ResolvedGraph> {
        debug!("Starting dependency resolution for targets: {:?}", targets);
        self.visiting.clear();
        self.visited.clear();
        self.plan_index.clear();
        self.install_plan.clear();

        for target_name in targets {
            let formula = self.context.catalog.load_formula(target_name)?;
            self.visit(formula, DependencyTag::RUNTIME, true)?;
        }

        debug!(
            "Final installation plan: {:?}",
            self.install_plan
                .iter()
                .map(|r| (r.name(), r.accumulated_tags))
                .collect::<Vec<_>>()
        );

        Ok(ResolvedGraph {
            install_plan: std::mem::take(&mut self.install_plan),
        })
    }

    fn visit(
        &mut self,
        formula: Arc<Formula>,
        tags_from_parent_edge: DependencyTag,
        is_initial_target: bool,
    ) -> Result<()> {
        let name = formula.name().to_string();

        if let Some(pos) = self.visiting.iter().position(|n| n == &name) {
            let mut cycle = self.visiting[pos..].to_vec();
            cycle.push(name);
            error!("Dependency cycle detected: {}", cycle.join(" -> "));
            return Err(OrreryError::CyclicDependency { cycle });
        }

        if self.visited.contains(&name) {
            if let Some(&idx) = self.plan_index.get(&name) {
                let existing = &mut self.install_plan[idx];
                existing.accumulated_tags |= tags_from_parent_edge;
                existing.requested |= is_initial_target;
            }
            debug!("'{}' already resolved.", name);
            return Ok(());
        }

        debug!(
            "Resolving: {} (requested as {}, is_target: {})",
            name, tags_from_parent_edge, is_initial_target
        );
        self.visiting.push(name.clone());

        let mut followed = Vec::new();
        for dep in formula.dependencies() {
            if !self.context.should_consider_edge(dep.tags) {
                debug!(
                    "Edge '{}' -> '{}' ({}) skipped by resolution options.",
                    name, dep.name, dep.tags
                );
                continue;
            }
            let child = self.lookup(dep, &name)?;
            let child_name = child.name().to_string();
            self.visit(child, dep.tags, false)?;
            if !followed.contains(&child_name) {
                followed.push(child_name);
            }
        }

        self.visiting.pop();
        self.visited.insert(name.clone());
        self.plan_index.insert(name, self.install_plan.len());
        self.install_plan.push(ResolvedFormula {
            formula,
            accumulated_tags: tags_from_parent_edge,
            requested: is_initial_target,
            dependencies: followed,
        });
        Ok(())
    }

    fn lookup(&self, dep: &Dependency, required_by: &str) -> Result<Arc<Formula>> {
        self.context.catalog.get(&dep.name).cloned().ok_or_else(|| {
            error!(
                "Unknown dependency '{}' required by '{}'",
                dep.name, required_by
            );
            OrreryError::UnknownDependency {
                name: dep.name.clone(),
                required_by: required_by.to_string(),
            }
        })
    }
}

/// Resolves every catalog entry with all edge kinds enabled and collects the failures.
pub fn check_catalog(catalog: &Catalog) -> Vec<(String, OrreryError)> {
    let mut problems = Vec::new();
    for name in catalog.names() {
        let context = ResolutionContext {
            catalog,
            include_optional: true,
            include_test: true,
            skip_recommended: false,
        };
        if let Err(e) = DependencyResolver::new(context).resolve_targets(&[name.to_string()]) {
            problems.push((name.to_string(), e));
        }
    }
    problems
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(src: &str) -> Catalog {
        let mut catalog = Catalog::new();
        catalog.add_source("test.toml", src).unwrap();
        catalog
    }

    fn system(name: &str, deps: &str) -> String {
        format!(
            r#"
            [[formula]]
            name = "{name}"
            kind = "system"
            probe = {{ binary = "{name}" }}
            dependencies = [{deps}]
            "#
        )
    }

    fn resolve(catalog: &Catalog, targets: &[&str]) -> Result<ResolvedGraph> {
        let targets: Vec<String> = targets.iter().map(|s| s.to_string()).collect();
        DependencyResolver::new(ResolutionContext::new(catalog)).resolve_targets(&targets)
    }

    fn assert_topological(graph: &ResolvedGraph) {
        for (idx, node) in graph.install_plan.iter().enumerate() {
            for dep in &node.dependencies {
                let dep_idx = graph.position(dep).unwrap();
                assert!(dep_idx < idx, "{dep} must precede {}", node.name());
            }
        }
    }

    #[test]
    fn diamond_resolves_shared_dependency_once() {
        let src = [
            system("c", ""),
            system("a", r#""c""#),
            system("b", r#""c""#),
            system("d", r#""a", "b""#),
        ]
        .concat();
        let graph = resolve(&catalog(&src), &["d"]).unwrap();
        assert_eq!(graph.names(), vec!["c", "a", "b", "d"]);
        assert_topological(&graph);
        assert!(graph.get("d").unwrap().requested);
        assert!(!graph.get("c").unwrap().requested);
    }

    #[test]
    fn siblings_keep_declaration_order() {
        let src = [
            system("z", ""),
            system("m", ""),
            system("a", ""),
            system("top", r#""z", "m", "a""#),
        ]
        .concat();
        let graph = resolve(&catalog(&src), &["top"]).unwrap();
        assert_eq!(graph.names(), vec!["z", "m", "a", "top"]);
    }

    #[test]
    fn cycle_is_rejected_with_path() {
        let src = [system("a", r#""b""#), system("b", r#""a""#)].concat();
        let err = resolve(&catalog(&src), &["a"]).unwrap_err();
        match err {
            OrreryError::CyclicDependency { cycle } => {
                assert_eq!(cycle, vec!["a", "b", "a"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let src = system("a", r#""a""#);
        assert!(matches!(
            resolve(&catalog(&src), &["a"]),
            Err(OrreryError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn missing_dependency_is_unknown() {
        let src = system("a", r#""ghost""#);
        match resolve(&catalog(&src), &["a"]).unwrap_err() {
            OrreryError::UnknownDependency { name, required_by } => {
                assert_eq!(name, "ghost");
                assert_eq!(required_by, "a");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn optional_edges_follow_options_and_tags_accumulate() {
        let src = [
            system("viewer", ""),
            system("tool", ""),
            system(
                "app",
                r#"{ name = "viewer", tags = ["optional"] }, { name = "tool", tags = ["build"] }, "tool""#,
            ),
        ]
        .concat();
        let catalog = catalog(&src);

        let graph = resolve(&catalog, &["app"]).unwrap();
        assert_eq!(graph.names(), vec!["tool", "app"]);
        assert_eq!(
            graph.get("tool").unwrap().accumulated_tags,
            DependencyTag::BUILD | DependencyTag::RUNTIME
        );
        assert_eq!(graph.get("app").unwrap().dependencies, vec!["tool"]);

        let mut context = ResolutionContext::new(&catalog);
        context.include_optional = true;
        let graph = DependencyResolver::new(context)
            .resolve_targets(&["app".to_string()])
            .unwrap();
        assert_eq!(graph.names(), vec!["viewer", "tool", "app"]);
    }

    #[test]
    fn transitive_dependencies_are_in_plan_order() {
        let src = [
            system("c", ""),
            system("b", r#""c""#),
            system("a", r#""b""#),
            system("x", ""),
        ]
        .concat();
        let graph = resolve(&catalog(&src), &["a", "x"]).unwrap();
        let deps: Vec<&str> = graph
            .transitive_dependencies("a")
            .into_iter()
            .map(ResolvedFormula::name)
            .collect();
        assert_eq!(deps, vec!["c", "b"]);
        assert!(graph.transitive_dependencies("x").is_empty());
    }

    #[test]
    fn builtin_kstars_installs_indi_after_its_dependencies() {
        let catalog = Catalog::builtin().unwrap();
        let graph = resolve(&catalog, &["kstars"]).unwrap();
        assert_topological(&graph);
        let indi = graph.position("indi-lib").unwrap();
        let kstars = graph.position("kstars").unwrap();
        assert!(indi < kstars);
        assert_eq!(kstars, graph.install_plan.len() - 1);
        assert!(graph.get("xplanet").is_none());
        assert!(graph
            .get("cmake")
            .unwrap()
            .accumulated_tags
            .contains(DependencyTag::BUILD));
    }

    #[test]
    fn builtin_catalog_checks_clean() {
        let catalog = Catalog::builtin().unwrap();
        assert!(check_catalog(&catalog).is_empty());
    }

    #[test]
    fn unknown_target_is_not_found() {
        let catalog = Catalog::new();
        assert!(matches!(
            resolve(&catalog, &["nothing"]),
            Err(OrreryError::NotFound(_))
        ));
    }
}
