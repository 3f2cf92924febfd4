// orrery-core/src/build/env.rs
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

use tracing::debug;

/// Variables layered over the inherited environment for build and post-install commands.
#[derive(Debug, Clone, Default)]
pub struct BuildEnvironment {
    vars: BTreeMap<String, String>,
}

impl BuildEnvironment {
    /// `dep_prefixes` are the install prefixes of the formula's dependencies, in install order.
    pub fn new(dep_prefixes: &[PathBuf], formula_env: &BTreeMap<String, String>) -> Self {
        Self::with_base(dep_prefixes, formula_env, |key| env::var(key).ok())
    }

    fn with_base<F>(
        dep_prefixes: &[PathBuf],
        formula_env: &BTreeMap<String, String>,
        base: F,
    ) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut vars = BTreeMap::new();

        let bins: Vec<PathBuf> = dep_prefixes.iter().map(|p| p.join("bin")).collect();
        let pkgconfig: Vec<PathBuf> = dep_prefixes
            .iter()
            .flat_map(|p| [p.join("lib/pkgconfig"), p.join("share/pkgconfig")])
            .collect();

        vars.insert("PATH".to_string(), prepend(&bins, base("PATH")));
        vars.insert(
            "PKG_CONFIG_PATH".to_string(),
            prepend(&pkgconfig, base("PKG_CONFIG_PATH")),
        );
        vars.insert(
            "CMAKE_PREFIX_PATH".to_string(),
            prepend(dep_prefixes, base("CMAKE_PREFIX_PATH")),
        );

        if base("MAKEFLAGS").is_none() {
            let jobs = num_cpus::get();
            vars.insert("MAKEFLAGS".to_string(), format!("-j{jobs}"));
        }

        for (key, value) in formula_env {
            debug!("Formula sets {}={}", key, value);
            vars.insert(key.clone(), value.clone());
        }

        Self { vars }
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Value a spawned command would see: a layered variable, else the inherited one.
    pub fn lookup(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| env::var(key).ok())
    }
}

fn prepend(dirs: &[PathBuf], existing: Option<String>) -> String {
    let mut parts: Vec<String> = dirs.iter().map(|p| p.display().to_string()).collect();
    if let Some(existing) = existing.filter(|s| !s.is_empty()) {
        parts.push(existing);
    }
    parts.join(":")
}
