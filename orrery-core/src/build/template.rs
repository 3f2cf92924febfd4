// orrery-core/src/build/template.rs
//! `{placeholder}` expansion for step arguments, paths and caveats.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use orrery_common::config::Config;
use orrery_common::error::{OrreryError, Result};
use orrery_common::model::Formula;

pub const STD_CMAKE_ARGS: &str = "{std_cmake_args}";

/// Standard CMake arguments for installing into `prefix`.
pub fn std_cmake_args(prefix: &Path) -> Vec<String> {
    vec![
        format!("-DCMAKE_INSTALL_PREFIX={}", prefix.display()),
        "-DCMAKE_INSTALL_LIBDIR=lib".to_string(),
        "-DCMAKE_BUILD_TYPE=Release".to_string(),
        "-DCMAKE_FIND_FRAMEWORK=LAST".to_string(),
        "-DCMAKE_VERBOSE_MAKEFILE=ON".to_string(),
        "-Wno-dev".to_string(),
    ]
}

#[derive(Debug, Clone)]
pub struct TemplateContext {
    pub name: String,
    pub version: String,
    pub prefix: PathBuf,
    pub home: PathBuf,
    pub desktop: PathBuf,
    /// Install prefixes of resolved dependencies, keyed by formula name.
    pub opt_prefixes: HashMap<String, PathBuf>,
    /// Fallback for `{opt:<dep>}` when `dep` has no entry in `opt_prefixes`; used only if
    /// `<opt_dir>/<dep>` exists.
    pub opt_dir: PathBuf,
}

impl TemplateContext {
    pub fn for_formula(
        formula: &Formula,
        prefix: PathBuf,
        config: &Config,
        opt_prefixes: HashMap<String, PathBuf>,
    ) -> Self {
        Self {
            name: formula.name.clone(),
            version: formula.version.clone(),
            prefix,
            home: config.home_dir(),
            desktop: config.desktop_dir(),
            opt_prefixes,
            opt_dir: config.opt_dir(),
        }
    }

    fn opt_prefix(&self, dep: &str, input: &str) -> Result<PathBuf> {
        let short = dep.rsplit('/').next().unwrap_or(dep);
        if let Some(prefix) = self
            .opt_prefixes
            .get(dep)
            .or_else(|| self.opt_prefixes.get(short))
        {
            return Ok(prefix.clone());
        }
        let linked = self.opt_dir.join(short);
        if linked.exists() {
            return Ok(linked);
        }
        Err(OrreryError::Template {
            input: input.to_string(),
            reason: format!("no install prefix known for '{dep}'"),
        })
    }

    fn lookup(&self, key: &str, input: &str) -> Result<String> {
        let path = match key.split_once(':') {
            Some(("opt", dep)) => self.opt_prefix(dep, input)?,
            Some(("opt_bin", dep)) => self.opt_prefix(dep, input)?.join("bin"),
            Some(("opt_share", dep)) => self.opt_prefix(dep, input)?.join("share"),
            Some(("opt_lib", dep)) => self.opt_prefix(dep, input)?.join("lib"),
            Some(_) => return Err(unknown(key, input)),
            None => match key {
                "name" => return Ok(self.name.clone()),
                "version" => return Ok(self.version.clone()),
                "prefix" => self.prefix.clone(),
                "bin" => self.prefix.join("bin"),
                "lib" => self.prefix.join("lib"),
                "share" => self.prefix.join("share"),
                "include" => self.prefix.join("include"),
                "home" => self.home.clone(),
                "desktop" => self.desktop.clone(),
                "std_cmake_args" => {
                    return Err(OrreryError::Template {
                        input: input.to_string(),
                        reason: "{std_cmake_args} must be a whole argument".to_string(),
                    })
                }
                _ => return Err(unknown(key, input)),
            },
        };
        Ok(path.display().to_string())
    }

    pub fn expand(&self, input: &str) -> Result<String> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let end = after.find('}').ok_or_else(|| OrreryError::Template {
                input: input.to_string(),
                reason: "unterminated placeholder".to_string(),
            })?;
            out.push_str(&self.lookup(&after[..end], input)?);
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    pub fn expand_path(&self, input: &str) -> Result<PathBuf> {
        self.expand(input).map(PathBuf::from)
    }

    /// Expands a command line; a standalone `{std_cmake_args}` becomes several arguments.
    pub fn expand_args(&self, args: &[String]) -> Result<Vec<String>> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            if arg == STD_CMAKE_ARGS {
                out.extend(std_cmake_args(&self.prefix));
            } else {
                out.push(self.expand(arg)?);
            }
        }
        Ok(out)
    }
}

fn unknown(key: &str, input: &str) -> OrreryError {
    OrreryError::Template {
        input: input.to_string(),
        reason: format!("unknown placeholder {{{key}}}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> TemplateContext {
        let mut opt = HashMap::new();
        opt.insert("qt".to_string(), PathBuf::from("/host/qt@5"));
        opt.insert("indi-lib".to_string(), PathBuf::from("/r/opt/indi-lib"));
        TemplateContext {
            name: "kstars".to_string(),
            version: "3.7.9".to_string(),
            prefix: PathBuf::from("/r/Cellar/kstars/3.7.9"),
            home: PathBuf::from("/home/astro"),
            desktop: PathBuf::from("/home/astro/Desktop"),
            opt_prefixes: opt,
            opt_dir: PathBuf::from("/r/opt"),
        }
    }

    #[test]
    fn expands_prefix_paths_and_dependency_prefixes() {
        let c = ctx();
        assert_eq!(
            c.expand("-DCMAKE_INSTALL_BUNDLEDIR={bin}").unwrap(),
            "-DCMAKE_INSTALL_BUNDLEDIR=/r/Cellar/kstars/3.7.9/bin"
        );
        assert_eq!(
            c.expand("-DQt5_DIR={opt:qt}/lib/cmake/Qt5").unwrap(),
            "-DQt5_DIR=/host/qt@5/lib/cmake/Qt5"
        );
        assert_eq!(
            c.expand("{opt_bin:yourusername/kstars/indi-lib}/indi*").unwrap(),
            "/r/opt/indi-lib/bin/indi*"
        );
        assert_eq!(
            c.expand("{desktop}/KStars-{version}.dmg").unwrap(),
            "/home/astro/Desktop/KStars-3.7.9.dmg"
        );
        assert_eq!(c.expand("no placeholders").unwrap(), "no placeholders");
    }

    #[test]
    fn unresolved_dependency_prefix_is_an_error() {
        let opt = tempfile::tempdir().unwrap();
        let mut c = ctx();
        c.opt_dir = opt.path().to_path_buf();

        let err = c.expand("-DQt5_DIR={opt:wcslib}/lib/cmake").unwrap_err();
        match err {
            OrreryError::Template { reason, .. } => assert!(reason.contains("wcslib"), "{reason}"),
            other => panic!("unexpected error {other:?}"),
        }

        std::fs::create_dir_all(opt.path().join("wcslib")).unwrap();
        assert_eq!(
            c.expand("{opt_lib:wcslib}").unwrap(),
            opt.path().join("wcslib/lib").display().to_string()
        );
    }

    #[test]
    fn unknown_or_broken_placeholders_fail() {
        let c = ctx();
        assert!(matches!(
            c.expand("{nope}"),
            Err(OrreryError::Template { .. })
        ));
        assert!(matches!(
            c.expand("{opt_etc:qt}"),
            Err(OrreryError::Template { .. })
        ));
        assert!(c.expand("{bin").is_err());
        assert!(c.expand("x{std_cmake_args}").is_err());
    }

    #[test]
    fn std_cmake_args_splice_into_command_line() {
        let c = ctx();
        let args: Vec<String> = ["cmake", "{std_cmake_args}", "-DBUILD_TESTING=OFF"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let expanded = c.expand_args(&args).unwrap();
        assert_eq!(expanded.len(), 8);
        assert_eq!(expanded[0], "cmake");
        assert_eq!(
            expanded[1],
            "-DCMAKE_INSTALL_PREFIX=/r/Cellar/kstars/3.7.9"
        );
        assert!(expanded.contains(&"-DCMAKE_BUILD_TYPE=Release".to_string()));
        assert_eq!(expanded[7], "-DBUILD_TESTING=OFF");
    }
}
