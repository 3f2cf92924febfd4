// orrery-common/src/dependency/definition.rs
use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct DependencyTag: u8 {
        const RUNTIME     = 0b00000001;
        const BUILD       = 0b00000010;
        const TEST        = 0b00000100;
        const OPTIONAL    = 0b00001000;
        const RECOMMENDED = 0b00010000;
    }
}

impl Default for DependencyTag {
    fn default() -> Self {
        Self::RUNTIME
    }
}

impl DependencyTag {
    /// Parses a single catalog tag name such as `"build"`.
    pub fn from_catalog_tag(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "runtime" => Some(Self::RUNTIME),
            "build" => Some(Self::BUILD),
            "test" => Some(Self::TEST),
            "optional" => Some(Self::OPTIONAL),
            "recommended" => Some(Self::RECOMMENDED),
            _ => None,
        }
    }
}

impl fmt::Display for DependencyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter_names().map(|(name, _)| name).collect();
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("|").to_lowercase())
        }
    }
}

/// Catalog form of a dependency: either `"name"` or `{ name = "...", tags = [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawDependency {
    Name(String),
    Table {
        name: String,
        #[serde(default)]
        tags: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDependency")]
pub struct Dependency {
    pub name: String,
    #[serde(default)]
    pub tags: DependencyTag,
}

impl TryFrom<RawDependency> for Dependency {
    type Error = String;

    fn try_from(raw: RawDependency) -> Result<Self, Self::Error> {
        match raw {
            RawDependency::Name(name) => Ok(Self::new_runtime(name)),
            RawDependency::Table { name, tags } => {
                if tags.is_empty() {
                    return Ok(Self::new_runtime(name));
                }
                let mut parsed = DependencyTag::empty();
                for tag in &tags {
                    parsed |= DependencyTag::from_catalog_tag(tag)
                        .ok_or_else(|| format!("unknown dependency tag '{tag}' on '{name}'"))?;
                }
                Ok(Self::new_with_tags(name, parsed))
            }
        }
    }
}

impl Dependency {
    pub fn new_runtime(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: DependencyTag::RUNTIME,
        }
    }

    pub fn new_with_tags(name: impl Into<String>, tags: DependencyTag) -> Self {
        Self {
            name: name.into(),
            tags,
        }
    }
}
