//! Project and stack configuration loading.
//!
//! A project is a directory with a `config/` tree. Every `*.yaml` file in
//! that tree (except `config.yaml`) defines one stack; its path relative to
//! `config/` becomes the stack's identity. `config.yaml` files hold
//! stack-group settings that apply to every stack at or below their
//! directory, nearest directory winning per key.
//!
//! ```text
//! project/
//! └── config/
//!     ├── config.yaml          # project_code, profile, region
//!     ├── network/
//!     │   ├── config.yaml      # overrides for network/*
//!     │   └── vpc.yaml         # stack "network/vpc"
//!     └── app.yaml             # stack "app"
//! ```
//!
//! Stack configs are parsed with [`serde_yaml`]; resolver invocations appear
//! as YAML tags (`!environment_variable`, `!stack_output`, ...) and survive
//! parsing as [`serde_yaml::Value::Tagged`] nodes. Nothing is resolved at
//! load time - the extractor replaces tagged nodes with pending resolvers,
//! and values are produced only when the scheduler launches the stack.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::core::{Result, StackctlError};
use crate::stack::{Stack, StackId};

/// Name of the per-directory stack-group config file.
const GROUP_CONFIG_FILE: &str = "config.yaml";

/// Per-stack configuration document.
///
/// `parameters` and `sceptre_user_data` may contain tagged resolver
/// invocations anywhere a scalar, mapping or sequence is allowed; they are
/// kept as raw YAML values until extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackConfig {
    /// Path of the template this stack deploys. Opaque to the core;
    /// forwarded to the cloud connector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_path: Option<String>,

    /// Stack parameters: name -> literal or tagged resolver invocation.
    #[serde(default)]
    pub parameters: serde_yaml::Mapping,

    /// Arbitrarily nested user data; leaves may be tagged resolver
    /// invocations.
    #[serde(default)]
    pub sceptre_user_data: serde_yaml::Value,

    /// Explicitly declared dependencies (stack refs, suffix optional).
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Override for the stack's full name on the external control plane.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_name: Option<String>,

    /// Per-stack profile override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// Per-stack region override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// Stack-group settings layered from `config.yaml` files along the
/// directory chain. Nearest directory wins per key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackGroupConfig {
    /// Project code prefixed onto derived external stack names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_code: Option<String>,

    /// Account/credential profile for stacks in this group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// Region for stacks in this group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl StackGroupConfig {
    /// Layer `child` over `self`: keys set in the child shadow the parent.
    #[must_use]
    pub fn layered_with(&self, child: &Self) -> Self {
        Self {
            project_code: child.project_code.clone().or_else(|| self.project_code.clone()),
            profile: child.profile.clone().or_else(|| self.profile.clone()),
            region: child.region.clone().or_else(|| self.region.clone()),
        }
    }
}

/// A loaded project: the root directory plus every configured stack.
#[derive(Debug, Clone)]
pub struct Project {
    /// Project root (the directory containing `config/`). Local `file`
    /// resolver paths are read relative to this.
    pub root: PathBuf,
    /// All configured stacks, keyed by identity.
    pub stacks: BTreeMap<StackId, Stack>,
}

impl Project {
    /// Load every stack config under `<root>/config`.
    ///
    /// Fails on unreadable files or YAML that does not parse as a stack
    /// config; an empty project (no stack files) is valid.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let config_dir = root.join("config");
        if !config_dir.is_dir() {
            return Err(StackctlError::StackConfigParse {
                path: config_dir.display().to_string(),
                reason: "config directory does not exist".to_string(),
            });
        }

        let mut group_cache: HashMap<PathBuf, StackGroupConfig> = HashMap::new();
        let mut stacks = BTreeMap::new();

        for entry in WalkDir::new(&config_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| StackctlError::StackConfigParse {
                path: config_dir.display().to_string(),
                reason: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
            if !is_yaml || path.file_name().and_then(|n| n.to_str()) == Some(GROUP_CONFIG_FILE) {
                continue;
            }

            let rel = path.strip_prefix(&config_dir).expect("walkdir yields paths under root");
            let id = StackId::new(rel.to_string_lossy());
            let config = Self::parse_stack_config(path, rel)?;
            let group =
                Self::group_for(&config_dir, rel.parent().unwrap_or(Path::new("")), &mut group_cache)?;

            tracing::debug!(stack = %id, path = %rel.display(), "loaded stack config");
            stacks.insert(id.clone(), Stack { id, config, group });
        }

        Ok(Self { root, stacks })
    }

    fn parse_stack_config(path: &Path, rel: &Path) -> Result<StackConfig> {
        let text = std::fs::read_to_string(path).map_err(|e| StackctlError::StackConfigParse {
            path: rel.display().to_string(),
            reason: e.to_string(),
        })?;
        serde_yaml::from_str(&text).map_err(|e| StackctlError::StackConfigParse {
            path: rel.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Layer the `config.yaml` chain from the config root down to `dir`.
    fn group_for(
        config_dir: &Path,
        dir: &Path,
        cache: &mut HashMap<PathBuf, StackGroupConfig>,
    ) -> Result<StackGroupConfig> {
        let mut layered = StackGroupConfig::default();
        let mut chain: Vec<&Path> = dir.ancestors().collect();
        chain.reverse();
        for ancestor in chain {
            let group_path = config_dir.join(ancestor).join(GROUP_CONFIG_FILE);
            if let Some(cached) = cache.get(&group_path) {
                layered = layered.layered_with(cached);
                continue;
            }
            if group_path.is_file() {
                let text = std::fs::read_to_string(&group_path)?;
                let parsed: StackGroupConfig =
                    serde_yaml::from_str(&text).map_err(|e| StackctlError::StackConfigParse {
                        path: group_path.display().to_string(),
                        reason: e.to_string(),
                    })?;
                layered = layered.layered_with(&parsed);
                cache.insert(group_path, parsed);
            }
        }
        Ok(layered)
    }

    /// Look up a stack by any reference form (suffix optional).
    pub fn get(&self, reference: &str) -> Option<&Stack> {
        self.stacks.get(&StackId::new(reference))
    }

    /// Resolve CLI target names to stack identities.
    ///
    /// An empty target list selects every stack in the project.
    pub fn resolve_targets(&self, targets: &[String]) -> Result<Vec<StackId>> {
        if targets.is_empty() {
            return Ok(self.stacks.keys().cloned().collect());
        }
        targets
            .iter()
            .map(|t| {
                let id = StackId::new(t);
                if self.stacks.contains_key(&id) {
                    Ok(id)
                } else {
                    Err(StackctlError::TargetNotFound { name: t.clone() })
                }
            })
            .collect()
    }
}
