//! Stack identity and lifecycle.
//!
//! A [`Stack`] is one deployable unit of infrastructure: its identity within
//! the project, its parsed configuration, and the stack-group settings in
//! effect for it. Stacks are immutable once loaded; the mutable lifecycle
//! state ([`StackStatus`]) is owned by the scheduler, which is the only
//! component allowed to transition it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{StackConfig, StackGroupConfig};

/// Identity of a stack within a project.
///
/// This is the project-relative config path with the `.yaml`/`.yml` suffix
/// stripped, so `network/vpc.yaml` and `network/vpc` name the same stack.
/// Config authors conventionally write the suffix in `!stack_output`
/// arguments; normalizing here keeps identity comparison in one place.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StackId(String);

impl StackId {
    /// Normalize a stack reference into an identity.
    pub fn new(reference: impl AsRef<str>) -> Self {
        let reference = reference.as_ref().trim().replace('\\', "/");
        let stripped = reference
            .strip_suffix(".yaml")
            .or_else(|| reference.strip_suffix(".yml"))
            .unwrap_or(&reference);
        Self(stripped.trim_matches('/').to_string())
    }

    /// The normalized identity string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a stack within one orchestrator invocation.
///
/// ```text
/// Pending -> Queued -> Launching -> { Complete | Failed }
///               \-> Skipped   (an ancestor failed or was skipped)
/// ```
///
/// `Complete`, `Failed` and `Skipped` are terminal. All transitions are
/// applied by the scheduler's control loop; launch tasks only report their
/// outcome back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StackStatus {
    /// Not yet eligible: at least one dependency is not terminal.
    Pending,
    /// Admitted to a batch; waiting for a launch slot.
    Queued,
    /// Handed to the cloud connector; resolution and launch in flight.
    Launching,
    /// The connector reported success. Outputs are now readable.
    Complete,
    /// The connector (or a resolution inside the launch) reported failure.
    Failed,
    /// Never admitted because an ancestor failed or was skipped.
    Skipped,
}

impl StackStatus {
    /// Whether this state admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Queued => "QUEUED",
            Self::Launching => "LAUNCHING",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
            Self::Skipped => "SKIPPED",
        };
        f.write_str(s)
    }
}

/// A deployable unit of infrastructure.
///
/// One instance exists per configured stack, owned by the project for the
/// lifetime of an invocation. Derived artifacts (graph, plan, extracted
/// config trees) reference stacks by [`StackId`].
#[derive(Debug, Clone)]
pub struct Stack {
    /// Identity within the project.
    pub id: StackId,
    /// Parsed per-stack configuration.
    pub config: StackConfig,
    /// Stack-group settings in effect for this stack's directory.
    pub group: StackGroupConfig,
}

impl Stack {
    /// Explicit dependencies declared in the stack's own config,
    /// normalized to identities.
    pub fn declared_dependencies(&self) -> Vec<StackId> {
        self.config.dependencies.iter().map(StackId::new).collect()
    }

    /// The full name this stack carries on the external control plane.
    ///
    /// An explicit `stack_name` in config wins; otherwise the name is
    /// derived from the project code and the identity path.
    pub fn external_name(&self) -> String {
        if let Some(name) = &self.config.stack_name {
            return name.clone();
        }
        match &self.group.project_code {
            Some(code) => format!("{}-{}", code, self.id.as_str().replace('/', "-")),
            None => self.id.as_str().replace('/', "-"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_strips_config_suffix() {
        assert_eq!(StackId::new("network/vpc.yaml"), StackId::new("network/vpc"));
        assert_eq!(StackId::new("network/vpc.yml").as_str(), "network/vpc");
        assert_eq!(StackId::new("vpc").as_str(), "vpc");
    }

    #[test]
    fn id_normalizes_separators() {
        assert_eq!(StackId::new("network\\vpc.yaml").as_str(), "network/vpc");
        assert_eq!(StackId::new("/network/vpc/").as_str(), "network/vpc");
    }

    #[test]
    fn terminal_states() {
        assert!(StackStatus::Complete.is_terminal());
        assert!(StackStatus::Failed.is_terminal());
        assert!(StackStatus::Skipped.is_terminal());
        assert!(!StackStatus::Pending.is_terminal());
        assert!(!StackStatus::Queued.is_terminal());
        assert!(!StackStatus::Launching.is_terminal());
    }

    #[test]
    fn external_name_prefers_override() {
        let stack = Stack {
            id: StackId::new("network/vpc"),
            config: StackConfig {
                stack_name: Some("legacy-vpc".into()),
                ..StackConfig::default()
            },
            group: StackGroupConfig {
                project_code: Some("acme".into()),
                ..StackGroupConfig::default()
            },
        };
        assert_eq!(stack.external_name(), "legacy-vpc");
    }

    #[test]
    fn external_name_derived_from_project_code() {
        let stack = Stack {
            id: StackId::new("network/vpc"),
            config: StackConfig::default(),
            group: StackGroupConfig {
                project_code: Some("acme".into()),
                ..StackGroupConfig::default()
            },
        };
        assert_eq!(stack.external_name(), "acme-network-vpc");
    }
}
