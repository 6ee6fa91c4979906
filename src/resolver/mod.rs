//! Resolver abstraction: deferred computation of configuration values.
//!
//! A resolver is a plugin-provided strategy that computes a config value at
//! resolution time rather than load time. Config authors invoke one with a
//! YAML tag:
//!
//! ```yaml
//! parameters:
//!   DbPassword: !environment_variable DB_PASSWORD
//!   VpcId: !stack_output network/vpc.yaml::VpcId
//!   Allowlist: !file config/allowlist.json
//! ```
//!
//! During extraction every tagged node is replaced by a [`PendingValue`]
//! carrying a constructed-but-unresolved [`Resolver`]. Nothing is evaluated
//! until the scheduler launches the owning stack, at which point each
//! pending value is resolved exactly once - so a `stack_output` resolver
//! only ever runs after its dependency has completed.
//!
//! Variants are plain trait implementations registered by name in the
//! [`ResolverRegistry`]; third parties add their own through
//! [`PluginDiscovery`] at process start. Only `stack_output` declares an
//! implicit dependency (via [`Resolver::implicit_dependency`]) - argument
//! shapes are resolver-specific, so dependency inference is deliberately
//! variant-aware rather than generic.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::connector::CloudConnector;
use crate::core::{Result, StackctlError};
use crate::stack::{Stack, StackId};

pub mod environment;
pub mod extract;
pub mod file;
pub mod registry;
pub mod stack_output;

pub use extract::{DependencyEdge, EdgeOrigin, ExtractedStack, extract};
pub use registry::{PluginDiscovery, ResolverFactory, ResolverRegistry};

/// Everything a resolver may read while doing its work.
///
/// Cloned once per constructed resolver; cheap because the heavy members
/// are shared behind `Arc`.
#[derive(Clone)]
pub struct ResolutionContext {
    /// The stack whose config contains the invocation.
    pub stack: Arc<Stack>,
    /// Root of the project; local `file` paths are read relative to it.
    pub project_root: PathBuf,
    /// Handle to the external control plane.
    pub connector: Arc<dyn CloudConnector>,
    /// Identities of every stack configured in the project, for validating
    /// `stack_output` references at extraction time.
    pub known_stacks: Arc<BTreeSet<StackId>>,
}

impl fmt::Debug for ResolutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionContext")
            .field("stack", &self.stack.id)
            .field("project_root", &self.project_root)
            .field("known_stacks", &self.known_stacks.len())
            .finish_non_exhaustive()
    }
}

/// A unit of deferred computation.
///
/// Instances are constructed fresh per extraction from
/// `(argument, context)` by a registered factory, hold no mutable state,
/// and are resolved at most once per use. Freshness of the underlying
/// source (an env var mutated between reads, say) is not guarded.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// The registered name this resolver was created under.
    fn name(&self) -> &str;

    /// Compute the value. Suspension points are remote file fetches and
    /// control-plane output reads.
    async fn resolve(&self) -> Result<serde_yaml::Value>;

    /// The stack this resolver's argument references, if the variant
    /// implies a build-order dependency. Only `stack_output` returns
    /// `Some`; external references never order the build.
    fn implicit_dependency(&self) -> Option<StackId> {
        None
    }
}

/// A config tree node whose value is not yet known: the explicit "pending"
/// state distinct from resolved literals.
#[derive(Clone)]
pub struct PendingValue(Arc<dyn Resolver>);

impl PendingValue {
    /// Wrap a constructed resolver.
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self(resolver)
    }

    /// Evaluate the underlying resolver.
    pub async fn resolve(&self) -> Result<serde_yaml::Value> {
        self.0.resolve().await
    }

    /// See [`Resolver::implicit_dependency`].
    pub fn implicit_dependency(&self) -> Option<StackId> {
        self.0.implicit_dependency()
    }

    /// Name the resolver was registered under.
    pub fn resolver_name(&self) -> &str {
        self.0.name()
    }
}

impl fmt::Debug for PendingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PendingValue(!{})", self.0.name())
    }
}

/// A stack config tree after extraction: literals untouched, every tagged
/// node replaced by a pending resolver. Resolution walks the tree and
/// evaluates each pending node exactly once.
#[derive(Debug, Clone)]
pub enum ConfigValue {
    /// A plain value, known at load time.
    Literal(serde_yaml::Value),
    /// A deferred value awaiting resolution.
    Pending(PendingValue),
    /// Mapping with possibly-pending values (key order preserved).
    Mapping(Vec<(serde_yaml::Value, ConfigValue)>),
    /// Sequence with possibly-pending elements.
    Sequence(Vec<ConfigValue>),
}

impl ConfigValue {
    /// Resolve the whole tree into a plain YAML value, evaluating every
    /// pending node once. Fails on the first resolution error.
    pub fn resolve(&self) -> BoxFuture<'_, Result<serde_yaml::Value>> {
        Box::pin(async move {
            match self {
                Self::Literal(value) => Ok(value.clone()),
                Self::Pending(pending) => pending.resolve().await,
                Self::Mapping(entries) => {
                    let mut mapping = serde_yaml::Mapping::with_capacity(entries.len());
                    for (key, value) in entries {
                        mapping.insert(key.clone(), value.resolve().await?);
                    }
                    Ok(serde_yaml::Value::Mapping(mapping))
                }
                Self::Sequence(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(item.resolve().await?);
                    }
                    Ok(serde_yaml::Value::Sequence(out))
                }
            }
        })
    }

    /// Whether any node in the tree is still pending.
    pub fn has_pending(&self) -> bool {
        match self {
            Self::Literal(_) => false,
            Self::Pending(_) => true,
            Self::Mapping(entries) => entries.iter().any(|(_, v)| v.has_pending()),
            Self::Sequence(items) => items.iter().any(ConfigValue::has_pending),
        }
    }
}

/// Require a plain string argument, the grammar every built-in resolver
/// uses. Third-party resolvers are free to accept mappings or sequences.
pub(crate) fn expect_string_argument(resolver: &str, argument: &serde_yaml::Value) -> Result<String> {
    match argument {
        serde_yaml::Value::String(s) => Ok(s.clone()),
        other => Err(StackctlError::InvalidResolverArgument {
            resolver: resolver.to_string(),
            reason: format!("expected a string, got {}", value_kind(other)),
        }),
    }
}


fn value_kind(value: &serde_yaml::Value) -> &'static str {
    match value {
        serde_yaml::Value::Null => "null",
        serde_yaml::Value::Bool(_) => "a boolean",
        serde_yaml::Value::Number(_) => "a number",
        serde_yaml::Value::String(_) => "a string",
        serde_yaml::Value::Sequence(_) => "a sequence",
        serde_yaml::Value::Mapping(_) => "a mapping",
        serde_yaml::Value::Tagged(_) => "a tagged value",
    }
}
