//! Cloud connector seam.
//!
//! The orchestrator never talks to a control plane directly; everything
//! cloud-shaped goes through the [`CloudConnector`] trait. The core hands a
//! fully resolved stack to [`CloudConnector::launch`] and reads deployed
//! outputs back through [`CloudConnector::fetch_stack_outputs`]. Retry
//! policy, credentials and wire formats all live behind this trait.
//!
//! Two implementations ship with the crate: [`DryRunConnector`] for local
//! use (logs instead of deploying), and [`mock::MockConnector`] (behind the
//! `test-utils` feature) which records launch order and scripted failures
//! for scheduler tests.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::core::Result;
use crate::stack::{Stack, StackId};

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

/// A stack with every pending value resolved, ready to hand to the control
/// plane. Produced by the scheduler immediately before launch.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedStack {
    /// Resolved parameter values.
    pub parameters: BTreeMap<String, serde_yaml::Value>,
    /// Resolved user data tree.
    pub user_data: serde_yaml::Value,
    /// Template path from the stack config, forwarded untouched.
    pub template_path: Option<String>,
}

/// External control-plane operations consumed by the core.
///
/// Implementations must be safe to share across concurrent launch tasks;
/// the scheduler wraps the connector in an `Arc` and calls it from every
/// stack in a batch at once.
#[async_trait]
pub trait CloudConnector: Send + Sync {
    /// Fetch the outputs of a stack deployed by this project.
    ///
    /// Only called after the scheduler has observed the stack reach
    /// `Complete`, so implementations may assume the deployment settled.
    async fn fetch_stack_outputs(&self, stack: &StackId) -> Result<BTreeMap<String, String>>;

    /// Fetch the outputs of a stack by its full external name, outside this
    /// project's build graph. `profile` selects an account/region context.
    async fn fetch_external_outputs(
        &self,
        stack_name: &str,
        profile: Option<&str>,
    ) -> Result<BTreeMap<String, String>>;

    /// Create or update a stack. Opaque to the core beyond its outcome.
    async fn launch(&self, stack: &Stack, resolved: ResolvedStack) -> Result<()>;

    /// Delete a stack. Opaque to the core beyond its outcome.
    async fn teardown(&self, stack: &Stack) -> Result<()>;
}

/// Connector that deploys nothing.
///
/// Launches and teardowns are logged and reported as successful. Deployed
/// outputs do not exist, so `fetch_stack_outputs` returns an empty map and
/// any stack consuming a `stack_output` value will fail resolution with
/// `OutputNotFound`.
#[derive(Debug, Default, Clone)]
pub struct DryRunConnector;

#[async_trait]
impl CloudConnector for DryRunConnector {
    async fn fetch_stack_outputs(&self, stack: &StackId) -> Result<BTreeMap<String, String>> {
        tracing::debug!(%stack, "dry-run: no deployed outputs");
        Ok(BTreeMap::new())
    }

    async fn fetch_external_outputs(
        &self,
        stack_name: &str,
        profile: Option<&str>,
    ) -> Result<BTreeMap<String, String>> {
        tracing::debug!(stack_name, ?profile, "dry-run: no external outputs");
        Ok(BTreeMap::new())
    }

    async fn launch(&self, stack: &Stack, resolved: ResolvedStack) -> Result<()> {
        tracing::info!(
            stack = %stack.id,
            external_name = %stack.external_name(),
            parameters = resolved.parameters.len(),
            "dry-run: would launch"
        );
        Ok(())
    }

    async fn teardown(&self, stack: &Stack) -> Result<()> {
        tracing::info!(stack = %stack.id, "dry-run: would tear down");
        Ok(())
    }
}
