//! Scriptable connector for scheduler and resolver tests.
//!
//! Records every launch/teardown with enough detail to assert ordering,
//! batch concurrency and the outputs-after-completion invariant. Exposed
//! behind the `test-utils` feature so integration tests can use it.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::core::{Result, StackctlError};
use crate::stack::{Stack, StackId};

use super::{CloudConnector, ResolvedStack};

/// In-memory [`CloudConnector`] with scripted outcomes.
///
/// - `outputs_on_complete` seeds the outputs a stack exposes once its
///   launch succeeds; fetching outputs of a stack that has not completed
///   fails, which makes scheduler ordering violations visible in tests.
/// - `fail_on` scripts launch failures.
/// - `launches()` returns the admitted order; `max_in_flight()` the peak
///   number of concurrent launches observed.
#[derive(Debug, Default)]
pub struct MockConnector {
    outputs_on_complete: Mutex<HashMap<StackId, BTreeMap<String, String>>>,
    external_outputs: Mutex<HashMap<String, BTreeMap<String, String>>>,
    fail_on: Mutex<HashSet<StackId>>,
    completed: Mutex<HashSet<StackId>>,
    launches: Mutex<Vec<StackId>>,
    teardowns: Mutex<Vec<StackId>>,
    resolved: Mutex<HashMap<StackId, ResolvedStack>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    launch_delay: Option<Duration>,
}

impl MockConnector {
    /// Empty connector: every launch succeeds, no outputs anywhere.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a per-launch delay so overlapping launches actually overlap.
    #[must_use]
    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = Some(delay);
        self
    }

    /// Seed the outputs `stack` will expose after completing.
    pub fn set_outputs<I, K, V>(&self, stack: &str, outputs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = outputs.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.outputs_on_complete.lock().unwrap().insert(StackId::new(stack), map);
    }

    /// Seed outputs for an externally-named stack.
    pub fn set_external_outputs<I, K, V>(&self, name: &str, outputs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = outputs.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.external_outputs.lock().unwrap().insert(name.to_string(), map);
    }

    /// Mark `stack` complete without launching it, for resolver tests that
    /// bypass the scheduler.
    pub fn mark_complete(&self, stack: &str) {
        self.completed.lock().unwrap().insert(StackId::new(stack));
    }

    /// Script a launch failure for `stack`.
    pub fn fail_on(&self, stack: &str) {
        self.fail_on.lock().unwrap().insert(StackId::new(stack));
    }

    /// Stacks in the order their launches were admitted.
    pub fn launches(&self) -> Vec<StackId> {
        self.launches.lock().unwrap().clone()
    }

    /// Stacks in the order their teardowns were admitted.
    pub fn teardowns(&self) -> Vec<StackId> {
        self.teardowns.lock().unwrap().clone()
    }

    /// Peak number of concurrently in-flight launches.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// The resolved stack handed to `launch` for `stack`, if it launched.
    pub fn resolved_for(&self, stack: &str) -> Option<ResolvedStack> {
        self.resolved.lock().unwrap().get(&StackId::new(stack)).cloned()
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CloudConnector for MockConnector {
    async fn fetch_stack_outputs(&self, stack: &StackId) -> Result<BTreeMap<String, String>> {
        // A fetch before completion means the scheduler broke its ordering
        // guarantee; fail loudly so the test catches it.
        if !self.completed.lock().unwrap().contains(stack) {
            return Err(StackctlError::StackNotFound { stack: format!("{stack} (not complete)") });
        }
        Ok(self.outputs_on_complete.lock().unwrap().get(stack).cloned().unwrap_or_default())
    }

    async fn fetch_external_outputs(
        &self,
        stack_name: &str,
        _profile: Option<&str>,
    ) -> Result<BTreeMap<String, String>> {
        self.external_outputs
            .lock()
            .unwrap()
            .get(stack_name)
            .cloned()
            .ok_or_else(|| StackctlError::StackNotFound { stack: stack_name.to_string() })
    }

    async fn launch(&self, stack: &Stack, resolved: ResolvedStack) -> Result<()> {
        self.launches.lock().unwrap().push(stack.id.clone());
        self.resolved.lock().unwrap().insert(stack.id.clone(), resolved);
        self.enter();
        if let Some(delay) = self.launch_delay {
            tokio::time::sleep(delay).await;
        }
        self.exit();

        if self.fail_on.lock().unwrap().contains(&stack.id) {
            return Err(StackctlError::Other(format!("scripted launch failure for '{}'", stack.id)));
        }
        self.completed.lock().unwrap().insert(stack.id.clone());
        Ok(())
    }

    async fn teardown(&self, stack: &Stack) -> Result<()> {
        self.teardowns.lock().unwrap().push(stack.id.clone());
        self.enter();
        if let Some(delay) = self.launch_delay {
            tokio::time::sleep(delay).await;
        }
        self.exit();

        if self.fail_on.lock().unwrap().contains(&stack.id) {
            return Err(StackctlError::Other(format!(
                "scripted teardown failure for '{}'",
                stack.id
            )));
        }
        self.completed.lock().unwrap().remove(&stack.id);
        Ok(())
    }
}
