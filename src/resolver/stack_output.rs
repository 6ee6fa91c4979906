//! `stack_output` and `stack_output_external` resolvers.
//!
//! `stack_output` reads an output of another stack in the same project and
//! is the one resolver variant that implies a build-order dependency: the
//! extractor turns its reference into a graph edge, and the scheduler
//! guarantees the resolver only runs after the referenced stack is
//! complete.
//!
//! `stack_output_external` reads an output of a stack deployed outside this
//! project, addressed by its full external name with an optional profile.
//! It creates no edge: the current project neither builds nor orders that
//! stack, and retrieval happens at resolution time.

use async_trait::async_trait;
use std::sync::Arc;

use crate::connector::CloudConnector;
use crate::core::{Result, StackctlError};
use crate::stack::StackId;

use super::{ResolutionContext, Resolver, expect_string_argument};

/// Split `"<ref>::<output>"` on the last `::`.
fn split_output_ref(resolver: &str, argument: &str) -> Result<(String, String)> {
    argument
        .rsplit_once("::")
        .map(|(stack, output)| (stack.to_string(), output.to_string()))
        .filter(|(stack, output)| !stack.is_empty() && !output.is_empty())
        .ok_or_else(|| StackctlError::InvalidResolverArgument {
            resolver: resolver.to_string(),
            reason: format!("expected '<stack>::<output>', got '{argument}'"),
        })
}

/// Resolves to a named output of another stack in this project.
pub struct StackOutputResolver {
    target: StackId,
    output: String,
    connector: Arc<dyn CloudConnector>,
}

impl StackOutputResolver {
    /// Factory registered under `stack_output`.
    ///
    /// The referenced stack must exist in the project; an unknown reference
    /// fails here, at extraction time, before anything launches.
    pub fn create(
        argument: serde_yaml::Value,
        context: ResolutionContext,
    ) -> Result<Arc<dyn Resolver>> {
        let argument = expect_string_argument("stack_output", &argument)?;
        let (stack_ref, output) = split_output_ref("stack_output", &argument)?;
        let target = StackId::new(&stack_ref);
        if !context.known_stacks.contains(&target) {
            return Err(StackctlError::StackNotFound { stack: stack_ref });
        }
        Ok(Arc::new(Self { target, output, connector: context.connector }))
    }
}

#[async_trait]
impl Resolver for StackOutputResolver {
    fn name(&self) -> &str {
        "stack_output"
    }

    async fn resolve(&self) -> Result<serde_yaml::Value> {
        let outputs = self.connector.fetch_stack_outputs(&self.target).await?;
        outputs.get(&self.output).map(|v| serde_yaml::Value::String(v.clone())).ok_or_else(|| {
            StackctlError::OutputNotFound {
                stack: self.target.to_string(),
                output: self.output.clone(),
            }
        })
    }

    fn implicit_dependency(&self) -> Option<StackId> {
        Some(self.target.clone())
    }
}

/// Resolves to a named output of an externally-deployed stack.
pub struct ExternalStackOutputResolver {
    stack_name: String,
    output: String,
    profile: Option<String>,
    connector: Arc<dyn CloudConnector>,
}

impl ExternalStackOutputResolver {
    /// Factory registered under `stack_output_external`.
    ///
    /// Argument grammar: `<full_stack_name>::<output_name> [profile]`.
    pub fn create(
        argument: serde_yaml::Value,
        context: ResolutionContext,
    ) -> Result<Arc<dyn Resolver>> {
        let argument = expect_string_argument("stack_output_external", &argument)?;
        let mut parts = argument.split_whitespace();
        let reference = parts.next().unwrap_or_default();
        let profile = parts.next().map(str::to_string);
        if parts.next().is_some() {
            return Err(StackctlError::InvalidResolverArgument {
                resolver: "stack_output_external".to_string(),
                reason: format!("expected '<name>::<output> [profile]', got '{argument}'"),
            });
        }
        let (stack_name, output) = split_output_ref("stack_output_external", reference)?;
        Ok(Arc::new(Self { stack_name, output, profile, connector: context.connector }))
    }
}

#[async_trait]
impl Resolver for ExternalStackOutputResolver {
    fn name(&self) -> &str {
        "stack_output_external"
    }

    async fn resolve(&self) -> Result<serde_yaml::Value> {
        let outputs = self
            .connector
            .fetch_external_outputs(&self.stack_name, self.profile.as_deref())
            .await?;
        outputs.get(&self.output).map(|v| serde_yaml::Value::String(v.clone())).ok_or_else(|| {
            StackctlError::OutputNotFound {
                stack: self.stack_name.clone(),
                output: self.output.clone(),
            }
        })
    }

    // No implicit_dependency override: external stacks are not ordered by
    // this project's build graph.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::mock::MockConnector;
    use crate::resolver::test_support::context_with;
    use std::path::PathBuf;

    fn arg(s: &str) -> serde_yaml::Value {
        serde_yaml::Value::String(s.to_string())
    }

    #[test]
    fn split_on_last_double_colon() {
        let (stack, output) = split_output_ref("stack_output", "a::b::VpcId").unwrap();
        assert_eq!(stack, "a::b");
        assert_eq!(output, "VpcId");
    }

    #[test]
    fn missing_separator_is_invalid() {
        let err = split_output_ref("stack_output", "no-separator").unwrap_err();
        assert!(matches!(err, StackctlError::InvalidResolverArgument { .. }));
    }

    #[test]
    fn unknown_project_stack_fails_at_creation() {
        let ctx = context_with(Arc::new(MockConnector::new()), &["app"], PathBuf::from("."));
        let err = StackOutputResolver::create(arg("ghost.yaml::Out"), ctx).map(|_| ()).unwrap_err();
        assert!(matches!(err, StackctlError::StackNotFound { ref stack } if stack == "ghost.yaml"));
    }

    #[test]
    fn yaml_suffix_is_stripped_for_identity() {
        let ctx = context_with(
            Arc::new(MockConnector::new()),
            &["app", "network/vpc"],
            PathBuf::from("."),
        );
        let resolver =
            StackOutputResolver::create(arg("network/vpc.yaml::VpcId"), ctx).unwrap();
        assert_eq!(resolver.implicit_dependency(), Some(StackId::new("network/vpc")));
    }

    #[tokio::test]
    async fn resolves_output_of_completed_stack() {
        let connector = Arc::new(MockConnector::new());
        connector.set_outputs("network/vpc", [("VpcId", "vpc-123")]);
        connector.mark_complete("network/vpc");

        let ctx = context_with(connector, &["app", "network/vpc"], PathBuf::from("."));
        let resolver = StackOutputResolver::create(arg("network/vpc::VpcId"), ctx).unwrap();
        assert_eq!(
            resolver.resolve().await.unwrap(),
            serde_yaml::Value::String("vpc-123".into())
        );
    }

    #[tokio::test]
    async fn missing_output_reports_output_not_found() {
        let connector = Arc::new(MockConnector::new());
        connector.set_outputs("network/vpc", [("VpcId", "vpc-123")]);
        connector.mark_complete("network/vpc");

        let ctx = context_with(connector, &["app", "network/vpc"], PathBuf::from("."));
        let resolver = StackOutputResolver::create(arg("network/vpc::Nope"), ctx).unwrap();
        let err = resolver.resolve().await.unwrap_err();
        assert!(matches!(err, StackctlError::OutputNotFound { ref output, .. } if output == "Nope"));
    }

    #[tokio::test]
    async fn external_parses_optional_profile_and_creates_no_edge() {
        let connector = Arc::new(MockConnector::new());
        connector.set_external_outputs("shared-dns", [("ZoneId", "Z123")]);

        let ctx = context_with(connector, &["app"], PathBuf::from("."));
        let resolver = ExternalStackOutputResolver::create(
            arg("shared-dns::ZoneId prod-profile"),
            ctx,
        )
        .unwrap();
        assert_eq!(resolver.implicit_dependency(), None);
        assert_eq!(resolver.resolve().await.unwrap(), serde_yaml::Value::String("Z123".into()));
    }

    #[tokio::test]
    async fn external_unknown_stack_reports_stack_not_found() {
        let ctx =
            context_with(Arc::new(MockConnector::new()), &["app"], PathBuf::from("."));
        let resolver = ExternalStackOutputResolver::create(arg("ghost::Out"), ctx).unwrap();
        let err = resolver.resolve().await.unwrap_err();
        assert!(matches!(err, StackctlError::StackNotFound { ref stack } if stack == "ghost"));
    }
}
