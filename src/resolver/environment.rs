//! `environment_variable` resolver: read a process environment variable.

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::{Result, StackctlError};

use super::{ResolutionContext, Resolver, expect_string_argument};

/// Resolves to the value of a process environment variable.
///
/// An unset variable is a hard failure, never an empty string: resolving a
/// mistyped name must not deploy a blank value.
pub struct EnvironmentVariableResolver {
    variable: String,
}

impl EnvironmentVariableResolver {
    /// Factory registered under `environment_variable`.
    pub fn create(
        argument: serde_yaml::Value,
        _context: ResolutionContext,
    ) -> Result<Arc<dyn Resolver>> {
        let variable = expect_string_argument("environment_variable", &argument)?;
        Ok(Arc::new(Self { variable }))
    }
}

#[async_trait]
impl Resolver for EnvironmentVariableResolver {
    fn name(&self) -> &str {
        "environment_variable"
    }

    async fn resolve(&self) -> Result<serde_yaml::Value> {
        match std::env::var(&self.variable) {
            Ok(value) => Ok(serde_yaml::Value::String(value)),
            Err(std::env::VarError::NotPresent) => {
                Err(StackctlError::MissingEnvironmentVariable { name: self.variable.clone() })
            }
            Err(std::env::VarError::NotUnicode(_)) => Err(StackctlError::ResolutionIo {
                source_path: format!("${}", self.variable),
                reason: "value is not valid unicode".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::test_support::context;
    use serial_test::serial;

    fn resolver(var: &str) -> Arc<dyn Resolver> {
        EnvironmentVariableResolver::create(serde_yaml::Value::String(var.to_string()), context())
            .unwrap()
    }

    #[tokio::test]
    #[serial]
    async fn resolves_set_variable_idempotently() {
        // SAFETY: test runs serially, no concurrent env access.
        unsafe { std::env::set_var("STACKCTL_TEST_VAR", "hello") };
        let r = resolver("STACKCTL_TEST_VAR");
        assert_eq!(r.resolve().await.unwrap(), serde_yaml::Value::String("hello".into()));
        // Unchanged environment: same result on a second read.
        assert_eq!(r.resolve().await.unwrap(), serde_yaml::Value::String("hello".into()));
        unsafe { std::env::remove_var("STACKCTL_TEST_VAR") };
    }

    #[tokio::test]
    #[serial]
    async fn unset_variable_fails_both_times() {
        unsafe { std::env::remove_var("STACKCTL_TEST_UNSET") };
        let r = resolver("STACKCTL_TEST_UNSET");
        for _ in 0..2 {
            let err = r.resolve().await.unwrap_err();
            assert!(matches!(
                err,
                StackctlError::MissingEnvironmentVariable { ref name } if name == "STACKCTL_TEST_UNSET"
            ));
        }
    }

    #[test]
    fn non_string_argument_is_rejected() {
        let err = EnvironmentVariableResolver::create(
            serde_yaml::Value::Sequence(vec![]),
            context(),
        )
        .map(|_| ())
        .unwrap_err();
        assert!(matches!(err, StackctlError::InvalidResolverArgument { .. }));
    }
}
