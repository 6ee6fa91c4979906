//! Resolver registry: maps tag names to resolver factories.
//!
//! One registry instance is constructed at startup, populated with the
//! built-ins and any discovered plugins, and passed explicitly to the
//! extractor. It is never reached through global state; after construction
//! it is read-only and may be shared across concurrent extractions.

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{Result, StackctlError};

use super::environment::EnvironmentVariableResolver;
use super::file::FileResolver;
use super::stack_output::{ExternalStackOutputResolver, StackOutputResolver};
use super::{ResolutionContext, Resolver};

/// Constructs a resolver from its raw YAML argument and the resolution
/// context of the owning stack.
pub type ResolverFactory =
    Arc<dyn Fn(serde_yaml::Value, ResolutionContext) -> Result<Arc<dyn Resolver>> + Send + Sync>;

/// An enumeration of `(name, factory)` pairs discovered at process start.
///
/// How plugins are packaged is out of scope; anything that can hand the
/// registry a factory qualifies. Discovery runs once, before extraction.
pub trait PluginDiscovery {
    /// The resolvers this source provides.
    fn resolvers(&self) -> Vec<(String, ResolverFactory)>;
}

/// Registry of resolver factories keyed by tag name.
pub struct ResolverRegistry {
    factories: HashMap<String, ResolverFactory>,
}

impl ResolverRegistry {
    /// An empty registry with no resolvers at all.
    pub fn new() -> Self {
        Self { factories: HashMap::new() }
    }

    /// A registry with every built-in resolver installed:
    /// `environment_variable`, `file`, `file_contents` (deprecated alias),
    /// `stack_output`, `stack_output_external`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("environment_variable", Arc::new(EnvironmentVariableResolver::create));
        registry.register("file", Arc::new(FileResolver::create));
        registry.register("file_contents", Arc::new(FileResolver::create_raw));
        registry.register("stack_output", Arc::new(StackOutputResolver::create));
        registry
            .register("stack_output_external", Arc::new(ExternalStackOutputResolver::create));
        registry
    }

    /// Register a factory under `name`. Last registration wins, so plugins
    /// can override built-ins.
    pub fn register(&mut self, name: impl Into<String>, factory: ResolverFactory) {
        let name = name.into();
        if self.factories.insert(name.clone(), factory).is_some() {
            tracing::debug!(resolver = %name, "resolver registration overridden");
        }
    }

    /// Register everything a discovery source provides.
    pub fn extend(&mut self, discovery: &dyn PluginDiscovery) {
        for (name, factory) in discovery.resolvers() {
            self.register(name, factory);
        }
    }

    /// Construct a resolver by name.
    ///
    /// Fails with [`StackctlError::UnknownResolver`] if no factory is
    /// registered under `name`.
    pub fn create(
        &self,
        name: &str,
        argument: serde_yaml::Value,
        context: ResolutionContext,
    ) -> Result<Arc<dyn Resolver>> {
        let factory = self.factories.get(name).ok_or_else(|| StackctlError::UnknownResolver {
            name: name.to_string(),
            stack: context.stack.id.to_string(),
        })?;
        factory(argument, context)
    }

    /// Whether a factory is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted for stable diagnostics.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::test_support::context;
    use async_trait::async_trait;

    struct ConstantResolver(String);

    #[async_trait]
    impl Resolver for ConstantResolver {
        fn name(&self) -> &str {
            "constant"
        }

        async fn resolve(&self) -> crate::core::Result<serde_yaml::Value> {
            Ok(serde_yaml::Value::String(self.0.clone()))
        }
    }

    #[test]
    fn builtins_are_registered() {
        let registry = ResolverRegistry::with_builtins();
        for name in
            ["environment_variable", "file", "file_contents", "stack_output", "stack_output_external"]
        {
            assert!(registry.contains(name), "missing builtin {name}");
        }
    }

    #[test]
    fn unknown_resolver_fails() {
        let registry = ResolverRegistry::with_builtins();
        let err = registry
            .create("nope", serde_yaml::Value::Null, context())
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, StackctlError::UnknownResolver { name, .. } if name == "nope"));
    }

    #[tokio::test]
    async fn last_registration_wins() {
        let mut registry = ResolverRegistry::with_builtins();
        registry.register(
            "file",
            Arc::new(|_, _| Ok(Arc::new(ConstantResolver("override".into())) as Arc<dyn Resolver>)),
        );
        let resolver = registry.create("file", serde_yaml::Value::Null, context()).unwrap();
        assert_eq!(resolver.resolve().await.unwrap(), serde_yaml::Value::String("override".into()));
    }

    #[test]
    fn discovery_populates_registry() {
        struct StaticDiscovery;
        impl PluginDiscovery for StaticDiscovery {
            fn resolvers(&self) -> Vec<(String, ResolverFactory)> {
                vec![(
                    "constant".to_string(),
                    Arc::new(|_, _| {
                        Ok(Arc::new(ConstantResolver("x".into())) as Arc<dyn Resolver>)
                    }),
                )]
            }
        }

        let mut registry = ResolverRegistry::with_builtins();
        registry.extend(&StaticDiscovery);
        assert!(registry.contains("constant"));
    }
}
