//! Dependency extraction: walk a stack's config trees, construct resolvers,
//! collect dependency edges.
//!
//! The walk covers `parameters` and `sceptre_user_data`. Every tagged node
//! becomes a constructed-but-unresolved resolver (a [`ConfigValue::Pending`]
//! leaf); the extractor looks only at the tag boundary and passes the
//! argument through untouched, whatever its shape. Edges come from two
//! places: the stack's explicitly declared `dependencies`, and any resolver
//! that reports an implicit dependency (in practice, `stack_output`).
//! `stack_output_external` reports none and so contributes no edge.
//!
//! Unknown tags and dangling stack references fail here, before any
//! execution begins.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::{Result, StackctlError};
use crate::stack::{Stack, StackId};

use super::{ConfigValue, PendingValue, ResolutionContext, ResolverRegistry};

/// Where a dependency edge came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EdgeOrigin {
    /// Declared in the stack's `dependencies` list.
    Explicit,
    /// Inferred from a resolver argument.
    Resolver,
}

/// Directed relation: `dependent` must not launch before `dependency`
/// completes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DependencyEdge {
    /// The stack that must wait.
    pub dependent: StackId,
    /// The stack being waited on.
    pub dependency: StackId,
    /// How the edge was discovered.
    pub origin: EdgeOrigin,
}

/// A stack's config trees after extraction, pending resolvers in place.
#[derive(Debug, Clone)]
pub struct ExtractedStack {
    /// Parameter entries in declaration order.
    pub parameters: Vec<(String, ConfigValue)>,
    /// The user-data tree.
    pub user_data: ConfigValue,
}

/// Walk one stack's config, constructing resolvers and collecting edges.
///
/// Edges between the same pair collapse to one; an explicit declaration
/// wins over a resolver-derived duplicate for reporting purposes.
pub fn extract(
    stack: &Arc<Stack>,
    registry: &ResolverRegistry,
    context: &ResolutionContext,
) -> Result<(ExtractedStack, Vec<DependencyEdge>)> {
    // Keyed by target so duplicates collapse regardless of origin.
    let mut edges: BTreeMap<StackId, EdgeOrigin> = BTreeMap::new();

    for dep in stack.declared_dependencies() {
        if !context.known_stacks.contains(&dep) {
            return Err(StackctlError::StackNotFound { stack: dep.to_string() });
        }
        edges.insert(dep, EdgeOrigin::Explicit);
    }

    let mut parameters = Vec::with_capacity(stack.config.parameters.len());
    for (key, value) in &stack.config.parameters {
        let name = match key {
            serde_yaml::Value::String(s) => s.clone(),
            other => serde_yaml::to_string(other).unwrap_or_default().trim_end().to_string(),
        };
        parameters.push((name, walk(value, registry, context, &mut edges)?));
    }

    let user_data = walk(&stack.config.sceptre_user_data, registry, context, &mut edges)?;

    let edges = edges
        .into_iter()
        .map(|(dependency, origin)| DependencyEdge {
            dependent: stack.id.clone(),
            dependency,
            origin,
        })
        .collect();

    Ok((ExtractedStack { parameters, user_data }, edges))
}

fn walk(
    value: &serde_yaml::Value,
    registry: &ResolverRegistry,
    context: &ResolutionContext,
    edges: &mut BTreeMap<StackId, EdgeOrigin>,
) -> Result<ConfigValue> {
    match value {
        serde_yaml::Value::Tagged(tagged) => {
            let name = tag_name(&tagged.tag);
            let resolver = registry.create(&name, tagged.value.clone(), context.clone())?;
            if let Some(dependency) = resolver.implicit_dependency() {
                tracing::debug!(
                    stack = %context.stack.id,
                    dependency = %dependency,
                    resolver = %name,
                    "implicit dependency"
                );
                edges.entry(dependency).or_insert(EdgeOrigin::Resolver);
            }
            Ok(ConfigValue::Pending(PendingValue::new(resolver)))
        }
        serde_yaml::Value::Mapping(mapping) => {
            let mut entries = Vec::with_capacity(mapping.len());
            for (key, value) in mapping {
                entries.push((key.clone(), walk(value, registry, context, edges)?));
            }
            Ok(ConfigValue::Mapping(entries))
        }
        serde_yaml::Value::Sequence(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(walk(item, registry, context, edges)?);
            }
            Ok(ConfigValue::Sequence(out))
        }
        literal => Ok(ConfigValue::Literal(literal.clone())),
    }
}

/// Tag string without the leading `!`.
fn tag_name(tag: &serde_yaml::value::Tag) -> String {
    tag.to_string().trim_start_matches('!').to_string()
}
