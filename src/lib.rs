//! stackctl - declarative infrastructure-deployment orchestrator
//!
//! Users describe infrastructure "stacks" as YAML configuration in which
//! some inputs are not literal values but deferred computations
//! ("resolvers"): read an environment variable, read a local or remote
//! file, or read an output produced by deploying another stack. stackctl
//! discovers the inter-stack dependencies those computations imply, builds
//! a validated dependency graph across the project, and drives deployment
//! so that a stack only launches after everything it depends on has
//! completed - with independent stacks proceeding concurrently.
//!
//! # Architecture
//!
//! Data flows through the crate in one direction:
//!
//! ```text
//! config files -> extractor -> dependency graph -> scheduler -> connector
//!                 (resolvers    (cycle-checked      (batched,
//!                  + edges)      DAG)                concurrent)
//! ```
//!
//! # Core Modules
//!
//! - [`config`] - project loading, stack configs, stack-group layering
//! - [`stack`] - stack identity and lifecycle states
//! - [`resolver`] - resolver trait, registry, built-in variants, extraction
//! - [`graph`] - dependency graph construction and cycle detection
//! - [`scheduler`] - batched concurrent execution with failure propagation
//! - [`connector`] - the cloud control-plane seam (trait + dry-run + mock)
//! - [`orchestrator`] - the facade front ends drive
//! - [`core`] - error taxonomy and user-facing error display
//! - [`cli`] - command-line interface
//!
//! # Configuration Format
//!
//! ```yaml
//! # config/application.yaml
//! template_path: templates/application.yaml
//! dependencies:
//!   - security/iam.yaml
//! parameters:
//!   VpcId: !stack_output network/vpc.yaml::VpcId
//!   DbPassword: !environment_variable DB_PASSWORD
//! sceptre_user_data:
//!   allowlist: !file config/allowlist.json
//!   zone: !stack_output_external shared-dns::ZoneId prod-profile
//! ```
//!
//! `!stack_output` references become build-order dependencies
//! automatically; `!stack_output_external` reads cross-project outputs
//! without ordering the build. Resolvers are evaluated lazily, immediately
//! before the owning stack launches, never at config-load time.
//!
//! # Extending
//!
//! Third-party resolvers implement [`resolver::Resolver`] and register a
//! factory by name (last registration wins, so built-ins can be
//! overridden):
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stackctl::resolver::{Resolver, ResolverRegistry};
//!
//! # struct MyResolver;
//! # #[async_trait::async_trait]
//! # impl Resolver for MyResolver {
//! #     fn name(&self) -> &str { "vault_secret" }
//! #     async fn resolve(&self) -> stackctl::core::Result<serde_yaml::Value> {
//! #         Ok(serde_yaml::Value::Null)
//! #     }
//! # }
//! let mut registry = ResolverRegistry::with_builtins();
//! registry.register("vault_secret", Arc::new(|_arg, _ctx| Ok(Arc::new(MyResolver) as _)));
//! ```
//!
//! Cloud API calls never happen in this crate: everything control-plane
//! shaped goes through [`connector::CloudConnector`], and embedding
//! programs supply the real implementation.

pub mod cli;
pub mod config;
pub mod connector;
pub mod core;
pub mod graph;
pub mod orchestrator;
pub mod resolver;
pub mod scheduler;
pub mod stack;
