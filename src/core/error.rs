//! Error handling for stackctl
//!
//! The error system is built around two types:
//! - [`StackctlError`] - strongly-typed variants for every failure mode the
//!   orchestrator can hit, usable for precise matching in code
//! - [`ErrorContext`] - a display wrapper that adds an actionable suggestion
//!   for CLI users
//!
//! # Failure classes
//!
//! - **Configuration**: [`StackctlError::UnknownResolver`],
//!   [`StackctlError::StackConfigParse`], [`StackctlError::InvalidResolverArgument`] -
//!   reported at load/extraction time, before anything is launched.
//! - **Resolution**: [`StackctlError::MissingEnvironmentVariable`],
//!   [`StackctlError::ResolutionIo`], [`StackctlError::OutputNotFound`],
//!   [`StackctlError::StackNotFound`] - fatal to the owning stack only; its
//!   transitive dependents are skipped while independent stacks continue.
//! - **Graph**: [`StackctlError::CircularDependency`] - fatal to the whole
//!   request, nothing launches because no valid order exists.
//!
//! The core never retries and never substitutes defaults for a failed
//! resolution; a failure is terminal for that attempt and surfaces in the
//! execution report.

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for stackctl operations.
#[derive(Error, Debug)]
pub enum StackctlError {
    /// A config node was tagged with a resolver name that has no registered
    /// factory. Detected during extraction, before execution begins.
    #[error("unknown resolver '!{name}' in stack '{stack}'")]
    UnknownResolver {
        /// The unrecognized tag, without the leading `!`.
        name: String,
        /// Identity of the stack whose config uses the tag.
        stack: String,
    },

    /// An `environment_variable` resolver named a variable that is not set.
    ///
    /// Policy: an unset variable is an error, never an empty string, so that
    /// a typo in a variable name cannot silently deploy a blank value.
    #[error("environment variable '{name}' is not set")]
    MissingEnvironmentVariable {
        /// Name of the missing variable.
        name: String,
    },

    /// I/O failure while resolving a `file`/`file_contents` argument:
    /// missing local file, unreadable bytes, network error, or a non-2xx
    /// response from a remote URL.
    #[error("failed to read '{source_path}': {reason}")]
    ResolutionIo {
        /// The path or URL that could not be read.
        source_path: String,
        /// Underlying cause, already rendered.
        reason: String,
    },

    /// A `stack_output` / `stack_output_external` resolver named an output
    /// that does not exist on the deployed stack.
    #[error("stack '{stack}' has no output named '{output}'")]
    OutputNotFound {
        /// The stack that was queried.
        stack: String,
        /// The missing output name.
        output: String,
    },

    /// A stack reference could not be matched: either a `stack_output`
    /// argument names no stack configured in this project, or an external
    /// stack does not exist on the control plane.
    #[error("stack '{stack}' not found")]
    StackNotFound {
        /// The unmatched stack reference.
        stack: String,
    },

    /// The dependency graph contains a cycle, so no launch order exists.
    ///
    /// The cycle path is ordered and closes on its first element; a
    /// self-referencing stack reports as a cycle of length 1.
    #[error("circular dependency: {}", cycle.join(" -> "))]
    CircularDependency {
        /// Ordered stack identities forming the cycle, first repeated last.
        cycle: Vec<String>,
    },

    /// A resolver argument did not match the grammar the variant expects
    /// (e.g. a `stack_output` argument without `::`).
    #[error("invalid argument for resolver '{resolver}': {reason}")]
    InvalidResolverArgument {
        /// Resolver name as registered.
        resolver: String,
        /// What was wrong with the argument.
        reason: String,
    },

    /// A stack config file failed to parse or validate.
    #[error("failed to parse stack config '{path}': {reason}")]
    StackConfigParse {
        /// Project-relative path of the offending file.
        path: String,
        /// Parse or validation failure detail.
        reason: String,
    },

    /// A requested execution target names no configured stack.
    #[error("target '{name}' does not match any configured stack")]
    TargetNotFound {
        /// The unmatched target.
        name: String,
    },

    /// The scheduler found non-terminal stacks but no admissible batch.
    /// Cannot occur on a graph that passed cycle detection; reported rather
    /// than looping forever if the invariant is ever broken.
    #[error("scheduler deadlock: {remaining} stacks cannot be admitted")]
    SchedulerDeadlock {
        /// Number of stacks left in a non-terminal state.
        remaining: usize,
    },

    /// Standard I/O error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error from [`serde_yaml`].
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error from [`serde_json`].
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A generic error with a custom message.
    #[error("{0}")]
    Other(String),
}

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StackctlError>;

/// Error wrapper that carries a user-facing suggestion alongside the error.
///
/// Library code returns [`StackctlError`] (or `anyhow::Error` at
/// orchestration seams); `main` converts the failure into an `ErrorContext`
/// for display.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error.
    pub error: anyhow::Error,
    /// Actionable suggestion for resolving the error.
    pub suggestion: Option<String>,
}

impl ErrorContext {
    /// Wrap an error without a suggestion.
    pub fn new(error: impl Into<anyhow::Error>) -> Self {
        Self { error: error.into(), suggestion: None }
    }

    /// Attach a suggestion shown beneath the error message.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Print the error (and suggestion, if any) to stderr with color.
    pub fn display(&self) {
        eprintln!("{} {}", "error:".red().bold(), self.error);
        for cause in self.error.chain().skip(1) {
            eprintln!("  {} {}", "caused by:".yellow(), cause);
        }
        if let Some(suggestion) = &self.suggestion {
            eprintln!("\n{} {}", "hint:".cyan().bold(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nhint: {suggestion}")?;
        }
        Ok(())
    }
}

/// Convert any error into a user-friendly [`ErrorContext`], attaching a
/// suggestion keyed off the concrete [`StackctlError`] variant when one is
/// found in the chain.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let suggestion = error.downcast_ref::<StackctlError>().and_then(|err| match err {
        StackctlError::UnknownResolver { name, .. } => Some(format!(
            "register a resolver named '{name}' at startup, or fix the tag in the stack config"
        )),
        StackctlError::MissingEnvironmentVariable { name } => {
            Some(format!("export {name}=<value> before running stackctl"))
        }
        StackctlError::CircularDependency { .. } => Some(
            "remove one of the dependencies in the reported cycle; a stack cannot \
             (transitively) depend on its own outputs"
                .to_string(),
        ),
        StackctlError::TargetNotFound { .. } => Some(
            "targets are project-relative config paths with the .yaml suffix optional, \
             e.g. 'network/vpc'"
                .to_string(),
        ),
        _ => None,
    });

    ErrorContext { error, suggestion }
}
