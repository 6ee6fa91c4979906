//! Core types shared across the orchestrator.
//!
//! This module hosts the crate-wide error taxonomy and re-exports the types
//! the rest of the crate uses constantly: [`StackctlError`], the crate
//! [`Result`] alias, and the user-facing error display helpers.

pub mod error;

pub use error::{ErrorContext, Result, StackctlError, user_friendly_error};
