//! Routing kernel for OpenTolk.
//!
//! - [`matcher`] -- Keyword and regex triggers, and the [`Match`] a route
//!   produces.
//! - [`classifier`] -- Language-model intent classification.
//! - [`router`] -- The three-phase [`Router`].
//! - [`error`] -- Kernel error types.

pub mod classifier;
pub mod error;
pub mod matcher;
pub mod router;

pub use classifier::IntentClassifier;
pub use error::{KernelError, Result};
pub use matcher::{Match, TriggerMatcher};
pub use router::Router;
