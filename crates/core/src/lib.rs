//! # ProcureSense Core
//!
//! Domain types, trait seams, and error definitions shared by the context
//! budgeting engine and the policy critic. This crate performs no I/O and has
//! no framework dependencies.
//!
//! ## Design Philosophy
//!
//! The tier set is closed and statically known, so it is modelled as an enum
//! with a fixed ordinal rather than a dynamic collection. Token estimation is a
//! trait so every component that checks a total can share one counter.

pub mod error;
pub mod payload;
pub mod tier;
pub mod token;

// Re-export key types at crate root for ergonomics
pub use error::{ContextError, PayloadError};
pub use payload::RequestPayload;
pub use tier::Tier;
pub use token::TokenCounter;
