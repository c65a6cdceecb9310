//! Entity-side data model shared by every store adapter.
//!
//! # Responsibility
//! - Define the dynamic `Value` used by criteria and rows.
//! - Define the static field capability table each entity registers.
//!
//! # Invariants
//! - Stores never inspect entities except through `Entity::fields()`.

pub mod entity;
pub mod value;
