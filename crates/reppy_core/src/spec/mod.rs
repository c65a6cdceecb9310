//! Specification algebra.
//!
//! # Responsibility
//! - Define criteria (`key operator value`) and their validation.
//! - Compose criteria into flat sets or boolean trees.
//! - Hand composition to store adapters through `PredicateBuilder`.

pub mod criterion;
pub mod predicate;
pub mod specification;
