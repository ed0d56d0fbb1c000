//! # ops-core
//!
//! Core types, change capture, and authorization policy for Opsboard.
//!
//! This crate provides the foundational types shared across all Opsboard crates:
//! - Entity structs for all domain objects (tasks, projects, users, roles)
//! - Status enums and the closed set of tracked entity kinds
//! - ID prefix constants and formatting helpers
//! - Explicit actor context passed through every layer
//! - Change-set staging with field-level diffing (the pure half of the
//!   persistence session)
//! - Audit capture: pending changes in, audit records out
//! - The pure task authorization policy evaluator

pub mod capture;
pub mod change;
pub mod entities;
pub mod enums;
pub mod errors;
pub mod identity;
pub mod ids;
pub mod policy;
pub mod updates;
