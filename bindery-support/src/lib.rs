//! # Bindery Support
//!
//! Shared helpers for the bindery crates.
//!
//! This crate provides:
//! - Rendering of build chains and type names for error messages
//! - "Did you mean?" suggestions for mistyped binding keys

pub mod rendering;
