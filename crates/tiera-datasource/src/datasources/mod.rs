//! Builtin datasource implementations.
//!
//! Each datasource is a self-contained module exposing `ID` and
//! `descriptor()`. To add one: create the file, add `pub mod <name>;` here,
//! and register it in create_default_registry() in ../lib.rs.

pub mod file;
pub mod memory;
