//! esker-lib: Core types and logic for Esker
//!
//! This crate turns a directory of package manifests into an executable
//! build plan:
//! - `sandbox`: crawls manifests into an immutable `BuildSpec` graph
//! - `id`: content-addressed build identities
//! - `task`: folds the graph into `BuildTask`s with composed environments
//!   and rendered commands
//! - `store`: the padded, relocatable store path scheme
//! - `config`: maps specs to source, build, stage and install locations

pub mod config;
pub mod consts;
pub mod env;
pub mod expr;
pub mod id;
pub mod manifest;
pub mod platform;
pub mod sandbox;
pub mod store;
pub mod task;
