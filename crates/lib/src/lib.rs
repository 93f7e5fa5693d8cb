//! shipwright-lib: release pipeline for front-end applications
//!
//! This crate provides the pieces of a release:
//! - `Version`: dotted versions with a carry increment
//! - `metadata`: version propagation into manifest, package and env files
//! - `build` / `archive`: running the build and zipping its output
//! - `delivery`: sharing the archive over Slack
//! - `pipeline`: the ordered release run tying them together

pub mod archive;
pub mod build;
pub mod config;
pub mod confirm;
pub mod consts;
pub mod delivery;
pub mod environment;
pub mod git;
pub mod metadata;
pub mod pipeline;
pub mod version;
