//! Asset reachability verification.
//!
//! This crate checks that the artefacts declared by a build manifest and an
//! import map are actually served once a static output tree exists. It starts
//! a short-lived loopback HTTP server over the tree, probes every declared
//! path, and records the results in an [`assetcheck_common::Summary`].
//!
//! # Modules
//!
//! - [`cli`] - Command-line argument definitions
//! - [`config`] - Environment settings, site layout, and run configuration
//! - [`error`] - Error taxonomy for the verification engine
//! - [`manifest`] - Manifest and import map ingestion
//! - [`orchestrator`] - Sequencing of one verification run
//! - [`port`] - Port selection with contention fallback
//! - [`probe`] - HTTP reachability probes
//! - [`report`] - Summary document output
//! - [`server`] - Ephemeral static file server

pub mod cli;
pub mod config;
pub mod error;
pub mod manifest;
pub mod orchestrator;
pub mod port;
pub mod probe;
pub mod report;
pub mod server;
