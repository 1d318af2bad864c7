//! # buildr - a C++ build tool that understands named modules
//!
//! buildr scans C++ sources for `export module` / `import` declarations,
//! orders them so every interface is precompiled before its importers,
//! compiles on all cores and links a single executable. Every command it
//! runs is recorded in a `compile_commands.json`.
//!
//! ## Quick Start
//!
//! ```bash
//! # buildr.toml
//! # [package]
//! # name = "hello"
//!
//! buildr build
//! buildr run -- --flag
//! ```
//!
//! ## Module Organization
//!
//! - [`build`] - Scanner, module graph, scheduler and executor
//! - [`cache`] - Content fingerprints and the artifact cache
//! - [`config`] - Configuration parsing (`buildr.toml`)
//! - [`deps`] - pkg-config dependency discovery

/// Scanner, module graph, scheduler, executor and command ledger.
pub mod build;

/// Fingerprints and the persisted artifact cache.
pub mod cache;

/// Configuration file parsing (`buildr.toml`).
pub mod config;

/// System dependency discovery.
pub mod deps;

/// Module graph visualization.
pub mod tree;

/// Terminal UI utilities (tables).
pub mod ui;
