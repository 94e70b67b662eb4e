//! depcache - verifiable dependency tree cache
//!
//! Stores the dependency tree installed from a manifest as an immutable,
//! content-addressed cache entry, shares entries through a remote cache
//! repository and verifies them against fresh hermetic installs.

pub mod audit;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod installer;
pub mod project;
pub mod store;
pub mod ui;

pub use error::{DepcacheError, DepcacheResult};
