//! ESS Harness Library
//!
//! Provisions, upgrades and tears down cloud deployments for stack testing,
//! and migrates their data across major versions.

pub mod app;
pub mod authn;
pub mod cloud;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod migrate;
pub mod storage;
pub mod utils;
