//! Credentials for the provider API

pub mod vault;
