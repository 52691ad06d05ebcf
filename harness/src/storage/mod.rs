//! Persisted deployment state

pub mod properties;
