//! API models

pub mod deployment;
pub mod plan;
pub mod resource;
