//! Deployment lifecycle

pub mod handle;
pub mod lifecycle;
pub mod pipeline;
pub mod provision;
pub mod shutdown;
pub mod upgrade;
pub mod waiter;
