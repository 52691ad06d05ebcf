//! Cloud deployments API models
//!
//! Request and response bodies for the deployment endpoints of the cloud
//! provider API. Fields the harness never touches are kept in `extra` maps
//! so a fetched plan can be submitted back without losing data.

pub mod models;

pub use models::deployment::*;
pub use models::plan::*;
pub use models::resource::*;
