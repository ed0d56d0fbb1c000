//! Repository modules: one per aggregate, all implemented on
//! [`crate::service::OpsService`].

pub mod audit;
pub mod project;
pub mod role;
pub mod task;
pub mod user;
