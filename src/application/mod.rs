//! Application layer: the post operations, their guard, and the services around them.

pub mod auth;
pub mod context;
pub mod csrf;
pub mod error;
pub mod pagination;
pub mod posts;
pub mod repos;
