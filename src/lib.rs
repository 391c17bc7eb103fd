//! Quill: a small authenticated blog rendered on the server.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
