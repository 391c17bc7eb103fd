//! View models and askama templates for server-rendered pages.

pub mod views;
