//! HTTP API: thin transport over the generation service.

pub mod app;
pub mod context;
pub mod middleware;
