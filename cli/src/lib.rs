pub mod agent;
pub mod assistant;
pub mod auth;
pub mod commands;
pub mod config;
pub mod error;
pub mod render;
pub mod session;
pub mod sse;
pub mod store;
pub mod util;
