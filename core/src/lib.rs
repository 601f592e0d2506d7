pub mod benchmarks;
pub mod calculator;
pub mod chat;
pub mod engine;
pub mod error;
pub mod models;
pub mod snapshot;
pub mod tool;
pub mod value;
