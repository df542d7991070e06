//! HTTP handlers

pub mod benchmarks;
pub mod chat;
pub mod health;
pub mod models;
pub mod stats;
pub mod ws;

pub use benchmarks::*;
pub use chat::chat;
pub use health::health;
pub use models::*;
pub use stats::*;
pub use ws::ws_dashboard;
