pub mod api;
pub mod auth;
pub mod board;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod observability;
pub mod presence;
pub mod state;
