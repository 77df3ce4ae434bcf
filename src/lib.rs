pub mod api;
pub mod auth;
pub mod battle;
pub mod characters;
pub mod config;
pub mod elo;
pub mod error;
pub mod matcher;
pub mod metrics;
pub mod models;
pub mod oracle;
pub mod rate_limit;
pub mod store;
