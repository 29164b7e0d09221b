// Client Infrastructure Layer

pub mod config;
pub mod services;

pub use config::ClientConfig;
pub use services::{HttpJobService, WsScanTransport};
