// Client configuration

pub mod client_config;

pub use client_config::ClientConfig;
