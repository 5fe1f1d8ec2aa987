pub mod chat;
pub mod config;
pub mod forecast;
pub mod readings;
pub mod service;
pub mod session;
pub mod telemetry;
pub mod upload;
