pub mod adapters;
pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod web;

pub use config::Config;
pub use error::DashboardError;
