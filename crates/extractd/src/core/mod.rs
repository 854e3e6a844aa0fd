//! Configuration, content sniffing and I/O helpers.

pub mod config;
pub mod io;
pub mod mime;

pub use config::ServiceConfig;
