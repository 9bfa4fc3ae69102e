pub mod collector;
pub mod config;
pub mod conformance;
pub mod deploy;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod plugin;
pub mod poller;
pub mod probe;
pub mod suite;
pub mod types;


pub use error::{Error, Result};
