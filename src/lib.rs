#![doc = include_str!("../README.md")]

mod app;
pub mod config;
pub mod error;
pub mod export;
pub mod generator;
pub mod instrument;
pub mod memory;
#[cfg(unix)]
mod profile;
pub mod proto;
pub mod registry;
pub mod server;
pub mod text;

pub use app::run;
pub use config::{Cardinality, Config};
pub use error::{Error, Result};
pub use export::{Exporter, ExporterBuilder, Protocol};
pub use generator::Generator;
pub use registry::Registry;
