use std::path::PathBuf;

use clap::ValueEnum;

/// Compute device the pipeline factory should target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Device {
    Cpu,
    Cuda,
    Mps,
}

/// Immutable server configuration, built once from the CLI arguments
/// and threaded through the application state.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub models_dir: PathBuf,
    pub device: Device,
    /// Run at full (f32) precision instead of the f16 default.
    pub full_precision: bool,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
