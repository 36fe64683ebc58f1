//! Core functionality for converting images to WebP.
//!
//! This library provides the foundational components for safe conversion:
//! - Path containment against a set of allowed root directories
//! - Single-file conversion with optional removal of the source
//! - Non-recursive directory expansion
//! - Batch conversion where one item's failure never affects the others
//! - Tool descriptors for exposing the above over a request/response protocol

use log::{info, warn};
use std::path::Path;
use std::sync::Arc;

// -- Public Re-exports --
pub use config::*;
pub use error::{Error, Result};
pub use types::*;

pub use batch::BatchCoordinator;
pub use codec::{ImageCodec, WebpCodec};
pub use conversion::ConversionEngine;
pub use discovery::{list_images, Expansion};
pub use safety::PathGuard;
pub use tools::{Tool, ToolRegistry};

// -- Public Modules --
pub mod batch;
pub mod codec;
pub mod config;
pub mod conversion;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod safety;
pub mod tools;
pub mod types;

/// Main entry point wiring configuration, guard, engine and tools together
pub struct WebpConverter {
    config: Config,
    coordinator: Arc<BatchCoordinator>,
}

impl WebpConverter {
    /// Create a converter from the provided configuration
    pub fn new(config: Config) -> Self {
        let guard = PathGuard::new(&config.allowed_roots);
        if guard.is_unrestricted() {
            warn!("No allowed directories configured: every path is permitted");
        } else {
            for root in guard.roots() {
                info!("Allowed directory: {}", root.display());
            }
        }

        let coordinator =
            BatchCoordinator::new(ConversionEngine::new(guard)).with_workers(config.workers);

        Self {
            config,
            coordinator: Arc::new(coordinator),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn guard(&self) -> &PathGuard {
        self.coordinator.engine().guard()
    }

    /// Convert a single image
    pub fn convert<P: AsRef<Path>>(&self, path: P, options: ConversionOptions) -> ConversionResult {
        self.coordinator
            .engine()
            .convert(&ConversionRequest::new(path, options))
    }

    /// Convert files and directories
    pub fn convert_batch<P: AsRef<Path>>(
        &self,
        paths: &[P],
        options: ConversionOptions,
    ) -> BatchResult {
        self.coordinator.run(paths, options)
    }

    /// Convert an inline base64 image to `output_path`
    pub fn convert_base64<P: AsRef<Path>>(
        &self,
        payload: &str,
        output_path: P,
        quality: u8,
        lossless: bool,
    ) -> ConversionResult {
        self.coordinator
            .engine()
            .convert_base64(payload, output_path, quality, lossless)
    }

    /// Tool registry exposing this converter, with configured defaults
    pub fn tools(&self) -> ToolRegistry {
        ToolRegistry::with_conversion_tools(self.coordinator.clone(), self.config.default_options())
    }
}
