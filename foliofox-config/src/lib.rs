//! Typed configuration for the FolioFox acquisition pipeline.
//!
//! [`models`] holds plain, already-validated config structs; [`loader`]
//! assembles one from defaults, an optional file, and the environment.

pub mod loader;
pub mod models;

pub use loader::{ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use models::Config;
