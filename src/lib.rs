pub mod error;
pub mod locations;
pub mod manifest;
pub mod paths;

pub use error::{ManifestError, Result};
pub use locations::{Location, LocationError, LocationsSyntaxError, ServerLocations};
pub use manifest::{
    convert, populate_directory_manifests, ConvertOptions, Manifest, ManifestEntry,
};
