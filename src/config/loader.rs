// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::{Manifest, RawManifest};
use crate::errors::Result;

/// Load a manifest from a given path and return the raw `RawManifest`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (DAG correctness, name rules, etc.). Use [`load_and_validate`]
/// for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawManifest> {
    let contents = fs::read_to_string(path.as_ref())?;
    load_from_str(&contents)
}

pub fn load_from_str(contents: &str) -> Result<RawManifest> {
    Ok(toml::from_str(contents)?)
}

/// Load a manifest from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks names, pipe references, declared inputs and acyclicity, and
///   converts everything into store records.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Manifest> {
    Manifest::try_from(load_from_path(path)?)
}

