#![allow(clippy::new_without_default)]
pub mod app;
pub mod assets;
pub mod camera;
pub mod config;
pub mod fur;
pub mod gfx;
pub mod input;
pub mod material;
pub mod mesh;
pub mod noise;
pub mod scene;

use std::path::PathBuf;
use thiserror::Error;

pub use glam as math;

pub type Result<T = (), E = Box<dyn std::error::Error>> = std::result::Result<T, E>;

/// Failure to bring an external resource (mesh, texture, config) into the core.
#[derive(Debug, Error)]
pub enum LoadError {
  #[error("could not read '{}': {source}", path.display())]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("could not parse mesh: {0}")]
  Obj(#[from] obj::ObjError),
  #[error("could not decode image: {0}")]
  Image(#[from] image::ImageError),
  #[error("malformed geometry: {0}")]
  Geometry(String),
  #[error("could not parse config '{}': {source}", path.display())]
  Config {
    path: PathBuf,
    source: serde_json::Error,
  },
}
