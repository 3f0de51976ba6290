use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use glam::Vec3;
use log::info;
use serde::{Serialize, Deserialize};
use crate::LoadError;
use crate::camera::CameraConfig;
use crate::fur::FurParams;
use crate::material::Material;
use crate::mesh::Ingestion;
use crate::scene::LightSource;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub window: WindowConfig,
  pub fur: FurParams,
  pub camera: CameraConfig,
  pub light: LightSource,
  pub wind_velocity: f32,
  pub assets: PathBuf,
  pub meshes: Vec<MeshConfig>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      window: WindowConfig::default(),
      fur: FurParams::default(),
      camera: CameraConfig::default(),
      light: LightSource::default(),
      wind_velocity: 1.0,
      assets: "assets".into(),
      meshes: vec![MeshConfig::default()],
    }
  }
}

impl Config {
  /// Reads a JSON config. A missing file is not an error and gives the defaults.
  pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
    let path = path.as_ref();
    match fs::read_to_string(path) {
      Ok(text) => Self::parse(&text).map_err(|source| LoadError::Config {
        path: path.to_path_buf(),
        source,
      }),
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        info!("no config at {}, using defaults", path.display());
        Ok(Self::default())
      }
      Err(source) => Err(LoadError::Io {
        path: path.to_path_buf(),
        source,
      }),
    }
  }

  pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
    serde_json::from_str(text)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
  pub title: String,
  pub width: u32,
  pub height: u32,
  pub clear_color: [f64; 4],
}

impl Default for WindowConfig {
  fn default() -> Self {
    Self {
      title: "Fur".into(),
      width: 1024,
      height: 768,
      clear_color: [0.1, 0.1, 0.1, 1.0],
    }
  }
}

/// Where a mesh's triangles come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshSource {
  Obj(String),
  Sphere { radius: f32, segments: u32, rings: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
  pub name: String,
  pub source: MeshSource,
  pub ingestion: Ingestion,
  pub skin: Option<String>,
  pub hair_map: Option<String>,
  pub material: Material,
}

impl Default for MeshConfig {
  fn default() -> Self {
    Self {
      name: "sphere".into(),
      source: MeshSource::Sphere {
        radius: 1.0,
        segments: 64,
        rings: 32,
      },
      ingestion: Ingestion::Soup,
      skin: None,
      hair_map: None,
      material: Material::default().color(Vec3::new(0.6, 0.45, 0.3)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::noise::NoiseKind;

  #[test]
  fn missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(dir.path().join("fur.json")).unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.fur.layer_count, 16);
    assert_eq!(config.camera.zoom, 4.0);
  }

  #[test]
  fn partial_sections_keep_other_defaults() {
    let config = Config::parse(
      r#"{
        "fur": { "layer_count": 32, "noise_kind": "worley" },
        "wind_velocity": 2.0,
        "meshes": [
          { "name": "cat", "source": { "obj": "cat.obj" }, "hair_map": "cat_hair.png",
            "material": { "fur_pattern_scale": 12.0 } }
        ]
      }"#,
    )
    .unwrap();
    assert_eq!(config.fur.layer_count, 32);
    assert_eq!(config.fur.noise_kind, NoiseKind::Worley);
    assert_eq!(config.fur.fur_length, 0.2);
    assert_eq!(config.wind_velocity, 2.0);
    assert_eq!(config.window.title, "Fur");
    let cat = &config.meshes[0];
    assert_eq!(cat.source, MeshSource::Obj("cat.obj".into()));
    assert_eq!(cat.hair_map.as_deref(), Some("cat_hair.png"));
    assert_eq!(cat.skin, None);
    assert_eq!(cat.material.fur_pattern_scale, 12.0);
    assert_eq!(cat.material.specularity, 25.0);
  }

  #[test]
  fn malformed_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fur.json");
    fs::write(&path, "{ \"fur\": 3 }").unwrap();
    assert!(matches!(Config::load(&path), Err(LoadError::Config { .. })));
  }
}
