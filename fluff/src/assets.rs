use std::fs;
use std::path::{Path, PathBuf};
use image::RgbaImage;
use log::debug;
use crate::LoadError;
use crate::mesh::{TriangleSoup, Ingestion};

/// Loads meshes and textures relative to an asset directory.
#[derive(Debug, Clone)]
pub struct Assets {
  root: PathBuf,
}

impl Assets {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn fetch(&self, name: &str) -> Result<Vec<u8>, LoadError> {
    let path = self.root.join(name);
    debug!("loading {}", path.display());
    fs::read(&path).map_err(|source| LoadError::Io { path, source })
  }

  pub fn load_mesh(&self, name: &str, ingestion: Ingestion) -> Result<TriangleSoup, LoadError> {
    ingestion.apply(TriangleSoup::from_obj(self.fetch(name)?.as_slice())?)
  }

  pub fn load_texture(&self, name: &str) -> Result<RgbaImage, LoadError> {
    Ok(image::load_from_memory(&self.fetch(name)?)?.to_rgba8())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const TRI: &str = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nvt 1 0\nvt 0 1\nvn 0 0 1\nf 1/1/1 2/2/1 3/3/1\n";

  #[test]
  fn loads_obj_and_png_from_root() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("tri.obj"), TRI).unwrap();
    RgbaImage::from_pixel(2, 2, image::Rgba([9, 8, 7, 255]))
      .save(dir.path().join("skin.png"))
      .unwrap();
    let assets = Assets::new(dir.path());
    let soup = assets.load_mesh("tri.obj", Ingestion::Soup).unwrap();
    assert_eq!(soup.triangle_count(), 1);
    let img = assets.load_texture("skin.png").unwrap();
    assert_eq!(img.get_pixel(1, 1).0, [9, 8, 7, 255]);
  }

  #[test]
  fn missing_file_names_its_path() {
    let dir = tempfile::tempdir().unwrap();
    let err = Assets::new(dir.path()).load_mesh("nope.obj", Ingestion::Soup).unwrap_err();
    match err {
      LoadError::Io { path, .. } => assert!(path.ends_with("nope.obj")),
      e => panic!("unexpected error {e}"),
    }
  }

  #[test]
  fn undecodable_texture_is_an_image_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("bad.png"), b"not a png").unwrap();
    let err = Assets::new(dir.path()).load_texture("bad.png").unwrap_err();
    assert!(matches!(err, LoadError::Image(_)));
  }
}
