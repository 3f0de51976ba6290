use glam::Vec3;
use serde::{Serialize, Deserialize};

/// Surface parameters of a fur mesh. The base pass uses all of them, the
/// shells only take `fur_color` and `fur_pattern_scale`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
  pub color: Vec3,
  pub ambient: Vec3,
  pub diffuse: Vec3,
  pub specular: Vec3,
  pub transparency: f32,
  pub specularity: f32,
  pub shininess: f32,
  pub fur_color: Vec3,
  pub fur_pattern_scale: f32,
}

impl Default for Material {
  fn default() -> Self {
    Self {
      color: Vec3::ONE,
      ambient: Vec3::splat(0.3),
      diffuse: Vec3::splat(0.8),
      specular: Vec3::ONE,
      transparency: 1.0,
      specularity: 25.0,
      shininess: 0.3,
      fur_color: Vec3::new(0.71, 0.55, 0.34),
      fur_pattern_scale: 40.0,
    }
  }
}

impl Material {
  pub fn color(mut self, color: Vec3) -> Self {
    self.color = color;
    self
  }

  pub fn fur_color(mut self, fur_color: Vec3) -> Self {
    self.fur_color = fur_color;
    self
  }

  pub fn fur_pattern_scale(mut self, scale: f32) -> Self {
    self.fur_pattern_scale = scale;
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_json_keeps_defaults() {
    let m: Material = serde_json::from_str(r#"{ "fur_color": [1.0, 0.0, 0.0] }"#).unwrap();
    assert_eq!(m, Material::default().fur_color(Vec3::X));
    assert_eq!(m.specularity, 25.0);
  }

  #[test]
  fn builders_replace_single_fields() {
    let m = Material::default().color(Vec3::ZERO).fur_pattern_scale(10.0);
    assert_eq!(m.color, Vec3::ZERO);
    assert_eq!(m.fur_pattern_scale, 10.0);
    assert_eq!(m.ambient, Vec3::splat(0.3));
  }
}
