pub mod shell;

use std::rc::Rc;
use glam::Vec2;
use log::{debug, info};
use serde::{Serialize, Deserialize};
use crate::gfx::{self, Gpu, Draw, Pass, Streams, Uniforms, SkinConst, TextureId, Filter};
use crate::material::Material;
use crate::mesh::TriangleSoup;
use crate::noise::{self, NoiseField, NoiseKind};
use crate::scene::FrameParams;

pub use shell::{FurShell, ShellParams, shell_offset, rotation_scale_factor, bend_rotation};

/// Fur coat settings shared by every shell of a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FurParams {
  pub layer_count: u32,
  pub fur_length: f32,
  pub length_variation: f32,
  pub noise_sample_scale: f32,
  pub noise_kind: NoiseKind,
  /// Edge length of the synthesized noise texture, in texels.
  pub noise_resolution: u32,
  /// Noise-space distance between neighbouring texels.
  pub noise_scale: f64,
}

impl Default for FurParams {
  fn default() -> Self {
    Self {
      layer_count: 16,
      fur_length: 0.2,
      length_variation: 0.5,
      noise_sample_scale: 1.0,
      noise_kind: NoiseKind::Simplex,
      noise_resolution: 512,
      noise_scale: 1.0 / 32.0,
    }
  }
}

/// A base mesh plus its stack of fur shells. Owns every GPU resource it
/// created and gives them back in `release`.
#[derive(Debug)]
pub struct FurMesh {
  name: String,
  geometry: Rc<TriangleSoup>,
  streams: Streams,
  material: Material,
  params: FurParams,
  shells: Vec<FurShell>,
  noise_texture: Option<TextureId>,
  noise_stale: bool,
  skin_texture: Option<TextureId>,
  hair_map: Option<TextureId>,
  screen_coord_movement: Vec2,
  current_time: f32,
  shall_render: bool,
}

impl FurMesh {
  pub fn new(
    gpu: &mut dyn Gpu,
    name: impl Into<String>,
    geometry: TriangleSoup,
    material: Material,
    params: FurParams,
  ) -> Self {
    let geometry = Rc::new(geometry);
    let streams = Streams::upload(gpu, &geometry);
    let mut mesh = Self {
      name: name.into(),
      geometry,
      streams,
      material,
      params,
      shells: vec![],
      noise_texture: None,
      noise_stale: true,
      skin_texture: None,
      hair_map: None,
      screen_coord_movement: Vec2::ZERO,
      current_time: 0.0,
      shall_render: true,
    };
    mesh.synthesize_noise(gpu);
    mesh.create_fur_layers(gpu);
    mesh
  }

  /// Replaces the shell stack with `layer_count` fresh shells in ascending
  /// offset order.
  pub fn create_fur_layers(&mut self, gpu: &mut dyn Gpu) {
    for shell in self.shells.drain(..) {
      shell.release(gpu);
    }
    let params = self.shell_params();
    let count = self.params.layer_count;
    self.shells = (0..count)
      .map(|i| FurShell::new(gpu, self.geometry.clone(), i, count, params))
      .collect();
    info!(
      "created {} fur layers for '{}' (length {})",
      count, self.name, self.params.fur_length
    );
  }

  /// Advances the animation clock and pushes the current parameters into
  /// every shell.
  pub fn update_fur(&mut self, gpu: &mut dyn Gpu, dt: f32) {
    self.current_time += dt;
    if self.noise_stale {
      self.synthesize_noise(gpu);
    }
    self.sync_shells();
  }

  pub fn render(&mut self, gpu: &mut dyn Gpu, frame: &FrameParams) {
    self.sync_shells();
    self.streams.rewrite(gpu, &self.geometry);
    gpu.draw(Draw {
      pass: Pass::Skin,
      streams: self.streams,
      vertex_count: self.geometry.len() as u32,
      uniforms: Uniforms::Skin(self.skin_uniforms(frame)),
      textures: [self.skin_texture, None],
    });
    for shell in &self.shells {
      shell.render(gpu, frame);
    }
  }

  pub fn skin_uniforms(&self, frame: &FrameParams) -> SkinConst {
    let t = frame.transforms;
    let m = &self.material;
    SkinConst {
      mvp: t.mvp,
      mv: t.mv,
      m: t.m,
      v: t.v,
      normal: t.normal,
      light_pos: t.mv_light * frame.light.position.extend(1.0),
      camera_pos: frame.camera_pos.extend(1.0),
      light_color: frame.light.color,
      color: m.color.extend(1.0),
      ambient: m.ambient.extend(1.0),
      diffuse: m.diffuse.extend(1.0),
      specular: m.specular.extend(1.0),
      light_power: frame.light.power,
      transparency: m.transparency,
      specularity: m.specularity,
      shininess: m.shininess,
    }
  }

  pub fn shell_params(&self) -> ShellParams {
    ShellParams {
      fur_length: self.params.fur_length,
      length_variation: self.params.length_variation,
      noise_sample_scale: self.params.noise_sample_scale,
      pattern_scale: self.material.fur_pattern_scale,
      noise_kind: self.params.noise_kind,
      color: self.material.fur_color,
      screen_coord_movement: self.screen_coord_movement,
      current_time: self.current_time,
      noise_texture: self.noise_texture,
      hair_map: self.hair_map,
    }
  }

  fn sync_shells(&mut self) {
    let params = self.shell_params();
    for shell in &mut self.shells {
      shell.sync(&params);
    }
  }

  fn synthesize_noise(&mut self, gpu: &mut dyn Gpu) {
    let field = NoiseField::new(self.params.noise_kind);
    let img = noise::synthesize(&field, self.params.noise_resolution, self.params.noise_scale);
    let tex = gfx::upload_image(gpu, &img, Filter::Linear, false);
    if let Some(old) = self.noise_texture.replace(tex) {
      gpu.release_texture(old);
    }
    self.noise_stale = false;
    info!(
      "synthesized {0}x{0} {1:?} noise for '{2}'",
      self.params.noise_resolution, self.params.noise_kind, self.name
    );
  }

  pub fn release(self, gpu: &mut dyn Gpu) {
    debug!("releasing '{}'", self.name);
    self.streams.release(gpu);
    for shell in self.shells {
      shell.release(gpu);
    }
    for tex in [self.noise_texture, self.skin_texture, self.hair_map]
      .into_iter()
      .flatten()
    {
      gpu.release_texture(tex);
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn geometry(&self) -> &TriangleSoup {
    &self.geometry
  }

  pub fn streams(&self) -> Streams {
    self.streams
  }

  pub fn shells(&self) -> &[FurShell] {
    &self.shells
  }

  pub fn params(&self) -> &FurParams {
    &self.params
  }

  pub fn material(&self) -> &Material {
    &self.material
  }

  pub fn material_mut(&mut self) -> &mut Material {
    &mut self.material
  }

  pub fn shall_render(&self) -> bool {
    self.shall_render
  }

  pub fn set_shall_render(&mut self, shall_render: bool) {
    self.shall_render = shall_render;
  }

  pub fn current_time(&self) -> f32 {
    self.current_time
  }

  pub fn set_current_time(&mut self, time: f32) {
    self.current_time = time;
  }

  pub fn screen_coord_movement(&self) -> Vec2 {
    self.screen_coord_movement
  }

  pub fn set_screen_coord_movement(&mut self, movement: Vec2) {
    self.screen_coord_movement = movement;
  }

  pub fn layer_count(&self) -> u32 {
    self.params.layer_count
  }

  pub fn set_layer_count(&mut self, gpu: &mut dyn Gpu, layer_count: u32) {
    if layer_count != self.params.layer_count {
      self.params.layer_count = layer_count;
      self.create_fur_layers(gpu);
    }
  }

  pub fn fur_length(&self) -> f32 {
    self.params.fur_length
  }

  pub fn set_fur_length(&mut self, fur_length: f32) {
    self.params.fur_length = fur_length;
  }

  pub fn length_variation(&self) -> f32 {
    self.params.length_variation
  }

  pub fn set_length_variation(&mut self, variation: f32) {
    self.params.length_variation = variation;
  }

  pub fn noise_sample_scale(&self) -> f32 {
    self.params.noise_sample_scale
  }

  pub fn set_noise_sample_scale(&mut self, scale: f32) {
    self.params.noise_sample_scale = scale;
  }

  pub fn noise_kind(&self) -> NoiseKind {
    self.params.noise_kind
  }

  /// Takes effect on the next `update_fur`, which re-synthesizes the texture.
  pub fn set_noise_kind(&mut self, kind: NoiseKind) {
    if kind != self.params.noise_kind {
      self.params.noise_kind = kind;
      self.noise_stale = true;
    }
  }

  pub fn set_noise_resolution(&mut self, resolution: u32) {
    if resolution != self.params.noise_resolution {
      self.params.noise_resolution = resolution;
      self.noise_stale = true;
    }
  }

  pub fn noise_texture(&self) -> Option<TextureId> {
    self.noise_texture
  }

  pub fn skin_texture(&self) -> Option<TextureId> {
    self.skin_texture
  }

  pub fn set_skin_texture(&mut self, gpu: &mut dyn Gpu, tex: Option<TextureId>) {
    if let Some(old) = std::mem::replace(&mut self.skin_texture, tex) {
      gpu.release_texture(old);
    }
  }

  pub fn hair_map(&self) -> Option<TextureId> {
    self.hair_map
  }

  pub fn set_hair_map(&mut self, gpu: &mut dyn Gpu, tex: Option<TextureId>) {
    if let Some(old) = std::mem::replace(&mut self.hair_map, tex) {
      gpu.release_texture(old);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use glam::Vec3;
  use crate::gfx::Recorder;
  use crate::scene::{Transforms, LightSource};

  fn params(layer_count: u32) -> FurParams {
    FurParams {
      layer_count,
      noise_resolution: 8,
      ..Default::default()
    }
  }

  fn mesh(gpu: &mut Recorder, layer_count: u32) -> FurMesh {
    FurMesh::new(
      gpu,
      "ball",
      TriangleSoup::sphere(1.0, 6, 4),
      Material::default(),
      params(layer_count),
    )
  }

  fn draw(mesh: &mut FurMesh, gpu: &mut Recorder) -> Vec<Draw> {
    let transforms = Transforms::identity();
    let light = LightSource::default();
    let frame = FrameParams {
      transforms: &transforms,
      light: &light,
      wind_velocity: 1.0,
      camera_pos: Vec3::Z,
    };
    mesh.render(gpu, &frame);
    gpu.take_draws()
  }

  #[test]
  fn shells_are_spaced_evenly_up_to_fur_length() {
    let mut gpu = Recorder::new();
    let mesh = mesh(&mut gpu, 4);
    let offsets: Vec<_> = mesh.shells().iter().map(|s| s.offset()).collect();
    for (got, want) in offsets.iter().zip([0.05, 0.10, 0.15, 0.20]) {
      assert!((got - want).abs() < 1e-6);
    }
    assert_eq!(offsets.len(), 4);
    // base streams plus three per shell, and the noise texture
    assert_eq!(gpu.live_buffers(), 3 * 5);
    assert_eq!(gpu.live_textures(), 1);
  }

  #[test]
  fn skin_is_drawn_before_shells_in_offset_order() {
    let mut gpu = Recorder::new();
    let mut mesh = mesh(&mut gpu, 3);
    let draws = draw(&mut mesh, &mut gpu);
    assert_eq!(draws.len(), 4);
    assert_eq!(draws[0].pass, Pass::Skin);
    let offsets: Vec<f32> = draws[1..]
      .iter()
      .map(|d| match d.uniforms {
        Uniforms::Shell(c) => c.offset,
        Uniforms::Skin(_) => panic!("skin drawn among shells"),
      })
      .collect();
    assert!(offsets.windows(2).all(|w| w[0] < w[1]));
  }

  #[test]
  fn zero_layers_draws_only_skin() {
    let mut gpu = Recorder::new();
    let mut mesh = mesh(&mut gpu, 0);
    assert!(mesh.shells().is_empty());
    let draws = draw(&mut mesh, &mut gpu);
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].pass, Pass::Skin);
  }

  #[test]
  fn parameter_changes_reach_shells_on_update() {
    let mut gpu = Recorder::new();
    let mut mesh = mesh(&mut gpu, 2);
    mesh.set_fur_length(1.0);
    mesh.set_length_variation(0.25);
    mesh.set_screen_coord_movement(Vec2::new(4.0, 0.0));
    mesh.material_mut().fur_color = Vec3::X;
    mesh.update_fur(&mut gpu, 0.5);
    mesh.update_fur(&mut gpu, 0.25);
    let tip = &mesh.shells()[1];
    assert!((tip.offset() - 1.0).abs() < 1e-6);
    assert_eq!(tip.params().length_variation, 0.25);
    assert_eq!(tip.params().color, Vec3::X);
    assert_eq!(tip.params().current_time, 0.75);
    assert_eq!(tip.params().screen_coord_movement, Vec2::new(4.0, 0.0));
  }

  #[test]
  fn layer_count_change_rebuilds_and_frees_shells() {
    let mut gpu = Recorder::new();
    let mut mesh = mesh(&mut gpu, 8);
    mesh.set_layer_count(&mut gpu, 2);
    assert_eq!(mesh.shells().len(), 2);
    assert_eq!(gpu.live_buffers(), 3 * 3);
    assert!((mesh.shells()[0].offset() - 0.1).abs() < 1e-6);
  }

  #[test]
  fn noise_kind_change_resynthesizes_on_update() {
    let mut gpu = Recorder::new();
    let mut mesh = mesh(&mut gpu, 1);
    let before = mesh.noise_texture();
    mesh.set_noise_kind(NoiseKind::Worley);
    assert_eq!(mesh.noise_texture(), before);
    mesh.update_fur(&mut gpu, 0.0);
    assert_ne!(mesh.noise_texture(), before);
    assert_eq!(gpu.live_textures(), 1);
    assert_eq!(mesh.shells()[0].params().noise_texture, mesh.noise_texture());
    assert_eq!(mesh.shells()[0].params().noise_kind, NoiseKind::Worley);
  }

  #[test]
  fn zero_noise_resolution_uploads_one_texel() {
    let mut gpu = Recorder::new();
    let mut mesh = mesh(&mut gpu, 1);
    mesh.set_noise_resolution(0);
    mesh.update_fur(&mut gpu, 0.0);
    let tex = mesh.noise_texture().unwrap();
    let (desc, pixels) = gpu.texture(tex).unwrap();
    assert_eq!((desc.width, desc.height), (1, 1));
    assert_eq!(pixels.len(), 4);
  }

  #[test]
  fn skin_draw_carries_material() {
    let mut gpu = Recorder::new();
    let mut mesh = mesh(&mut gpu, 1);
    mesh.material_mut().specularity = 8.0;
    let draws = draw(&mut mesh, &mut gpu);
    let Uniforms::Skin(c) = draws[0].uniforms else {
      panic!("first draw is not the skin");
    };
    assert_eq!(c.specularity, 8.0);
    assert_eq!(c.ambient, Vec3::splat(0.3).extend(1.0));
    assert_eq!(c.light_pos, LightSource::default().position.extend(1.0));
    assert_eq!(draws[0].textures, [None, None]);
  }

  #[test]
  fn release_frees_everything() {
    let mut gpu = Recorder::new();
    let mut mesh = mesh(&mut gpu, 5);
    let hair = gpu.create_texture(
      &[255; 4],
      gfx::TextureDesc {
        width: 1,
        height: 1,
        filter: Filter::Nearest,
        srgb: false,
      },
    );
    mesh.set_hair_map(&mut gpu, Some(hair));
    mesh.release(&mut gpu);
    assert_eq!(gpu.live_buffers(), 0);
    assert_eq!(gpu.live_textures(), 0);
  }
}
