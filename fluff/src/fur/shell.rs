use std::rc::Rc;
use glam::{Vec2, Vec3, Mat4};
use crate::gfx::{Gpu, Draw, Pass, Streams, Uniforms, ShellConst, TextureId};
use crate::mesh::TriangleSoup;
use crate::noise::NoiseKind;
use crate::scene::FrameParams;

const SHELL_AMBIENT: f32 = 0.3;
const SHELL_DIFFUSE: f32 = 0.8;
const ROOT_TRANSPARENCY: f32 = 0.6;
const TIP_TRANSPARENCY: f32 = 0.1;

/// Distance along the normal of shell `index`: `(index + 1) * length / count`.
pub fn shell_offset(index: u32, layer_count: u32, fur_length: f32) -> f32 {
  (index + 1) as f32 * (fur_length / layer_count as f32)
}

/// How strongly shell `index` follows a drag: 0 at the root, 1 at the tip,
/// cubic in between.
pub fn rotation_scale_factor(index: u32, layer_count: u32) -> f32 {
  if layer_count < 2 {
    return 0.0;
  }
  (index as f32 / (layer_count - 1) as f32).powi(3)
}

/// Small rotation bending a shell against a screen-space drag of `movement`
/// pixels (read as degrees), scaled by `factor`.
pub fn bend_rotation(movement: Vec2, factor: f32) -> Mat4 {
  Mat4::from_rotation_y((-movement.x).to_radians() * factor)
    * Mat4::from_rotation_x((-movement.y).to_radians() * factor)
}

/// Per-tick parameters every shell mirrors from its mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShellParams {
  pub fur_length: f32,
  pub length_variation: f32,
  pub noise_sample_scale: f32,
  pub pattern_scale: f32,
  pub noise_kind: NoiseKind,
  pub color: Vec3,
  pub screen_coord_movement: Vec2,
  pub current_time: f32,
  pub noise_texture: Option<TextureId>,
  pub hair_map: Option<TextureId>,
}

/// One offset copy of the base mesh. Displacement along the normal happens in
/// the vertex stage; the shell only supplies its uniforms and streams.
#[derive(Debug)]
pub struct FurShell {
  index: u32,
  layer_count: u32,
  offset: f32,
  params: ShellParams,
  geometry: Rc<TriangleSoup>,
  streams: Streams,
}

impl FurShell {
  pub fn new(
    gpu: &mut dyn Gpu,
    geometry: Rc<TriangleSoup>,
    index: u32,
    layer_count: u32,
    params: ShellParams,
  ) -> Self {
    let streams = Streams::upload(gpu, &geometry);
    Self {
      index,
      layer_count,
      offset: shell_offset(index, layer_count, params.fur_length),
      params,
      geometry,
      streams,
    }
  }

  pub fn index(&self) -> u32 {
    self.index
  }

  pub fn layer_count(&self) -> u32 {
    self.layer_count
  }

  pub fn offset(&self) -> f32 {
    self.offset
  }

  pub fn params(&self) -> &ShellParams {
    &self.params
  }

  pub fn streams(&self) -> Streams {
    self.streams
  }

  /// Takes over the mesh's current parameters, recomputing the offset.
  pub fn sync(&mut self, params: &ShellParams) {
    self.params = *params;
    self.offset = shell_offset(self.index, self.layer_count, params.fur_length);
  }

  pub fn set_fur_length(&mut self, fur_length: f32) {
    self.params.fur_length = fur_length;
    self.offset = shell_offset(self.index, self.layer_count, fur_length);
  }

  pub fn set_screen_coord_movement(&mut self, movement: Vec2) {
    self.params.screen_coord_movement = movement;
  }

  pub fn set_current_time(&mut self, time: f32) {
    self.params.current_time = time;
  }

  pub fn rotation_scale_factor(&self) -> f32 {
    rotation_scale_factor(self.index, self.layer_count)
  }

  pub fn bend_rotation(&self) -> Mat4 {
    bend_rotation(self.params.screen_coord_movement, self.rotation_scale_factor())
  }

  /// Opacity falls off linearly from root to tip.
  pub fn transparency(&self) -> f32 {
    let t = (self.index + 1) as f32 / self.layer_count as f32;
    ROOT_TRANSPARENCY + (TIP_TRANSPARENCY - ROOT_TRANSPARENCY) * t
  }

  pub fn uniforms(&self, frame: &FrameParams) -> ShellConst {
    let bend = self.bend_rotation();
    let t = frame.transforms;
    ShellConst {
      mvp: t.mvp * bend,
      m: t.m * bend,
      v: t.v,
      camera_pos: frame.camera_pos.extend(1.0),
      light_pos: frame.light.position.extend(1.0),
      light_color: frame.light.color,
      color: self.params.color.extend(1.0),
      ambient: Vec3::splat(SHELL_AMBIENT).extend(1.0),
      diffuse: Vec3::splat(SHELL_DIFFUSE).extend(1.0),
      light_power: frame.light.power,
      transparency: self.transparency(),
      offset: self.offset,
      fur_length: self.params.fur_length,
      layer_index: self.index,
      layer_count: self.layer_count,
      length_variation: self.params.length_variation,
      noise_sample_scale: self.params.noise_sample_scale,
      pattern_scale: self.params.pattern_scale,
      current_time: self.params.current_time,
      wind_velocity: frame.wind_velocity,
      noise_kind: self.params.noise_kind.as_uniform(),
    }
  }

  pub fn render(&self, gpu: &mut dyn Gpu, frame: &FrameParams) {
    self.streams.rewrite(gpu, &self.geometry);
    gpu.draw(Draw {
      pass: Pass::Shell,
      streams: self.streams,
      vertex_count: self.geometry.len() as u32,
      uniforms: Uniforms::Shell(self.uniforms(frame)),
      textures: [self.params.noise_texture, self.params.hair_map],
    });
  }

  pub fn release(self, gpu: &mut dyn Gpu) {
    self.streams.release(gpu);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use glam::Vec4;
  use crate::gfx::Recorder;
  use crate::scene::{Transforms, LightSource};

  fn params() -> ShellParams {
    ShellParams {
      fur_length: 0.2,
      length_variation: 0.5,
      noise_sample_scale: 1.0,
      pattern_scale: 40.0,
      noise_kind: NoiseKind::Worley,
      color: Vec3::new(0.71, 0.55, 0.34),
      screen_coord_movement: Vec2::ZERO,
      current_time: 0.0,
      noise_texture: Some(TextureId(7)),
      hair_map: None,
    }
  }

  fn shell(gpu: &mut Recorder, index: u32, count: u32) -> FurShell {
    let geometry = Rc::new(TriangleSoup::sphere(1.0, 6, 4));
    FurShell::new(gpu, geometry, index, count, params())
  }

  #[test]
  fn falloff_spans_root_to_tip() {
    assert_eq!(rotation_scale_factor(0, 8), 0.0);
    assert_eq!(rotation_scale_factor(7, 8), 1.0);
    assert!((rotation_scale_factor(3, 7) - 0.125).abs() < 1e-6);
    assert_eq!(rotation_scale_factor(0, 1), 0.0);
    let factors: Vec<_> = (0..8).map(|i| rotation_scale_factor(i, 8)).collect();
    assert!(factors.windows(2).all(|w| w[0] < w[1]));
  }

  #[test]
  fn root_shell_does_not_bend() {
    let mut gpu = Recorder::new();
    let mut s = shell(&mut gpu, 0, 4);
    s.set_screen_coord_movement(Vec2::new(30.0, -12.0));
    assert_eq!(s.bend_rotation(), Mat4::IDENTITY);
  }

  #[test]
  fn tip_shell_bends_against_the_drag() {
    let mut gpu = Recorder::new();
    let mut s = shell(&mut gpu, 3, 4);
    s.set_screen_coord_movement(Vec2::new(10.0, 0.0));
    // dragging right swings the +z tip towards -x
    let tip = s.bend_rotation().transform_vector3(Vec3::Z);
    assert!(tip.x < 0.0);
    assert!((tip.length() - 1.0).abs() < 1e-6);
    let expected = Mat4::from_rotation_y(-10f32.to_radians());
    assert!(s.bend_rotation().abs_diff_eq(expected, 1e-6));
  }

  #[test]
  fn offset_follows_fur_length() {
    let mut gpu = Recorder::new();
    let mut s = shell(&mut gpu, 1, 4);
    assert!((s.offset() - 0.1).abs() < 1e-6);
    s.set_fur_length(0.4);
    assert!((s.offset() - 0.2).abs() < 1e-6);
    let mut p = params();
    p.fur_length = 1.0;
    s.sync(&p);
    assert!((s.offset() - 0.5).abs() < 1e-6);
  }

  #[test]
  fn transparency_thins_towards_tip() {
    let mut gpu = Recorder::new();
    let shells: Vec<_> = (0..5).map(|i| shell(&mut gpu, i, 5)).collect();
    let alphas: Vec<_> = shells.iter().map(|s| s.transparency()).collect();
    assert!(alphas.windows(2).all(|w| w[0] > w[1]));
    assert!((alphas[4] - TIP_TRANSPARENCY).abs() < 1e-6);
  }

  #[test]
  fn render_uploads_shell_uniforms() {
    let mut gpu = Recorder::new();
    let mut s = shell(&mut gpu, 3, 4);
    s.set_current_time(2.5);
    s.set_screen_coord_movement(Vec2::new(0.0, 20.0));
    let transforms = Transforms::identity();
    let light = LightSource::default();
    let frame = FrameParams {
      transforms: &transforms,
      light: &light,
      wind_velocity: 3.0,
      camera_pos: Vec3::new(0.0, 0.0, 7.0),
    };
    s.render(&mut gpu, &frame);
    assert_eq!(gpu.rewrites, 3);
    let draw = gpu.draws[0];
    assert_eq!(draw.pass, Pass::Shell);
    assert_eq!(draw.vertex_count, 6 * 4 * 6);
    assert_eq!(draw.textures, [Some(TextureId(7)), None]);
    let Uniforms::Shell(c) = draw.uniforms else {
      panic!("shell drew with skin uniforms");
    };
    assert_eq!(c.layer_index, 3);
    assert_eq!(c.layer_count, 4);
    assert!((c.offset - 0.2).abs() < 1e-6);
    assert_eq!(c.current_time, 2.5);
    assert_eq!(c.wind_velocity, 3.0);
    assert_eq!(c.noise_kind, NoiseKind::Worley.as_uniform());
    assert_eq!(c.camera_pos, Vec4::new(0.0, 0.0, 7.0, 1.0));
    assert_eq!(c.v, Mat4::IDENTITY);
    assert!(c.mvp.abs_diff_eq(Mat4::from_rotation_x(-20f32.to_radians()), 1e-6));
    assert_eq!(c.mvp, c.m);
  }
}
