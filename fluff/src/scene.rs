use glam::{Vec2, Vec3, Vec4, Mat4};
use log::info;
use serde::{Serialize, Deserialize};
use crate::camera::Camera;
use crate::fur::FurMesh;
use crate::gfx::Gpu;
use crate::noise::NoiseKind;

/// Matrices derived from the camera once per frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transforms {
  pub mvp: Mat4,
  pub mv: Mat4,
  pub m: Mat4,
  pub v: Mat4,
  /// Takes the world-space light into view space.
  pub mv_light: Mat4,
  /// Inverse transpose of `mv`.
  pub normal: Mat4,
}

impl Transforms {
  pub fn identity() -> Self {
    Self {
      mvp: Mat4::IDENTITY,
      mv: Mat4::IDENTITY,
      m: Mat4::IDENTITY,
      v: Mat4::IDENTITY,
      mv_light: Mat4::IDENTITY,
      normal: Mat4::IDENTITY,
    }
  }

  pub fn from_camera(camera: &Camera) -> Self {
    let m = camera.model_matrix();
    let v = camera.view_matrix();
    let mv = v * m;
    Self {
      mvp: camera.projection_matrix() * mv,
      mv,
      m,
      v,
      mv_light: mv,
      normal: mv.inverse().transpose(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightSource {
  pub position: Vec3,
  pub color: Vec4,
  pub power: f32,
}

impl Default for LightSource {
  fn default() -> Self {
    Self {
      position: Vec3::new(0.0, 5.0, 0.0),
      color: Vec4::ONE,
      power: 1.0,
    }
  }
}

/// Everything a mesh needs from the scene to draw one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameParams<'a> {
  pub transforms: &'a Transforms,
  pub light: &'a LightSource,
  pub wind_velocity: f32,
  /// World-space eye position.
  pub camera_pos: Vec3,
}

#[derive(Debug)]
pub struct Scene {
  camera: Camera,
  light: LightSource,
  wind_velocity: f32,
  meshes: Vec<FurMesh>,
  transforms: Transforms,
  selected: usize,
}

impl Scene {
  pub fn new(camera: Camera, light: LightSource, wind_velocity: f32) -> Self {
    Self {
      camera,
      light,
      wind_velocity,
      meshes: vec![],
      transforms: Transforms::identity(),
      selected: 0,
    }
  }

  pub fn initialize(&mut self) {
    self.camera.initialize();
    self.transforms = Transforms::from_camera(&self.camera);
    info!(
      "scene initialized with {} mesh(es), light at {}",
      self.meshes.len(),
      self.light.position
    );
  }

  /// The first mesh added is the visible one.
  pub fn add_mesh(&mut self, mut mesh: FurMesh) {
    mesh.set_shall_render(self.meshes.is_empty());
    self.meshes.push(mesh);
  }

  pub fn render(&mut self, gpu: &mut dyn Gpu) {
    self.camera.update();
    self.transforms = Transforms::from_camera(&self.camera);
    let frame = FrameParams {
      transforms: &self.transforms,
      light: &self.light,
      wind_velocity: self.wind_velocity,
      camera_pos: self.camera.world_eye(),
    };
    for mesh in self.meshes.iter_mut().filter(|m| m.shall_render()) {
      mesh.render(gpu, &frame);
    }
  }

  /// Ticks every mesh, hidden ones included.
  pub fn update(&mut self, gpu: &mut dyn Gpu, dt: f32) {
    let movement = self.camera.screen_coord_difference();
    for mesh in &mut self.meshes {
      mesh.set_screen_coord_movement(movement);
      mesh.update_fur(gpu, dt);
    }
  }

  pub fn update_camera_position(&mut self, x: f32, y: f32) {
    self.camera.drag_to(x, y);
  }

  pub fn update_camera_zoom(&mut self, dx: f32, dy: f32) {
    self.camera.update_zoom(Vec2::new(dx, dy));
  }

  pub fn mouse_press(&mut self, x: f32, y: f32) {
    self.camera.drag_start(x, y);
  }

  pub fn mouse_release(&mut self) {
    self.camera.drag_end();
  }

  pub fn reset_camera(&mut self) {
    self.camera.reset();
  }

  pub fn camera(&self) -> &Camera {
    &self.camera
  }

  pub fn camera_mut(&mut self) -> &mut Camera {
    &mut self.camera
  }

  pub fn transforms(&self) -> &Transforms {
    &self.transforms
  }

  pub fn light(&self) -> &LightSource {
    &self.light
  }

  pub fn light_power(&self) -> f32 {
    self.light.power
  }

  pub fn set_light_power(&mut self, power: f32) {
    self.light.power = power;
  }

  pub fn wind_velocity(&self) -> f32 {
    self.wind_velocity
  }

  pub fn set_wind_velocity(&mut self, velocity: f32) {
    self.wind_velocity = velocity;
  }

  pub fn set_current_time(&mut self, time: f32) {
    for mesh in &mut self.meshes {
      mesh.set_current_time(time);
    }
  }

  pub fn meshes(&self) -> &[FurMesh] {
    &self.meshes
  }

  pub fn meshes_mut(&mut self) -> &mut [FurMesh] {
    &mut self.meshes
  }

  pub fn selected(&self) -> usize {
    self.selected
  }

  pub fn selected_mesh(&self) -> Option<&FurMesh> {
    self.meshes.get(self.selected)
  }

  pub fn selected_mesh_mut(&mut self) -> Option<&mut FurMesh> {
    self.meshes.get_mut(self.selected)
  }

  /// Shows mesh `index` and hides the rest. Out of range is ignored.
  pub fn select(&mut self, index: usize) {
    if index >= self.meshes.len() {
      return;
    }
    self.selected = index;
    for (i, mesh) in self.meshes.iter_mut().enumerate() {
      mesh.set_shall_render(i == index);
    }
    info!("showing '{}'", self.meshes[index].name());
  }

  pub fn select_next(&mut self) {
    if !self.meshes.is_empty() {
      self.select((self.selected + 1) % self.meshes.len());
    }
  }

  pub fn set_noise_kind(&mut self, kind: NoiseKind) {
    for mesh in &mut self.meshes {
      mesh.set_noise_kind(kind);
    }
  }

  pub fn release(self, gpu: &mut dyn Gpu) {
    for mesh in self.meshes {
      mesh.release(gpu);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::camera::CameraConfig;
  use crate::fur::FurParams;
  use crate::gfx::{Recorder, Pass, Uniforms};
  use crate::material::Material;
  use crate::mesh::TriangleSoup;

  fn scene(gpu: &mut Recorder, meshes: &[&str]) -> Scene {
    let camera = Camera::new(&CameraConfig::default(), Vec2::new(400.0, 300.0));
    let mut scene = Scene::new(camera, LightSource::default(), 1.0);
    let params = FurParams {
      layer_count: 2,
      noise_resolution: 4,
      ..Default::default()
    };
    for name in meshes {
      let soup = TriangleSoup::sphere(1.0, 4, 3);
      scene.add_mesh(FurMesh::new(gpu, *name, soup, Material::default(), params));
    }
    scene.initialize();
    scene
  }

  #[test]
  fn transforms_follow_camera() {
    let mut gpu = Recorder::new();
    let scene = scene(&mut gpu, &[]);
    let cam = scene.camera();
    let t = scene.transforms();
    assert_eq!(t.m, Mat4::IDENTITY);
    assert!(t.mvp.abs_diff_eq(cam.projection_matrix() * cam.view_matrix(), 1e-6));
    assert!(t.normal.abs_diff_eq(t.mv.inverse().transpose(), 1e-6));
  }

  #[test]
  fn only_the_selected_mesh_renders() {
    let mut gpu = Recorder::new();
    let mut scene = scene(&mut gpu, &["a", "b"]);
    scene.render(&mut gpu);
    let draws = gpu.take_draws();
    assert_eq!(draws.len(), 3);
    let first = scene.meshes()[0].streams();
    assert_eq!(draws[0].streams, first);

    scene.select_next();
    assert_eq!(scene.selected(), 1);
    scene.render(&mut gpu);
    let draws = gpu.take_draws();
    assert_eq!(draws[0].pass, Pass::Skin);
    assert_eq!(draws[0].streams, scene.meshes()[1].streams());

    scene.select(7);
    assert_eq!(scene.selected(), 1);
    scene.select_next();
    assert_eq!(scene.selected(), 0);
  }

  #[test]
  fn update_ticks_hidden_meshes_too() {
    let mut gpu = Recorder::new();
    let mut scene = scene(&mut gpu, &["a", "b"]);
    scene.update(&mut gpu, 0.5);
    assert!(scene.meshes().iter().all(|m| m.current_time() == 0.5));
    scene.set_current_time(3.0);
    assert!(scene.meshes().iter().all(|m| m.current_time() == 3.0));
  }

  #[test]
  fn drag_movement_reaches_shells() {
    let mut gpu = Recorder::new();
    let mut scene = scene(&mut gpu, &["a"]);
    scene.mouse_press(400.0, 300.0);
    scene.update_camera_position(410.0, 300.0);
    scene.update_camera_position(425.0, 305.0);
    scene.update(&mut gpu, 0.016);
    let tip = &scene.meshes()[0].shells()[1];
    assert_eq!(tip.params().screen_coord_movement, Vec2::new(15.0, 5.0));
    assert!(!scene.camera().orientation().abs_diff_eq(glam::Quat::IDENTITY, 1e-6));

    scene.mouse_release();
    scene.update(&mut gpu, 0.016);
    let tip = &scene.meshes()[0].shells()[1];
    assert_eq!(tip.params().screen_coord_movement, Vec2::ZERO);
  }

  #[test]
  fn shells_receive_world_eye_and_wind() {
    let mut gpu = Recorder::new();
    let mut scene = scene(&mut gpu, &["a"]);
    scene.set_wind_velocity(2.5);
    scene.set_light_power(3.0);
    scene.render(&mut gpu);
    let draws = gpu.take_draws();
    let Uniforms::Shell(c) = draws[1].uniforms else {
      panic!("expected a shell draw");
    };
    assert_eq!(c.wind_velocity, 2.5);
    assert_eq!(c.light_power, 3.0);
    let eye = scene.camera().world_eye();
    assert!((c.camera_pos.truncate() - eye).length() < 1e-6);
    assert!((eye.z - 7.0).abs() < 1e-5);
  }

  #[test]
  fn zoom_and_reset() {
    let mut gpu = Recorder::new();
    let mut scene = scene(&mut gpu, &[]);
    scene.update_camera_zoom(0.0, 10.0);
    assert!((scene.camera().zoom() - 2.0).abs() < 1e-6);
    scene.reset_camera();
    assert_eq!(scene.camera().zoom(), 4.0);
  }

  #[test]
  fn noise_kind_applies_to_every_mesh() {
    let mut gpu = Recorder::new();
    let mut scene = scene(&mut gpu, &["a", "b"]);
    scene.set_noise_kind(NoiseKind::Worley);
    scene.update(&mut gpu, 0.0);
    assert!(scene.meshes().iter().all(|m| m.noise_kind() == NoiseKind::Worley));
    scene.release(&mut gpu);
    assert_eq!(gpu.live_buffers(), 0);
    assert_eq!(gpu.live_textures(), 0);
  }
}
