use glam::{Vec2, Vec3, Quat, Mat4};
use log::debug;
use serde::{Serialize, Deserialize};

pub const DEFAULT_ZOOM: f32 = 4.0;
pub const ARCBALL_RADIUS: f32 = 300.0;
const FOV_Y: f32 = 45.0;
const ASPECT: f32 = 4.0 / 3.0;
const NEAR: f32 = 0.1;
const FAR: f32 = 100.0;
const ZOOM_STEP: f32 = 5.0;
// the eye may approach the look-at target but never reach or cross it
const MIN_EYE_DISTANCE: f32 = 0.1;
const EYE_MARGIN: f32 = 0.01;
const AXIS_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragState {
  Idle,
  Dragging,
}

/// Maps pointer drags onto a virtual hemisphere and turns them into rotations.
#[derive(Debug, Clone)]
pub struct Arcball {
  radius: f32,
  center: Vec2,
  state: DragState,
  drag_start: Vec2,
  previous: Option<Vec2>,
  difference: Vec2,
}

impl Arcball {
  pub fn new(radius: f32, center: Vec2) -> Self {
    Self {
      radius,
      center,
      state: DragState::Idle,
      drag_start: Vec2::ZERO,
      previous: None,
      difference: Vec2::ZERO,
    }
  }

  pub fn state(&self) -> DragState {
    self.state
  }

  pub fn is_dragging(&self) -> bool {
    self.state == DragState::Dragging
  }

  pub fn center(&self) -> Vec2 {
    self.center
  }

  pub fn set_center(&mut self, center: Vec2) {
    self.center = center;
  }

  pub fn radius(&self) -> f32 {
    self.radius
  }

  /// Centered screen point the next rotation starts from.
  pub fn drag_start_position(&self) -> Vec2 {
    self.drag_start
  }

  /// Pointer movement between the last two samples of the current drag.
  pub fn screen_coord_difference(&self) -> Vec2 {
    self.difference
  }

  pub fn drag_start(&mut self, x: f32, y: f32) {
    self.state = DragState::Dragging;
    self.previous = None;
    self.drag_update(x, y);
  }

  pub fn drag_update(&mut self, x: f32, y: f32) {
    if !self.is_dragging() {
      return;
    }
    let point = Vec2::new(x, y);
    self.drag_start = point - self.center;
    // the first sample after a (re)start only seeds the history
    self.difference = match self.previous {
      Some(previous) => point - previous,
      None => Vec2::ZERO,
    };
    self.previous = Some(point);
  }

  pub fn drag_end(&mut self) {
    if self.is_dragging() {
      self.difference = Vec2::ZERO;
      self.previous = None;
      self.state = DragState::Idle;
    }
  }

  /// Projects a centered screen point onto the unit hemisphere facing the viewer.
  pub fn map_to_sphere(&self, point: Vec2) -> Vec3 {
    let mut p = Vec2::new(point.x, -point.y);
    let safe_radius = self.radius - 1.0;
    if p.length() > safe_radius {
      let theta = p.y.atan2(p.x);
      p = Vec2::new(theta.cos(), theta.sin()) * safe_radius;
    }
    let z = (self.radius * self.radius - p.length_squared()).max(0.0).sqrt();
    (p.extend(z) / self.radius).normalize()
  }

  /// Accumulates the rotation from the drag start to `(x, y)` into `orientation`.
  pub fn rotate(&self, orientation: Quat, x: f32, y: f32) -> Quat {
    if !self.is_dragging() {
      return orientation;
    }
    let v0 = self.map_to_sphere(self.drag_start);
    let v1 = self.map_to_sphere(Vec2::new(x, y) - self.center);
    let axis = v0.cross(v1);
    let s = ((1.0 + v0.dot(v1)) * 2.0).max(0.0).sqrt();
    if !axis.is_finite() || axis.length() < AXIS_EPSILON || s < AXIS_EPSILON {
      return orientation;
    }
    let axis = axis / s;
    let q = Quat::from_xyzw(axis.x, axis.y, axis.z, 0.5 * s);
    (q * orientation).normalize()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
  pub position: Vec3,
  pub zoom: f32,
  pub radius: f32,
}

impl Default for CameraConfig {
  fn default() -> Self {
    Self {
      position: Vec3::new(0.0, 0.0, 3.0),
      zoom: DEFAULT_ZOOM,
      radius: ARCBALL_RADIUS,
    }
  }
}

#[derive(Debug)]
pub struct Camera {
  position: Vec3,
  zoom: f32,
  default_zoom: f32,
  orientation: Quat,
  arcball: Arcball,
  model: Mat4,
  view: Mat4,
  projection: Mat4,
}

impl Camera {
  pub fn new(config: &CameraConfig, center: Vec2) -> Self {
    let mut camera = Self {
      position: config.position,
      zoom: config.zoom,
      default_zoom: config.zoom,
      orientation: Quat::IDENTITY,
      arcball: Arcball::new(config.radius, center),
      model: Mat4::IDENTITY,
      view: Mat4::IDENTITY,
      projection: Mat4::IDENTITY,
    };
    camera.initialize();
    camera
  }

  pub fn initialize(&mut self) {
    self.update();
  }

  /// Recomputes model, view and projection from the current state.
  pub fn update(&mut self) {
    self.projection = Mat4::perspective_rh(FOV_Y.to_radians(), ASPECT, NEAR, FAR);
    self.view = Mat4::look_at_rh(self.eye(), Vec3::ZERO, Vec3::Y) * Mat4::from_quat(self.orientation);
    self.model = Mat4::IDENTITY;
  }

  /// Eye position before the orientation is applied.
  pub fn eye(&self) -> Vec3 {
    self.position + Vec3::Z * self.zoom
  }

  /// Eye position in world space, i.e. with the arcball rotation undone.
  pub fn world_eye(&self) -> Vec3 {
    self.orientation.inverse() * self.eye()
  }

  pub fn position(&self) -> Vec3 {
    self.position
  }

  pub fn zoom(&self) -> f32 {
    self.zoom
  }

  pub fn default_zoom(&self) -> f32 {
    self.default_zoom
  }

  pub fn orientation(&self) -> Quat {
    self.orientation
  }

  pub fn model_matrix(&self) -> Mat4 {
    self.model
  }

  pub fn view_matrix(&self) -> Mat4 {
    self.view
  }

  pub fn projection_matrix(&self) -> Mat4 {
    self.projection
  }

  pub fn arcball(&self) -> &Arcball {
    &self.arcball
  }

  pub fn set_center(&mut self, center: Vec2) {
    self.arcball.set_center(center);
  }

  pub fn is_dragged(&self) -> bool {
    self.arcball.is_dragging()
  }

  pub fn screen_coord_difference(&self) -> Vec2 {
    self.arcball.screen_coord_difference()
  }

  pub fn drag_start(&mut self, x: f32, y: f32) {
    debug!("Drag started at ({}, {})", x, y);
    self.arcball.drag_start(x, y);
  }

  pub fn drag_update(&mut self, x: f32, y: f32) {
    self.arcball.drag_update(x, y);
  }

  pub fn rotate(&mut self, x: f32, y: f32) {
    self.orientation = self.arcball.rotate(self.orientation, x, y);
  }

  /// Pointer moved while possibly dragging: rotate, then advance the drag.
  pub fn drag_to(&mut self, x: f32, y: f32) {
    self.rotate(x, y);
    self.drag_update(x, y);
  }

  pub fn drag_end(&mut self) {
    if self.arcball.is_dragging() {
      debug!("Drag ended");
    }
    self.arcball.drag_end();
  }

  pub fn reset(&mut self) {
    self.orientation = Quat::IDENTITY;
    self.zoom = self.default_zoom;
  }

  /// Scroll input; only the vertical component moves the eye.
  pub fn update_zoom(&mut self, delta: Vec2) {
    let floor = MIN_EYE_DISTANCE + EYE_MARGIN - self.position.z;
    self.zoom = (self.zoom - delta.y / ZOOM_STEP).max(floor);
  }
}
