use log::info;
use crate::gfx::Gpu;
use crate::scene::Scene;

/// Window-system independent input event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Input {
  PointerDown { x: f32, y: f32 },
  PointerUp,
  PointerMoved { x: f32, y: f32 },
  Scroll { dx: f32, dy: f32 },
  Action(Action),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
  ResetCamera,
  NextMesh,
  CycleNoise,
  LongerFur,
  ShorterFur,
  MoreLayers,
  FewerLayers,
  MoreWind,
  LessWind,
  BrighterLight,
  DimmerLight,
}

/// Turns input into scene calls. Step sizes and the ranges they are kept in
/// live here, the scene itself takes any value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Controls {
  pub fur_length_step: f32,
  pub layer_step: u32,
  pub max_layers: u32,
  pub wind_step: f32,
  pub light_step: f32,
}

impl Default for Controls {
  fn default() -> Self {
    Self {
      fur_length_step: 0.02,
      layer_step: 4,
      max_layers: 256,
      wind_step: 0.25,
      light_step: 0.1,
    }
  }
}

impl Controls {
  pub fn apply(&self, scene: &mut Scene, gpu: &mut dyn Gpu, input: Input) {
    match input {
      Input::PointerDown { x, y } => scene.mouse_press(x, y),
      Input::PointerUp => scene.mouse_release(),
      Input::PointerMoved { x, y } => scene.update_camera_position(x, y),
      Input::Scroll { dx, dy } => scene.update_camera_zoom(dx, dy),
      Input::Action(action) => self.act(scene, gpu, action),
    }
  }

  fn act(&self, scene: &mut Scene, gpu: &mut dyn Gpu, action: Action) {
    match action {
      Action::ResetCamera => scene.reset_camera(),
      Action::NextMesh => scene.select_next(),
      Action::CycleNoise => {
        if let Some(kind) = scene.selected_mesh().map(|m| m.noise_kind().next()) {
          info!("noise: {:?}", kind);
          scene.set_noise_kind(kind);
        }
      }
      Action::LongerFur | Action::ShorterFur => {
        let step = if action == Action::LongerFur {
          self.fur_length_step
        } else {
          -self.fur_length_step
        };
        if let Some(mesh) = scene.selected_mesh_mut() {
          mesh.set_fur_length((mesh.fur_length() + step).max(0.0));
        }
      }
      Action::MoreLayers | Action::FewerLayers => {
        if let Some(mesh) = scene.selected_mesh_mut() {
          let count = if action == Action::MoreLayers {
            (mesh.layer_count() + self.layer_step).min(self.max_layers)
          } else {
            mesh.layer_count().saturating_sub(self.layer_step).max(1)
          };
          mesh.set_layer_count(gpu, count);
        }
      }
      Action::MoreWind => scene.set_wind_velocity(scene.wind_velocity() + self.wind_step),
      Action::LessWind => scene.set_wind_velocity((scene.wind_velocity() - self.wind_step).max(0.0)),
      Action::BrighterLight => scene.set_light_power(scene.light_power() + self.light_step),
      Action::DimmerLight => scene.set_light_power((scene.light_power() - self.light_step).max(0.0)),
    }
  }
}
