use std::time::Instant;
use glam::Vec2;
use log::{info, warn, error};
use winit::window::{Window, WindowBuilder};
use winit::event_loop::{EventLoop, EventLoopWindowTarget};
use winit::event::{Event, WindowEvent, ElementState, MouseButton, MouseScrollDelta, KeyEvent};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::dpi::PhysicalSize;
use crate::{Result, LoadError};
use crate::assets::Assets;
use crate::camera::Camera;
use crate::config::{Config, MeshConfig, MeshSource};
use crate::fur::FurMesh;
use crate::gfx::{self, Gpu, Filter, TextureId};
use crate::gfx::renderer::Renderer;
use crate::input::{Input, Action, Controls};
use crate::mesh::TriangleSoup;
use crate::scene::Scene;

const PIXELS_PER_LINE: f32 = 20.0;
const FPS_INTERVAL: f32 = 1.0;
const MAX_FPS_INTERVAL: f32 = 10.0;

/// Counts frames over a reporting interval.
#[derive(Debug, Clone)]
pub struct FpsCounter {
  interval: f32,
  elapsed: f32,
  frames: u32,
  fps: f32,
}

impl FpsCounter {
  pub fn new(interval: f32) -> Self {
    Self {
      interval: interval.clamp(0.0, MAX_FPS_INTERVAL),
      elapsed: 0.0,
      frames: 0,
      fps: 0.0,
    }
  }

  /// Records one frame. Returns the fresh rate whenever an interval closes.
  pub fn tick(&mut self, dt: f32) -> Option<f32> {
    self.frames += 1;
    self.elapsed += dt;
    if self.elapsed <= 0.0 || self.elapsed < self.interval {
      return None;
    }
    self.fps = self.frames as f32 / self.elapsed;
    self.frames = 0;
    self.elapsed = 0.0;
    Some(self.fps)
  }

  pub fn fps(&self) -> f32 {
    self.fps
  }

  pub fn title(&self, base: &str) -> String {
    format!("{} | FPS: {:.0}", base, self.fps)
  }
}

/// Builds the scene described by `config`, uploading everything through `gpu`.
/// Meshes must load, textures are optional and only warn. On failure the
/// meshes already uploaded are released again.
pub fn load_scene(config: &Config, gpu: &mut dyn Gpu, center: Vec2) -> Result<Scene, LoadError> {
  let assets = Assets::new(&config.assets);
  let camera = Camera::new(&config.camera, center);
  let mut scene = Scene::new(camera, config.light, config.wind_velocity);
  for entry in &config.meshes {
    match load_mesh(config, &assets, gpu, entry) {
      Ok(mesh) => scene.add_mesh(mesh),
      Err(e) => {
        scene.release(gpu);
        return Err(e);
      }
    }
  }
  scene.initialize();
  Ok(scene)
}

fn load_mesh(config: &Config, assets: &Assets, gpu: &mut dyn Gpu, entry: &MeshConfig) -> Result<FurMesh, LoadError> {
  let soup = match &entry.source {
    MeshSource::Obj(file) => assets.load_mesh(file, entry.ingestion)?,
    MeshSource::Sphere {
      radius,
      segments,
      rings,
    } => entry
      .ingestion
      .apply(TriangleSoup::sphere(*radius, *segments, *rings))?,
  };
  info!("loaded '{}' ({} triangles)", entry.name, soup.triangle_count());
  let mut mesh = FurMesh::new(gpu, entry.name.as_str(), soup, entry.material, config.fur);
  let skin = load_texture(assets, gpu, entry.skin.as_deref(), true);
  mesh.set_skin_texture(gpu, skin);
  let hair_map = load_texture(assets, gpu, entry.hair_map.as_deref(), false);
  mesh.set_hair_map(gpu, hair_map);
  Ok(mesh)
}

fn load_texture(assets: &Assets, gpu: &mut dyn Gpu, name: Option<&str>, srgb: bool) -> Option<TextureId> {
  let name = name?;
  match assets.load_texture(name) {
    Ok(img) => Some(gfx::upload_image(gpu, &img, Filter::Linear, srgb)),
    Err(e) => {
      warn!("continuing without texture: {}", e);
      None
    }
  }
}

pub fn key_action(key: KeyCode) -> Option<Action> {
  Some(match key {
    KeyCode::KeyR => Action::ResetCamera,
    KeyCode::Tab => Action::NextMesh,
    KeyCode::KeyN => Action::CycleNoise,
    KeyCode::ArrowUp => Action::LongerFur,
    KeyCode::ArrowDown => Action::ShorterFur,
    KeyCode::ArrowRight => Action::MoreLayers,
    KeyCode::ArrowLeft => Action::FewerLayers,
    KeyCode::KeyW => Action::MoreWind,
    KeyCode::KeyS => Action::LessWind,
    KeyCode::KeyL => Action::BrighterLight,
    KeyCode::KeyK => Action::DimmerLight,
    _ => return None,
  })
}

fn center(size: PhysicalSize<u32>) -> Vec2 {
  Vec2::new(size.width as f32, size.height as f32) / 2.0
}

/// Everything the window loop owns. The renderer is declared before the
/// window so its surface is dropped first.
pub struct AppContext {
  renderer: Renderer,
  window: Window,
  scene: Scene,
  controls: Controls,
  fps: FpsCounter,
  title: String,
  cursor: Vec2,
  last_frame: Instant,
}

impl AppContext {
  pub fn new(config: &Config, event_loop: &EventLoop<()>) -> Result<Self> {
    let window = WindowBuilder::new()
      .with_title(&config.window.title)
      .with_inner_size(PhysicalSize::new(config.window.width, config.window.height))
      .build(event_loop)?;
    let mut renderer = pollster::block_on(Renderer::new(&window, config.window.clear_color))?;
    let scene = load_scene(config, &mut renderer, center(window.inner_size()))?;
    Ok(Self {
      renderer,
      window,
      scene,
      controls: Controls::default(),
      fps: FpsCounter::new(FPS_INTERVAL),
      title: config.window.title.clone(),
      cursor: Vec2::ZERO,
      last_frame: Instant::now(),
    })
  }

  pub fn window(&self) -> &Window {
    &self.window
  }

  pub fn scene(&self) -> &Scene {
    &self.scene
  }

  pub fn handle(&mut self, event: WindowEvent, elwt: &EventLoopWindowTarget<()>) -> Result {
    let input = match event {
      WindowEvent::RedrawRequested => return self.redraw(),
      WindowEvent::Resized(size) => {
        self.renderer.resize(size);
        self.scene.camera_mut().set_center(center(size));
        None
      }
      WindowEvent::CloseRequested => {
        elwt.exit();
        None
      }
      WindowEvent::CursorMoved { position, .. } => {
        self.cursor = Vec2::new(position.x as f32, position.y as f32);
        Some(Input::PointerMoved {
          x: self.cursor.x,
          y: self.cursor.y,
        })
      }
      WindowEvent::MouseInput {
        state,
        button: MouseButton::Left,
        ..
      } => Some(match state {
        ElementState::Pressed => Input::PointerDown {
          x: self.cursor.x,
          y: self.cursor.y,
        },
        ElementState::Released => Input::PointerUp,
      }),
      WindowEvent::MouseWheel { delta, .. } => Some(match delta {
        MouseScrollDelta::LineDelta(dx, dy) => Input::Scroll { dx, dy },
        MouseScrollDelta::PixelDelta(p) => Input::Scroll {
          dx: p.x as f32 / PIXELS_PER_LINE,
          dy: p.y as f32 / PIXELS_PER_LINE,
        },
      }),
      WindowEvent::KeyboardInput {
        event:
          KeyEvent {
            physical_key: PhysicalKey::Code(key),
            state: ElementState::Pressed,
            ..
          },
        ..
      } => {
        if key == KeyCode::Escape {
          elwt.exit();
        }
        key_action(key).map(Input::Action)
      }
      _ => None,
    };
    if let Some(input) = input {
      self.controls.apply(&mut self.scene, &mut self.renderer, input);
    }
    Ok(())
  }

  fn redraw(&mut self) -> Result {
    let now = Instant::now();
    let dt = (now - self.last_frame).as_secs_f32();
    self.last_frame = now;
    if self.fps.tick(dt).is_some() {
      self.window.set_title(&self.fps.title(&self.title));
    }
    self.scene.update(&mut self.renderer, dt);
    self.scene.render(&mut self.renderer);
    self.renderer.frame()
  }
}

pub fn run(config: Config) -> Result {
  let event_loop = EventLoop::new()?;
  let mut app = AppContext::new(&config, &event_loop)?;
  event_loop.run(move |event, elwt| match event {
    Event::WindowEvent { event, .. } => {
      if let Err(e) = app.handle(event, elwt) {
        error!("{}", e);
        elwt.exit();
      }
    }
    Event::AboutToWait => app.window().request_redraw(),
    _ => {}
  })?;
  Ok(())
}
