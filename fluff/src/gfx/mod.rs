pub mod renderer;

use std::{slice, mem};
use glam::{Vec4, Mat4};
use image::RgbaImage;
use crate::mesh::TriangleSoup;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
  Nearest,
  Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
  pub width: u32,
  pub height: u32,
  pub filter: Filter,
  /// Color data (skin) is sRGB, lookup tables (noise, hair map) are linear.
  pub srgb: bool,
}

/// Fixed-function state a draw runs under. Scoped to the draw itself, so
/// nothing carries over to the next mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderState {
  pub depth_test: bool,
  pub depth_write: bool,
  pub cull_back_faces: bool,
  pub alpha_blend: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
  Skin,
  Shell,
}

impl Pass {
  pub fn state(self) -> RenderState {
    match self {
      Self::Skin => RenderState {
        depth_test: true,
        depth_write: true,
        cull_back_faces: true,
        alpha_blend: false,
      },
      Self::Shell => RenderState {
        depth_test: true,
        depth_write: false,
        cull_back_faces: true,
        alpha_blend: true,
      },
    }
  }
}

/// Uniform block of the opaque base pass.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkinConst {
  pub mvp: Mat4,
  pub mv: Mat4,
  pub m: Mat4,
  pub v: Mat4,
  pub normal: Mat4,
  pub light_pos: Vec4,
  pub camera_pos: Vec4,
  pub light_color: Vec4,
  pub color: Vec4,
  pub ambient: Vec4,
  pub diffuse: Vec4,
  pub specular: Vec4,
  pub light_power: f32,
  pub transparency: f32,
  pub specularity: f32,
  pub shininess: f32,
}

/// Uniform block of one fur shell.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShellConst {
  pub mvp: Mat4,
  pub m: Mat4,
  pub v: Mat4,
  pub camera_pos: Vec4,
  pub light_pos: Vec4,
  pub light_color: Vec4,
  pub color: Vec4,
  pub ambient: Vec4,
  pub diffuse: Vec4,
  pub light_power: f32,
  pub transparency: f32,
  pub offset: f32,
  pub fur_length: f32,
  pub layer_index: u32,
  pub layer_count: u32,
  pub length_variation: f32,
  pub noise_sample_scale: f32,
  pub pattern_scale: f32,
  pub current_time: f32,
  pub wind_velocity: f32,
  pub noise_kind: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Uniforms {
  Skin(SkinConst),
  Shell(ShellConst),
}

impl Uniforms {
  pub fn bytes(&self) -> &[u8] {
    match self {
      Self::Skin(c) => cast(c),
      Self::Shell(c) => cast(c),
    }
  }
}

/// Position, uv and normal buffers of one drawable copy of a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Streams {
  pub positions: BufferId,
  pub uvs: BufferId,
  pub normals: BufferId,
}

impl Streams {
  pub fn upload(gpu: &mut dyn Gpu, soup: &TriangleSoup) -> Self {
    Self {
      positions: gpu.upload(cast_slice(&soup.positions)),
      uvs: gpu.upload(cast_slice(&soup.uvs)),
      normals: gpu.upload(cast_slice(&soup.normals)),
    }
  }

  pub fn rewrite(&self, gpu: &mut dyn Gpu, soup: &TriangleSoup) {
    gpu.rewrite(self.positions, cast_slice(&soup.positions));
    gpu.rewrite(self.uvs, cast_slice(&soup.uvs));
    gpu.rewrite(self.normals, cast_slice(&soup.normals));
  }

  pub fn release(self, gpu: &mut dyn Gpu) {
    gpu.release_buffer(self.positions);
    gpu.release_buffer(self.uvs);
    gpu.release_buffer(self.normals);
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Draw {
  pub pass: Pass,
  pub streams: Streams,
  pub vertex_count: u32,
  pub uniforms: Uniforms,
  /// Skin pass: `[skin, -]`. Shell pass: `[noise, hair map]`.
  pub textures: [Option<TextureId>; 2],
}

/// Everything the core asks of the graphics backend.
pub trait Gpu {
  fn upload(&mut self, data: &[u8]) -> BufferId;
  fn rewrite(&mut self, buf: BufferId, data: &[u8]);
  fn release_buffer(&mut self, buf: BufferId);
  fn create_texture(&mut self, pixels: &[u8], desc: TextureDesc) -> TextureId;
  fn release_texture(&mut self, tex: TextureId);
  fn draw(&mut self, draw: Draw);
}

/// Backend that keeps everything on the CPU and records every call. Used for
/// headless runs and tests.
#[derive(Debug, Default)]
pub struct Recorder {
  pub buffers: Vec<Option<Vec<u8>>>,
  pub textures: Vec<Option<(TextureDesc, Vec<u8>)>>,
  pub draws: Vec<Draw>,
  pub rewrites: usize,
}

impl Recorder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn live_buffers(&self) -> usize {
    self.buffers.iter().flatten().count()
  }

  pub fn live_textures(&self) -> usize {
    self.textures.iter().flatten().count()
  }

  pub fn texture(&self, tex: TextureId) -> Option<&(TextureDesc, Vec<u8>)> {
    self.textures.get(tex.0 as usize)?.as_ref()
  }

  pub fn take_draws(&mut self) -> Vec<Draw> {
    mem::take(&mut self.draws)
  }
}

impl Gpu for Recorder {
  fn upload(&mut self, data: &[u8]) -> BufferId {
    self.buffers.push(Some(data.to_vec()));
    BufferId(self.buffers.len() as u32 - 1)
  }

  fn rewrite(&mut self, buf: BufferId, data: &[u8]) {
    if let Some(Some(b)) = self.buffers.get_mut(buf.0 as usize) {
      b.clear();
      b.extend_from_slice(data);
      self.rewrites += 1;
    }
  }

  fn release_buffer(&mut self, buf: BufferId) {
    if let Some(b) = self.buffers.get_mut(buf.0 as usize) {
      *b = None;
    }
  }

  fn create_texture(&mut self, pixels: &[u8], desc: TextureDesc) -> TextureId {
    self.textures.push(Some((desc, pixels.to_vec())));
    TextureId(self.textures.len() as u32 - 1)
  }

  fn release_texture(&mut self, tex: TextureId) {
    if let Some(t) = self.textures.get_mut(tex.0 as usize) {
      *t = None;
    }
  }

  fn draw(&mut self, draw: Draw) {
    self.draws.push(draw);
  }
}

/// Uploads an RGBA8 image as a 2D texture.
pub fn upload_image(gpu: &mut dyn Gpu, img: &RgbaImage, filter: Filter, srgb: bool) -> TextureId {
  gpu.create_texture(
    img.as_raw(),
    TextureDesc {
      width: img.width(),
      height: img.height(),
      filter,
      srgb,
    },
  )
}

pub fn cast_slice<T>(t: &[T]) -> &[u8] {
  unsafe { slice::from_raw_parts(t.as_ptr() as _, mem::size_of_val(t)) }
}

pub fn cast<T>(t: &T) -> &[u8] {
  cast_slice(slice::from_ref(t))
}
