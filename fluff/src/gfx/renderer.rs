use std::collections::HashMap;
use std::mem;
use wgpu::util::DeviceExt;
use winit::window::Window;
use winit::dpi::PhysicalSize;
use log::{debug, info, warn};
use crate::Result;
use super::{Gpu, Draw, Pass, BufferId, TextureId, TextureDesc, Filter, SkinConst, ShellConst};

pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8UnormSrgb;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
pub const SAMPLES: u32 = 4;

const UNIFORM_SIZE: usize = if mem::size_of::<SkinConst>() > mem::size_of::<ShellConst>() {
  mem::size_of::<SkinConst>()
} else {
  mem::size_of::<ShellConst>()
};

const POSITION: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
const UV: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x2];
const NORMAL: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![2 => Float32x3];

/// Handle table. Ids are never reused, so a stale handle just misses.
struct Slots<T>(Vec<Option<T>>);

impl<T> Slots<T> {
  fn insert(&mut self, t: T) -> u32 {
    self.0.push(Some(t));
    self.0.len() as u32 - 1
  }

  fn get(&self, id: u32) -> Option<&T> {
    self.0.get(id as usize)?.as_ref()
  }

  fn remove(&mut self, id: u32) -> Option<T> {
    self.0.get_mut(id as usize)?.take()
  }
}

struct Texture {
  texture: wgpu::Texture,
  view: wgpu::TextureView,
  sampler: wgpu::Sampler,
}

impl Texture {
  fn new(device: &wgpu::Device, queue: &wgpu::Queue, pixels: &[u8], desc: TextureDesc) -> Self {
    let format = if desc.srgb {
      wgpu::TextureFormat::Rgba8UnormSrgb
    } else {
      wgpu::TextureFormat::Rgba8Unorm
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
      size: wgpu::Extent3d {
        width: desc.width,
        height: desc.height,
        depth_or_array_layers: 1,
      },
      mip_level_count: 1,
      sample_count: 1,
      dimension: wgpu::TextureDimension::D2,
      format,
      usage: wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::TEXTURE_BINDING,
      view_formats: &[],
      label: None,
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let filter = match desc.filter {
      Filter::Nearest => wgpu::FilterMode::Nearest,
      Filter::Linear => wgpu::FilterMode::Linear,
    };
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
      address_mode_u: wgpu::AddressMode::Repeat,
      address_mode_v: wgpu::AddressMode::Repeat,
      mag_filter: filter,
      min_filter: filter,
      ..Default::default()
    });
    queue.write_texture(
      wgpu::ImageCopyTexture {
        texture: &texture,
        mip_level: 0,
        origin: wgpu::Origin3d::ZERO,
        aspect: wgpu::TextureAspect::All,
      },
      pixels,
      wgpu::ImageDataLayout {
        offset: 0,
        bytes_per_row: Some(4 * desc.width),
        rows_per_image: Some(desc.height),
      },
      texture.size(),
    );
    Self {
      texture,
      view,
      sampler,
    }
  }
}

struct Targets {
  fb: wgpu::TextureView,
  depth: wgpu::TextureView,
}

impl Targets {
  fn new(device: &wgpu::Device, size: PhysicalSize<u32>) -> Self {
    let desc = wgpu::TextureDescriptor {
      size: wgpu::Extent3d {
        width: size.width.max(1),
        height: size.height.max(1),
        depth_or_array_layers: 1,
      },
      mip_level_count: 1,
      sample_count: SAMPLES,
      dimension: wgpu::TextureDimension::D2,
      format: FORMAT,
      usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
      view_formats: &[],
      label: None,
    };
    Self {
      fb: device
        .create_texture(&desc)
        .create_view(&wgpu::TextureViewDescriptor::default()),
      depth: device
        .create_texture(&wgpu::TextureDescriptor {
          format: DEPTH_FORMAT,
          ..desc
        })
        .create_view(&wgpu::TextureViewDescriptor::default()),
    }
  }
}

/// wgpu backend. Draws are queued as they come in and replayed by `frame`
/// inside a single render pass, in submission order.
pub struct Renderer {
  surface: wgpu::Surface,
  device: wgpu::Device,
  queue: wgpu::Queue,
  size: PhysicalSize<u32>,
  clear: wgpu::Color,
  targets: Targets,
  uniform_layout: wgpu::BindGroupLayout,
  texture_layout: wgpu::BindGroupLayout,
  skin: wgpu::RenderPipeline,
  shell: wgpu::RenderPipeline,
  buffers: Slots<wgpu::Buffer>,
  textures: Slots<Texture>,
  white: Texture,
  uniforms: Vec<(wgpu::Buffer, wgpu::BindGroup)>,
  bind_groups: HashMap<[Option<TextureId>; 2], wgpu::BindGroup>,
  draws: Vec<Draw>,
}

impl Renderer {
  pub async fn new(window: &Window, clear: [f64; 4]) -> Result<Self> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let surface = unsafe { instance.create_surface(window)? };
    let adapter = instance
      .request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: Some(&surface),
        force_fallback_adapter: false,
      })
      .await
      .ok_or("no suitable graphics adapter")?;
    info!("using adapter {}", adapter.get_info().name);
    let (device, queue) = adapter
      .request_device(
        &wgpu::DeviceDescriptor {
          features: wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES,
          limits: adapter.limits(),
          label: None,
        },
        None,
      )
      .await?;

    let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
      entries: &[wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
          ty: wgpu::BufferBindingType::Uniform,
          has_dynamic_offset: false,
          min_binding_size: None,
        },
        count: None,
      }],
      label: None,
    });
    let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
      binding,
      visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
      ty: wgpu::BindingType::Texture {
        multisampled: false,
        view_dimension: wgpu::TextureViewDimension::D2,
        sample_type: wgpu::TextureSampleType::Float { filterable: true },
      },
      count: None,
    };
    let sampler_entry = |binding| wgpu::BindGroupLayoutEntry {
      binding,
      visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
      ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
      count: None,
    };
    let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
      entries: &[
        texture_entry(0),
        sampler_entry(1),
        texture_entry(2),
        sampler_entry(3),
      ],
      label: None,
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
      bind_group_layouts: &[&uniform_layout, &texture_layout],
      push_constant_ranges: &[],
      label: None,
    });
    let skin = pipeline(
      &device,
      &pipeline_layout,
      wgpu::ShaderSource::Wgsl(include_str!("skin.wgsl").into()),
      Pass::Skin,
    );
    let shell = pipeline(
      &device,
      &pipeline_layout,
      wgpu::ShaderSource::Wgsl(include_str!("shell.wgsl").into()),
      Pass::Shell,
    );

    let white = Texture::new(
      &device,
      &queue,
      &[255; 4],
      TextureDesc {
        width: 1,
        height: 1,
        filter: Filter::Nearest,
        srgb: false,
      },
    );
    let size = window.inner_size();
    let targets = Targets::new(&device, size);
    let mut renderer = Self {
      surface,
      device,
      queue,
      size,
      clear: wgpu::Color {
        r: clear[0],
        g: clear[1],
        b: clear[2],
        a: clear[3],
      },
      targets,
      uniform_layout,
      texture_layout,
      skin,
      shell,
      buffers: Slots(vec![]),
      textures: Slots(vec![]),
      white,
      uniforms: vec![],
      bind_groups: HashMap::new(),
      draws: vec![],
    };
    renderer.resize(size);
    Ok(renderer)
  }

  pub fn resize(&mut self, size: PhysicalSize<u32>) {
    if size.width == 0 || size.height == 0 {
      return;
    }
    debug!("resizing surface to {}x{}", size.width, size.height);
    self.size = size;
    self.targets = Targets::new(&self.device, size);
    self.surface.configure(
      &self.device,
      &wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format: FORMAT,
        width: size.width,
        height: size.height,
        present_mode: wgpu::PresentMode::AutoVsync,
        alpha_mode: wgpu::CompositeAlphaMode::Auto,
        view_formats: vec![],
      },
    );
  }

  pub fn size(&self) -> PhysicalSize<u32> {
    self.size
  }

  /// Replays the draws queued since the last frame and presents.
  pub fn frame(&mut self) -> Result {
    let draws: Vec<_> = mem::take(&mut self.draws)
      .into_iter()
      .filter(|d| {
        let s = d.streams;
        [s.positions, s.uvs, s.normals]
          .iter()
          .all(|b| self.buffers.get(b.0).is_some())
      })
      .collect();
    while self.uniforms.len() < draws.len() {
      let buf = self.device.create_buffer(&wgpu::BufferDescriptor {
        size: UNIFORM_SIZE as _,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
        label: None,
      });
      let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout: &self.uniform_layout,
        entries: &[wgpu::BindGroupEntry {
          binding: 0,
          resource: buf.as_entire_binding(),
        }],
        label: None,
      });
      self.uniforms.push((buf, bind_group));
    }
    for (draw, (buf, _)) in draws.iter().zip(&self.uniforms) {
      self.queue.write_buffer(buf, 0, draw.uniforms.bytes());
    }
    for draw in &draws {
      self.texture_bind_group(draw.textures);
    }

    let surface = match self.surface.get_current_texture() {
      Ok(s) => s,
      Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
        warn!("surface lost, reconfiguring");
        self.resize(self.size);
        return Ok(());
      }
      Err(e) => return Err(e.into()),
    };
    let surface_view = surface
      .texture
      .create_view(&wgpu::TextureViewDescriptor::default());
    let mut encoder = self
      .device
      .create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
    {
      let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
          view: &self.targets.fb,
          resolve_target: Some(&surface_view),
          ops: wgpu::Operations {
            load: wgpu::LoadOp::Clear(self.clear),
            store: wgpu::StoreOp::Store,
          },
        })],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
          view: &self.targets.depth,
          depth_ops: Some(wgpu::Operations {
            load: wgpu::LoadOp::Clear(1.0),
            store: wgpu::StoreOp::Store,
          }),
          stencil_ops: None,
        }),
        occlusion_query_set: None,
        timestamp_writes: None,
        label: None,
      });
      for (draw, (_, uniforms)) in draws.iter().zip(&self.uniforms) {
        let Some(textures) = self.bind_groups.get(&draw.textures) else {
          continue;
        };
        render_pass.set_pipeline(match draw.pass {
          Pass::Skin => &self.skin,
          Pass::Shell => &self.shell,
        });
        render_pass.set_bind_group(0, uniforms, &[]);
        render_pass.set_bind_group(1, textures, &[]);
        let s = draw.streams;
        for (slot, buf) in [s.positions, s.uvs, s.normals].into_iter().enumerate() {
          if let Some(buf) = self.buffers.get(buf.0) {
            render_pass.set_vertex_buffer(slot as u32, buf.slice(..));
          }
        }
        render_pass.draw(0..draw.vertex_count, 0..1);
      }
    }
    self.queue.submit([encoder.finish()]);
    surface.present();
    Ok(())
  }

  fn texture_bind_group(&mut self, textures: [Option<TextureId>; 2]) {
    if self.bind_groups.contains_key(&textures) {
      return;
    }
    let [a, b] = textures.map(|t| {
      t.and_then(|t| self.textures.get(t.0))
        .unwrap_or(&self.white)
    });
    let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
      layout: &self.texture_layout,
      entries: &[
        wgpu::BindGroupEntry {
          binding: 0,
          resource: wgpu::BindingResource::TextureView(&a.view),
        },
        wgpu::BindGroupEntry {
          binding: 1,
          resource: wgpu::BindingResource::Sampler(&a.sampler),
        },
        wgpu::BindGroupEntry {
          binding: 2,
          resource: wgpu::BindingResource::TextureView(&b.view),
        },
        wgpu::BindGroupEntry {
          binding: 3,
          resource: wgpu::BindingResource::Sampler(&b.sampler),
        },
      ],
      label: None,
    });
    self.bind_groups.insert(textures, bind_group);
  }
}

impl Gpu for Renderer {
  fn upload(&mut self, data: &[u8]) -> BufferId {
    let buf = self
      .device
      .create_buffer_init(&wgpu::util::BufferInitDescriptor {
        contents: data,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        label: None,
      });
    BufferId(self.buffers.insert(buf))
  }

  fn rewrite(&mut self, buf: BufferId, data: &[u8]) {
    let Some(Some(b)) = self.buffers.0.get_mut(buf.0 as usize) else {
      warn!("rewrite of released buffer {}", buf.0);
      return;
    };
    if b.size() == data.len() as u64 {
      self.queue.write_buffer(b, 0, data);
    } else {
      *b = self
        .device
        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
          contents: data,
          usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
          label: None,
        });
    }
  }

  fn release_buffer(&mut self, buf: BufferId) {
    if let Some(b) = self.buffers.remove(buf.0) {
      b.destroy();
    }
  }

  fn create_texture(&mut self, pixels: &[u8], desc: TextureDesc) -> TextureId {
    let tex = Texture::new(&self.device, &self.queue, pixels, desc);
    TextureId(self.textures.insert(tex))
  }

  fn release_texture(&mut self, tex: TextureId) {
    self
      .bind_groups
      .retain(|k, _| !k.contains(&Some(tex)));
    if let Some(t) = self.textures.remove(tex.0) {
      t.texture.destroy();
    }
  }

  fn draw(&mut self, draw: Draw) {
    self.draws.push(draw);
  }
}

fn pipeline(
  device: &wgpu::Device,
  layout: &wgpu::PipelineLayout,
  source: wgpu::ShaderSource,
  pass: Pass,
) -> wgpu::RenderPipeline {
  let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
    source,
    label: None,
  });
  let state = pass.state();
  device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
    layout: Some(layout),
    vertex: wgpu::VertexState {
      module: &shader,
      entry_point: "main_v",
      buffers: &[
        wgpu::VertexBufferLayout {
          array_stride: 12,
          step_mode: wgpu::VertexStepMode::Vertex,
          attributes: &POSITION,
        },
        wgpu::VertexBufferLayout {
          array_stride: 8,
          step_mode: wgpu::VertexStepMode::Vertex,
          attributes: &UV,
        },
        wgpu::VertexBufferLayout {
          array_stride: 12,
          step_mode: wgpu::VertexStepMode::Vertex,
          attributes: &NORMAL,
        },
      ],
    },
    fragment: Some(wgpu::FragmentState {
      module: &shader,
      entry_point: "main_f",
      targets: &[Some(wgpu::ColorTargetState {
        format: FORMAT,
        blend: Some(if state.alpha_blend {
          wgpu::BlendState::ALPHA_BLENDING
        } else {
          wgpu::BlendState::REPLACE
        }),
        write_mask: wgpu::ColorWrites::ALL,
      })],
    }),
    primitive: wgpu::PrimitiveState {
      cull_mode: state.cull_back_faces.then_some(wgpu::Face::Back),
      ..Default::default()
    },
    depth_stencil: Some(wgpu::DepthStencilState {
      format: DEPTH_FORMAT,
      depth_write_enabled: state.depth_write,
      depth_compare: if state.depth_test {
        wgpu::CompareFunction::Less
      } else {
        wgpu::CompareFunction::Always
      },
      stencil: wgpu::StencilState::default(),
      bias: wgpu::DepthBiasState::default(),
    }),
    multisample: wgpu::MultisampleState {
      count: SAMPLES,
      mask: !0,
      alpha_to_coverage_enabled: false,
    },
    multiview: None,
    label: None,
  })
}
