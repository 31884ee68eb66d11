// gpu/cone.rs — Stage 1: ConeRasterizer.
//
// Labels every pixel of a W×H raster with the index of its nearest site.
//
// THE CONE TRICK
// ───────────────
// Seen from above, a right circular cone whose apex sits on a site has a
// height proportional to the distance from that site. Draw one cone per
// site with a depth test and the surface nearest the camera at every pixel
// belongs to the nearest site: the visible cone colours are the Voronoi
// diagram. Depth does the min-reduction for free.
//
//   apex   (0, 0, 0)          depth 0
//   rim    (cos θ, sin θ, 1)  depth 1,  θ = 2πk / R,  k = 0..=R
//
// The mesh is a triangle fan of R triangles over R + 2 vertices (the
// closing rim vertex repeats the first). The polygon only approximates a
// circle, so cells whose boundary is nearly parallel to a rim edge may be
// off by a pixel; larger R shrinks the error.
//
// COVERAGE
// ─────────
// Cones are scaled by `CONE_RADIUS` clip units before the aspect scale. The
// farthest viewport point from any apex is 2√2 ≈ 2.83 clip units away along
// the long axis; the inscribed radius of an R ≥ 8 polygon of radius 4 is
// 4·cos(π/8) ≈ 3.70. Every pixel is therefore covered by every cone and
// the depth test alone decides ownership.
//
// Ties between equidistant sites resolve to the earlier instance: `Less`
// rejects equal depths, and instances rasterize in submission order.

use wgpu::util::DeviceExt;

use crate::config::Config;
use crate::gpu::device::{GpuDevice, GpuError};
use crate::gpu::sites::GpuSites;
use crate::gpu::texture::GpuTexture;
use crate::id::decode_raster;
use crate::image::Image;

/// Cone radius in clip units, before aspect scaling.
pub const CONE_RADIUS: f32 = 4.0;

/// Format of the assignment raster.
pub const ID_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Uint;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

// Must match struct ConeParams in cone.wgsl.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct ConeParams {
    scale: [f32; 2],
    radius: f32,
    _pad: f32,
}

/// Build the cone fan: `resolution + 2` vertices, `3 * resolution` indices.
///
/// Vertex 0 is the apex. Rim vertex `k` (1-based) sits at angle
/// `2π(k − 1) / resolution`; the last one closes the fan.
pub fn cone_mesh(resolution: u32) -> (Vec<[f32; 3]>, Vec<u32>) {
    let mut vertices = Vec::with_capacity(resolution as usize + 2);
    vertices.push([0.0, 0.0, 0.0]);
    for k in 0..=resolution {
        let theta = std::f32::consts::TAU * k as f32 / resolution as f32;
        vertices.push([theta.cos(), theta.sin(), 1.0]);
    }

    let mut indices = Vec::with_capacity(3 * resolution as usize);
    for k in 0..resolution {
        indices.extend_from_slice(&[0, k + 1, k + 2]);
    }
    (vertices, indices)
}

/// GPU nearest-site rasterizer.
///
/// Owns the cone mesh, the W×H id target and its depth buffer. Create once
/// per run; call [`ConeRasterizer::encode`] every iteration.
pub struct ConeRasterizer {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    _params_buf: wgpu::Buffer,
    vertex_buf: wgpu::Buffer,
    index_buf: wgpu::Buffer,
    index_count: u32,
    ids: GpuTexture,
    depth: GpuTexture,
}

impl ConeRasterizer {
    pub fn new(gpu: &GpuDevice, config: &Config) -> Result<Self, GpuError> {
        let ids = GpuTexture::new(
            gpu,
            "assignment raster",
            config.width,
            config.height,
            ID_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
        )?;
        let depth = GpuTexture::new(
            gpu,
            "cone depth",
            config.width,
            config.height,
            DEPTH_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        )?;

        let (vertices, indices) = cone_mesh(config.resolution);
        let vertex_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("cone vertices"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("cone indices"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let params = ConeParams { scale: [config.sx, config.sy], radius: CONE_RADIUS, _pad: 0.0 };
        let params_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("cone params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let (pipeline, bind_group) = gpu.validated("cone rasterizer", |device| {
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("cone.wgsl"),
                source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/cone.wgsl").into()),
            });

            let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("cone BGL"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("cone BG"),
                layout: &bgl,
                entries: &[wgpu::BindGroupEntry { binding: 0, resource: params_buf.as_entire_binding() }],
            });

            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("cone pipeline layout"),
                bind_group_layouts: &[&bgl],
                push_constant_ranges: &[],
            });

            let cone_attributes = wgpu::vertex_attr_array![0 => Float32x3];
            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("cone pipeline"),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: "vs_cone",
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &[
                        wgpu::VertexBufferLayout {
                            array_stride: std::mem::size_of::<[f32; 3]>() as u64,
                            step_mode: wgpu::VertexStepMode::Vertex,
                            attributes: &cone_attributes,
                        },
                        GpuSites::instance_layout(),
                    ],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: "fs_cone",
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: ID_FORMAT,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    // Cones are viewed apex-on; no face is a back face.
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });
            (pipeline, bind_group)
        })?;

        Ok(ConeRasterizer {
            pipeline,
            bind_group,
            _params_buf: params_buf,
            vertex_buf,
            index_buf,
            index_count: 3 * config.resolution,
            ids,
            depth,
        })
    }

    /// Record the cone pass: clear, then draw one cone per site.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, sites: &GpuSites) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("cone pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.ids.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Discard,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.set_vertex_buffer(0, self.vertex_buf.slice(..));
        pass.set_vertex_buffer(1, sites.buffer.slice(..));
        pass.set_index_buffer(self.index_buf.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.index_count, 0, 0..sites.count);
    }

    /// The id raster, for binding in later stages.
    pub fn ids_view(&self) -> &wgpu::TextureView {
        &self.ids.view
    }

    /// Read the assignment raster back and decode the ids.
    pub fn readback(&self, gpu: &GpuDevice) -> Image<u32> {
        let bytes = self.ids.read(gpu, 4);
        Image::from_vec(self.ids.width as usize, self.ids.height as usize, decode_raster(&bytes))
    }
}
