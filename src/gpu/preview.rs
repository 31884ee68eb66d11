// gpu/preview.rs — GPU composition of the interactive preview frame.
//
// Renders into a W×H Rgba8Unorm target in one pass with two draws:
//
//   1. fullscreen triangle  → every pixel tinted by the hash of its id
//   2. instanced disc fans  → a black marker on every site
//
// then reads the frame back as `0x00RRGGBB` words for the window. The CPU
// backend builds the same frame in preview::render.

use wgpu::util::DeviceExt;

use crate::config::Config;
use crate::gpu::cone::cone_mesh;
use crate::gpu::device::{GpuDevice, GpuError};
use crate::gpu::sites::GpuSites;
use crate::gpu::texture::GpuTexture;
use crate::preview::{pack_rgb, MARKER_MASS_FLOOR};

const PREVIEW_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

// Must match struct PreviewParams in preview.wgsl.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct PreviewParams {
    radius: [f32; 2],
    mass_floor: f32,
    _pad: f32,
}

impl PreviewParams {
    fn new(config: &Config) -> Self {
        // Pixel radius at mass 1, converted to clip units (2 / W per pixel).
        let px = config.base_radius * config.width.min(config.height) as f32;
        PreviewParams {
            radius: [2.0 * px / config.width as f32, 2.0 * px / config.height as f32],
            mass_floor: MARKER_MASS_FLOOR,
            _pad: 0.0,
        }
    }
}

pub struct GpuPreview {
    cells: wgpu::RenderPipeline,
    markers: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    _params_buf: wgpu::Buffer,
    fan_vertices: wgpu::Buffer,
    fan_indices: wgpu::Buffer,
    fan_index_count: u32,
    target: GpuTexture,
}

impl GpuPreview {
    /// Build the preview pass over the assignment raster `ids`.
    pub fn new(gpu: &GpuDevice, config: &Config, ids: &wgpu::TextureView) -> Result<Self, GpuError> {
        let target = GpuTexture::new(
            gpu,
            "preview",
            config.width,
            config.height,
            PREVIEW_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        )?;

        let (vertices, indices) = cone_mesh(config.resolution);
        let fan_vertices = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("marker vertices"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let fan_indices = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("marker indices"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let params_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("preview params"),
            contents: bytemuck::bytes_of(&PreviewParams::new(config)),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let (cells, markers, bind_group) = gpu.validated("preview", |device| {
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("preview.wgsl"),
                source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/preview.wgsl").into()),
            });

            let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("preview BGL"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            multisampled: false,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            sample_type: wgpu::TextureSampleType::Uint,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::VERTEX,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
            });
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("preview BG"),
                layout: &bgl,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(ids) },
                    wgpu::BindGroupEntry { binding: 1, resource: params_buf.as_entire_binding() },
                ],
            });
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("preview pipeline layout"),
                bind_group_layouts: &[&bgl],
                push_constant_ranges: &[],
            });

            let target_state = [Some(wgpu::ColorTargetState {
                format: PREVIEW_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })];

            let cells = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("preview cells"),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: "vs_fullscreen",
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: "fs_cells",
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets: &target_state,
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });

            let fan_attributes = wgpu::vertex_attr_array![0 => Float32x3];
            let markers = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("preview markers"),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: "vs_marker",
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &[
                        wgpu::VertexBufferLayout {
                            array_stride: std::mem::size_of::<[f32; 3]>() as u64,
                            step_mode: wgpu::VertexStepMode::Vertex,
                            attributes: &fan_attributes,
                        },
                        GpuSites::instance_layout(),
                    ],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: "fs_marker",
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets: &target_state,
                }),
                primitive: wgpu::PrimitiveState { cull_mode: None, ..Default::default() },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });
            (cells, markers, bind_group)
        })?;

        Ok(GpuPreview {
            cells,
            markers,
            bind_group,
            _params_buf: params_buf,
            fan_vertices,
            fan_indices,
            fan_index_count: indices.len() as u32,
            target,
        })
    }

    /// Record the preview pass.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, sites: &GpuSites) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("preview pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.target.view,
                resolve_target: None,
                ops: wgpu::Operations { load: wgpu::LoadOp::Clear(wgpu::Color::WHITE), store: wgpu::StoreOp::Store },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_bind_group(0, &self.bind_group, &[]);

        pass.set_pipeline(&self.cells);
        pass.draw(0..3, 0..1);

        pass.set_pipeline(&self.markers);
        pass.set_vertex_buffer(0, self.fan_vertices.slice(..));
        pass.set_vertex_buffer(1, sites.buffer.slice(..));
        pass.set_index_buffer(self.fan_indices.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.fan_index_count, 0, 0..sites.count);
    }

    /// Read the frame back as packed `0x00RRGGBB` pixels.
    pub fn read_frame(&self, gpu: &GpuDevice, out: &mut Vec<u32>) {
        let bytes = self.target.read(gpu, 4);
        out.clear();
        out.extend(bytes.chunks_exact(4).map(|p| pack_rgb([p[0], p[1], p[2]])));
    }
}
