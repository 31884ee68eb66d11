// gpu/feedback.rs — Stage 3: CentroidFeedback.
//
// A compute pass with one invocation per site. Each invocation adds up its
// column of the N×H accumulator and writes the weighted centroid and mass
// straight into the site buffer, which the next iteration's cone pass
// reads as instance data. The sites never round-trip through the CPU.
//
// The zero-weight guard lives in the shader: if Σw == 0 the position is
// left untouched and mass becomes 0.

use wgpu::util::DeviceExt;

use crate::config::Config;
use crate::gpu::device::{dispatch_count, GpuDevice, GpuError};
use crate::gpu::sites::GpuSites;

/// Invocations per workgroup.
const WG_SIZE: u32 = 64;

// Must match struct FeedbackParams in feedback.wgsl.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct FeedbackParams {
    site_count: u32,
    rows: u32,
    _pad: [u32; 2],
}

pub struct CentroidFeedback {
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    _params_buf: wgpu::Buffer,
    site_count: u32,
}

impl CentroidFeedback {
    /// Build the pass reading `accum` and writing `sites`.
    pub fn new(
        gpu: &GpuDevice,
        config: &Config,
        accum: &wgpu::TextureView,
        sites: &GpuSites,
    ) -> Result<Self, GpuError> {
        let params = FeedbackParams { site_count: config.samples, rows: config.height, _pad: [0; 2] };
        let params_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("feedback params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let shader_src = include_str!("../shaders/feedback.wgsl").replace("{{WG_X}}", &WG_SIZE.to_string());

        let (pipeline, bind_group) = gpu.validated("centroid feedback", |device| {
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("feedback.wgsl"),
                source: wgpu::ShaderSource::Wgsl(shader_src.into()),
            });

            let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("feedback BGL"),
                entries: &[
                    // 0 — accumulator (Rgba32Float, not filterable)
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Texture {
                            multisampled: false,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        },
                        count: None,
                    },
                    // 1 — sites (storage read_write)
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: false },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    // 2 — params uniform
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::COMPUTE,
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
                label: Some("feedback BG"),
                layout: &bgl,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(accum) },
                    wgpu::BindGroupEntry { binding: 1, resource: sites.buffer.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 2, resource: params_buf.as_entire_binding() },
                ],
            });

            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("feedback pipeline layout"),
                bind_group_layouts: &[&bgl],
                push_constant_ranges: &[],
            });
            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("feedback"),
                layout: Some(&layout),
                module: &shader,
                entry_point: "feedback",
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            });
            (pipeline, bind_group)
        })?;

        Ok(CentroidFeedback { pipeline, bind_group, _params_buf: params_buf, site_count: config.samples })
    }

    /// Record the feedback dispatch.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("feedback pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.dispatch_workgroups(dispatch_count(self.site_count, WG_SIZE), 1, 1);
    }
}
