// gpu/reduce.rs — Stage 2: WeightedReducer.
//
// Turns the W×H assignment raster into the N×H accumulator: one texel per
// (site, texture row) holding (Σx·w, Σy·w, count, Σw) over the pixels of
// that row owned by that site.
//
// GATHER, NOT SCATTER
// ────────────────────
// The obvious formulation, one thread per pixel adding into its site's
// slot, needs float atomics, which WGSL does not have. Instead the output
// is a render target and each fragment gathers: fragment (i, t) reads all
// W pixels of row t and keeps the ones whose id is i. That is O(N·W·H)
// texture loads per iteration, but every load in a row is shared by the N
// fragments of that row through the texture cache, and each output texel
// has exactly one writer.
//
// Positions are normalized inside the kernel with the same
// `(offset, scale)` pairs as the CPU reference (see config::Normalization).

use wgpu::util::DeviceExt;

use crate::config::Config;
use crate::gpu::device::{GpuDevice, GpuError};
use crate::gpu::texture::{upload_weights, GpuTexture};
use crate::lloyd::Accumulator;
use crate::weight::WeightField;

/// Format of the accumulator target.
pub const ACCUM_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

// Must match struct ReduceParams in reduce.wgsl.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct ReduceParams {
    width: u32,
    height: u32,
    x_offset: f32,
    y_offset: f32,
    x_scale: f32,
    y_scale: f32,
    site_count: u32,
    _pad: u32,
}

/// GPU per-(site, row) reduction.
///
/// Owns the uploaded weight texture and the N×H accumulator target.
pub struct WeightedReducer {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    _params_buf: wgpu::Buffer,
    _weights: GpuTexture,
    accum: GpuTexture,
}

impl WeightedReducer {
    /// Upload `weights` and build the reduction pass reading `ids`.
    pub fn new(
        gpu: &GpuDevice,
        config: &Config,
        weights: &WeightField,
        ids: &wgpu::TextureView,
    ) -> Result<Self, GpuError> {
        let weight_tex = upload_weights(gpu, weights)?;
        let accum = GpuTexture::new(
            gpu,
            "accumulator",
            config.samples,
            config.height,
            ACCUM_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
        )?;

        let (x_offset, x_scale) = config.normalization.offset_and_scale(config.width);
        let (y_offset, y_scale) = config.normalization.offset_and_scale(config.height);
        let params = ReduceParams {
            width: config.width,
            height: config.height,
            x_offset,
            y_offset,
            x_scale,
            y_scale,
            site_count: config.samples,
            _pad: 0,
        };
        let params_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("reduce params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let (pipeline, bind_group) = gpu.validated("weighted reducer", |device| {
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("reduce.wgsl"),
                source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/reduce.wgsl").into()),
            });

            let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("reduce BGL"),
                entries: &[
                    // 0 — assignment raster (Rgba8Uint)
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
                    // 1 — weight field (R32Float, not filterable)
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            multisampled: false,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        },
                        count: None,
                    },
                    // 2 — params uniform
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::FRAGMENT,
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
                label: Some("reduce BG"),
                layout: &bgl,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(ids) },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&weight_tex.view),
                    },
                    wgpu::BindGroupEntry { binding: 2, resource: params_buf.as_entire_binding() },
                ],
            });

            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("reduce pipeline layout"),
                bind_group_layouts: &[&bgl],
                push_constant_ranges: &[],
            });
            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("reduce pipeline"),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: "vs_fullscreen",
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: "fs_reduce",
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: ACCUM_FORMAT,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });
            (pipeline, bind_group)
        })?;

        Ok(WeightedReducer { pipeline, bind_group, _params_buf: params_buf, _weights: weight_tex, accum })
    }

    /// Record the reduction pass.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("reduce pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.accum.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.draw(0..3, 0..1);
    }

    /// The accumulator, for binding in the feedback stage.
    pub fn accum_view(&self) -> &wgpu::TextureView {
        &self.accum.view
    }

    /// Read the accumulator back.
    pub fn readback(&self, gpu: &GpuDevice) -> Accumulator {
        let bytes = self.accum.read(gpu, 16);
        let texels: Vec<[f32; 4]> = bytes.chunks_exact(16).map(bytemuck::pod_read_unaligned).collect();
        Accumulator::from_texels(self.accum.width as usize, self.accum.height as usize, texels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Normalization;
    use crate::gpu::cone::ConeRasterizer;
    use crate::gpu::run_gpu_test_in_subprocess;
    use crate::gpu::sites::GpuSites;
    use crate::lloyd;
    use crate::site::Site;

    #[test]
    fn test_params_layout() {
        assert_eq!(std::mem::size_of::<ReduceParams>(), 32);
    }

    fn assert_close(a: [f32; 4], b: [f32; 4], what: &str) {
        for c in 0..4 {
            let tol = 1e-4 * b[c].abs().max(1.0);
            assert!((a[c] - b[c]).abs() <= tol, "{what}: GPU {a:?} vs CPU {b:?}");
        }
    }

    // Inner tests ─────────────────────────────────────────────────────────────

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_reduce_matches_cpu() {
        // Sites on a 3×2 grid: no pixel is near a tie, so the GPU raster
        // equals the CPU one and the sums must agree.
        let sites: Vec<Site> = [(0.2, 0.3), (0.5, 0.25), (0.8, 0.3), (0.2, 0.75), (0.5, 0.7), (0.8, 0.8)]
            .iter()
            .map(|&(x, y)| Site::new(x, y))
            .collect();
        let weights: Vec<f32> = (0..90 * 60).map(|i| ((i * 37) % 101) as f32 / 100.0).collect();
        let wf = WeightField::from_weights(90, 60, weights);

        for normalization in [Normalization::Size, Normalization::SizeMinusOne] {
            let config = Config::new(90, 60, 6).unwrap().with_normalization(normalization);
            let gpu = GpuDevice::new().expect("need a GPU");
            let buf = GpuSites::upload(&gpu, &sites);
            let cone = ConeRasterizer::new(&gpu, &config).expect("cone stage");
            let reducer = WeightedReducer::new(&gpu, &config, &wf, cone.ids_view()).expect("reduce stage");

            let mut encoder = gpu.device.create_command_encoder(&Default::default());
            cone.encode(&mut encoder, &buf);
            reducer.encode(&mut encoder);
            gpu.queue.submit(std::iter::once(encoder.finish()));

            let raster = cone.readback(&gpu);
            let gpu_acc = reducer.readback(&gpu);
            let cpu_acc = lloyd::reduce(&raster, &wf, sites.len(), normalization);
            assert_eq!((gpu_acc.sites(), gpu_acc.rows()), (6, 60));
            for row in 0..60 {
                for site in 0..6 {
                    assert_close(gpu_acc.get(site, row), cpu_acc.get(site, row), "texel");
                }
            }
        }

        println!("GPU_TEST_OK");
    }

    // Outer wrappers ──────────────────────────────────────────────────────────

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_reduce_matches_cpu() {
        let out = run_gpu_test_in_subprocess("gpu::reduce::tests::inner_reduce_matches_cpu");
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }
}
