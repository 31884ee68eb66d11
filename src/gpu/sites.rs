// gpu/sites.rs — The site buffer shared by every GPU stage.
//
// One buffer, three roles:
//
//   VERTEX   per-instance input of the cone and marker passes
//   STORAGE  `array<Site>` written in place by the feedback kernel
//   COPY_SRC readback of the final (or current) positions
//
// Because the feedback kernel rewrites this buffer on the GPU, the sites
// never leave device memory between iterations. The CPU reads them only
// when it needs them (export, tests).

use wgpu::util::DeviceExt;

use crate::gpu::device::GpuDevice;
use crate::gpu::texture::read_buffer;
use crate::site::Site;

/// Byte size of one `Site` record.
pub const SITE_STRIDE: u64 = std::mem::size_of::<Site>() as u64;

/// Per-instance vertex attributes read from the site buffer.
///
/// location 1: position (x, y), location 2: mass.
const INSTANCE_ATTRIBUTES: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![
    1 => Float32x2,
    2 => Float32,
];

pub struct GpuSites {
    pub buffer: wgpu::Buffer,
    pub count: u32,
}

impl GpuSites {
    /// Upload the initial sites.
    pub fn upload(gpu: &GpuDevice, sites: &[Site]) -> Self {
        let buffer = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("sites"),
            contents: bytemuck::cast_slice(sites),
            usage: wgpu::BufferUsages::VERTEX
                | wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
        });
        GpuSites { buffer, count: sites.len() as u32 }
    }

    /// Overwrite the buffer contents. `sites.len()` must equal `count`.
    pub fn write(&self, gpu: &GpuDevice, sites: &[Site]) {
        assert_eq!(sites.len() as u32, self.count, "site count mismatch");
        gpu.queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(sites));
    }

    /// Copy the current sites back to the CPU.
    pub fn readback(&self, gpu: &GpuDevice) -> Vec<Site> {
        let bytes = read_buffer(gpu, &self.buffer, self.size());
        bytes
            .chunks_exact(SITE_STRIDE as usize)
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.count as u64 * SITE_STRIDE
    }

    /// Vertex buffer layout for instanced passes.
    pub fn instance_layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: SITE_STRIDE,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &INSTANCE_ATTRIBUTES,
        }
    }
}
