// gpu/texture.rs — Texture upload and CPU readback helpers.
//
// Every stage that moves pixels across the bus goes through here:
//
//   upload_weights()  WeightField → R32Float texture (once, at start-up)
//   read_texture()    any 2D texture → tightly packed bytes (preview, tests)
//   read_buffer()     storage buffer → bytes (site readback)
//
// wgpu's buffer↔texture copies require `bytes_per_row` to be a multiple of
// 256 (`COPY_BYTES_PER_ROW_ALIGNMENT`). Staging rows are padded to that
// width and the padding is stripped again on readback:
//
//   staging row: [p0 p1 … p(W−1) | zero padding up to a 256-byte boundary]
//
// Readback is synchronous: submit, request the map, poll the device until
// the callback fires. It stalls the GPU timeline and is only used at the
// end of an iteration, for the preview frame, or in tests.

use wgpu::util::DeviceExt;

use crate::gpu::device::GpuDevice;
use crate::weight::WeightField;

/// Row pitch alignment for buffer↔texture copies.
const COPY_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

/// A 2D texture and its default view.
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl GpuTexture {
    /// Allocate an uninitialised 2D texture.
    pub fn new(
        gpu: &GpuDevice,
        label: &'static str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Result<Self, crate::gpu::GpuError> {
        gpu.check_texture_size(label, width, height)?;
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(GpuTexture { texture, view, width, height })
    }

    /// Read the whole texture back, `bytes_per_pixel` bytes per texel.
    pub fn read(&self, gpu: &GpuDevice, bytes_per_pixel: u32) -> Vec<u8> {
        read_texture(gpu, &self.texture, self.width, self.height, bytes_per_pixel)
    }
}

/// Upload the weight field as an `R32Float` texture.
///
/// The texture keeps the top-down row order of the field; shaders flip
/// rows with `H − 1 − t` when they need bottom-up coordinates.
pub fn upload_weights(gpu: &GpuDevice, weights: &WeightField) -> Result<GpuTexture, crate::gpu::GpuError> {
    let width = weights.width() as u32;
    let height = weights.height() as u32;
    let target = GpuTexture::new(
        gpu,
        "weight field",
        width,
        height,
        wgpu::TextureFormat::R32Float,
        wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::COPY_SRC,
    )?;

    let row_bytes = width as usize * 4;
    let aligned_bytes_per_row = align_to(width * 4, COPY_ALIGNMENT);
    let mut staging = vec![0u8; aligned_bytes_per_row as usize * height as usize];
    let src: &[u8] = bytemuck::cast_slice(weights.as_slice());
    for y in 0..height as usize {
        let dst = y * aligned_bytes_per_row as usize;
        staging[dst..dst + row_bytes].copy_from_slice(&src[y * row_bytes..(y + 1) * row_bytes]);
    }

    let staging_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("weight field staging"),
        contents: &staging,
        usage: wgpu::BufferUsages::COPY_SRC,
    });

    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("upload_weights") });
    encoder.copy_buffer_to_texture(
        wgpu::ImageCopyBuffer {
            buffer: &staging_buf,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(aligned_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::ImageCopyTexture {
            texture: &target.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
    );
    gpu.queue.submit(std::iter::once(encoder.finish()));

    log::debug!("uploaded {width}×{height} weight field");
    Ok(target)
}

/// Read a 2D texture back to CPU memory.
///
/// Returns `width * height * bytes_per_pixel` bytes, row-major, top row
/// first, with the copy padding removed.
pub fn read_texture(
    gpu: &GpuDevice,
    texture: &wgpu::Texture,
    width: u32,
    height: u32,
    bytes_per_pixel: u32,
) -> Vec<u8> {
    let row_bytes = (width * bytes_per_pixel) as usize;
    let aligned_bytes_per_row = align_to(width * bytes_per_pixel, COPY_ALIGNMENT);
    let readback_size = aligned_bytes_per_row as u64 * height as u64;

    let readback_buf = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("texture readback"),
        size: readback_size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("read_texture") });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &readback_buf,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(aligned_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
    );
    gpu.queue.submit(std::iter::once(encoder.finish()));

    let mapped = map_read(gpu, &readback_buf);
    let mut out = vec![0u8; row_bytes * height as usize];
    for y in 0..height as usize {
        let src = y * aligned_bytes_per_row as usize;
        out[y * row_bytes..(y + 1) * row_bytes].copy_from_slice(&mapped[src..src + row_bytes]);
    }
    out
}

/// Copy `size` bytes of a `COPY_SRC` buffer back to CPU memory.
pub fn read_buffer(gpu: &GpuDevice, buffer: &wgpu::Buffer, size: u64) -> Vec<u8> {
    let readback_buf = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("buffer readback"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("read_buffer") });
    encoder.copy_buffer_to_buffer(buffer, 0, &readback_buf, 0, size);
    gpu.queue.submit(std::iter::once(encoder.finish()));
    map_read(gpu, &readback_buf)
}

/// Map a `MAP_READ` buffer, wait for it, copy it out and unmap.
fn map_read(gpu: &GpuDevice, buffer: &wgpu::Buffer) -> Vec<u8> {
    let slice = buffer.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        sender.send(result).expect("readback channel closed");
    });
    gpu.wait();
    receiver
        .recv()
        .expect("readback map callback never fired")
        .expect("readback map failed");

    let mapped = slice.get_mapped_range();
    let out = mapped.to_vec();
    drop(mapped);
    buffer.unmap();
    out
}

/// Round `value` up to the next multiple of `alignment`.
///
///   align_to(100, 256) = 256
///   align_to(256, 256) = 256
///   align_to(257, 256) = 512
#[inline]
pub(crate) fn align_to(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) / alignment * alignment
}
