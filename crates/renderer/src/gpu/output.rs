use image::RgbaImage;

use crate::error::{RenderError, RenderResult};

/// Format of the preserved output surface.
pub const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Offscreen render target that keeps its content between renders.
///
/// The filter pass draws here; the preview window blits it to the swapchain
/// and export reads it back. A failed render never touches it.
pub struct OutputSurface {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: (u32, u32),
}

impl OutputSurface {
    pub fn new(device: &wgpu::Device, (width, height): (u32, u32)) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("output surface"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OUTPUT_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            size: (width, height),
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Copies the surface into host memory, blocking until the GPU is done.
    pub fn read_back(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> RenderResult<RgbaImage> {
        let (width, height) = self.size;
        let layout = ReadbackLayout::new(width, height);

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("output readback"),
            size: layout.buffer_size(),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(layout.padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| RenderError::Readback(err.to_string()))?;
        receiver
            .recv()
            .map_err(|err| RenderError::Readback(err.to_string()))?
            .map_err(|err| RenderError::Readback(err.to_string()))?;

        let pixels = {
            let mapped = slice.get_mapped_range();
            layout.unpad(&mapped)
        };
        buffer.unmap();

        RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| RenderError::Readback("readback size mismatch".to_string()))
    }
}

/// Row layout of a texture-to-buffer copy. Buffer rows must be aligned to
/// `COPY_BYTES_PER_ROW_ALIGNMENT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReadbackLayout {
    pub bytes_per_row: u32,
    pub padded_bytes_per_row: u32,
    pub height: u32,
}

impl ReadbackLayout {
    pub fn new(width: u32, height: u32) -> Self {
        let bytes_per_row = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = bytes_per_row.div_ceil(align) * align;
        Self {
            bytes_per_row,
            padded_bytes_per_row,
            height,
        }
    }

    pub fn buffer_size(&self) -> u64 {
        self.padded_bytes_per_row as u64 * self.height as u64
    }

    pub fn unpad(&self, padded: &[u8]) -> Vec<u8> {
        let mut pixels = Vec::with_capacity((self.bytes_per_row * self.height) as usize);
        for row in padded
            .chunks(self.padded_bytes_per_row as usize)
            .take(self.height as usize)
        {
            pixels.extend_from_slice(&row[..self.bytes_per_row as usize]);
        }
        pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_pad_to_copy_alignment() {
        let layout = ReadbackLayout::new(500, 500);
        assert_eq!(layout.bytes_per_row, 2000);
        assert_eq!(layout.padded_bytes_per_row, 2048);
        assert_eq!(layout.buffer_size(), 2048 * 500);

        let aligned = ReadbackLayout::new(64, 2);
        assert_eq!(aligned.padded_bytes_per_row, 256);
    }

    #[test]
    fn unpad_drops_row_padding() {
        let layout = ReadbackLayout::new(2, 2);
        let mut padded = vec![0u8; layout.buffer_size() as usize];
        padded[..8].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        padded[256..264].copy_from_slice(&[9, 10, 11, 12, 13, 14, 15, 16]);
        assert_eq!(layout.unpad(&padded), (1..=16).collect::<Vec<u8>>());
    }
}
