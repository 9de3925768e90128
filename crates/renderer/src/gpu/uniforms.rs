use bytemuck::{Pod, Zeroable};

use crate::filter::FilterMode;

/// std140 mirror of the fragment stage's `FilterParams` block.
///
/// Offsets: `u_kernel` 0, `pixel_jump_factor` 48, `kernel_weight` 56, `mode`
/// 60, `active_index` 64; the block is padded to 80 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct FilterUniforms {
    pub u_kernel: [[f32; 4]; 3],
    pub pixel_jump_factor: [f32; 2],
    pub kernel_weight: f32,
    pub mode: i32,
    pub active_index: f32,
    pub _padding: [f32; 3],
}

impl FilterUniforms {
    /// Packs `filter` for an image of `image_size` pixels.
    ///
    /// `pixel_jump_factor` is reserved: the shader derives the step from the
    /// bound texture, but the host still fills it for inspection.
    pub fn new(filter: &FilterMode, image_size: (u32, u32)) -> Self {
        let (width, height) = image_size;
        let (u_kernel, kernel_weight) = match filter.kernel() {
            Some(kernel) => (kernel.rows(), kernel.weight()),
            None => ([[0.0; 4]; 3], 1.0),
        };
        Self {
            u_kernel,
            pixel_jump_factor: [1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32],
            kernel_weight,
            mode: filter.selector(),
            active_index: 0.0,
            _padding: [0.0; 3],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}
