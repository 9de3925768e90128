//! Filter modes and their parameters.
//!
//! A [`FilterMode`] is one exclusive choice with the data only that choice
//! needs. The fragment shader receives it as a single integer selector, so two
//! modes can never be active at once.

mod kernel;
mod palette;
pub mod reference;

use std::fmt;

pub use kernel::{builtin_kernels, Kernel};
pub use palette::{builtin_palettes, Palette, DEFAULT_PALETTE_SIZE};

/// Luminance weights applied by [`FilterMode::Grayscale`] (R, G, B).
pub const LUMINANCE_WEIGHTS: [f32; 3] = [0.59, 0.30, 0.11];

#[derive(Debug, Clone, PartialEq, Default)]
pub enum FilterMode {
    /// Pass the source texel through unchanged.
    #[default]
    None,
    Grayscale,
    Inverse,
    /// 3x3 convolution over the clamped neighbourhood.
    Kernel(Kernel),
    /// Remap through a palette strip indexed by the red channel.
    ColorPalette(Palette),
}

impl FilterMode {
    /// Integer written to the shader's `mode` uniform.
    pub fn selector(&self) -> i32 {
        match self {
            FilterMode::None => 0,
            FilterMode::Grayscale => 1,
            FilterMode::Inverse => 2,
            FilterMode::Kernel(_) => 3,
            FilterMode::ColorPalette(_) => 4,
        }
    }

    pub fn kernel(&self) -> Option<&Kernel> {
        match self {
            FilterMode::Kernel(kernel) => Some(kernel),
            _ => None,
        }
    }

    pub fn palette(&self) -> Option<&Palette> {
        match self {
            FilterMode::ColorPalette(palette) => Some(palette),
            _ => None,
        }
    }

    /// Hashable fingerprint of the mode and its parameters, used to detect a
    /// repeated request for the frame already on screen.
    pub fn fingerprint(&self) -> FilterFingerprint {
        let mut words = vec![self.selector() as u32];
        if let Some(kernel) = self.kernel() {
            words.extend(kernel.weights().iter().map(|w| w.to_bits()));
            words.push(kernel.weight().to_bits());
        }
        if let Some(palette) = self.palette() {
            words.extend(palette.texels().iter().map(|t| u32::from_le_bytes(*t)));
        }
        FilterFingerprint(words)
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterMode::None => f.write_str("none"),
            FilterMode::Grayscale => f.write_str("grayscale"),
            FilterMode::Inverse => f.write_str("inverse"),
            FilterMode::Kernel(kernel) => write!(f, "kernel {kernel}"),
            FilterMode::ColorPalette(palette) => write!(f, "palette {}", palette.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterFingerprint(Vec<u32>);
