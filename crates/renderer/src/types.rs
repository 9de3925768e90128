use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::compile::ShaderSources;
use crate::filter::{builtin_kernels, builtin_palettes, FilterMode, Kernel, Palette};

/// Output surface size used when the caller does not request one.
pub const DEFAULT_SURFACE_SIZE: (u32, u32) = (500, 500);

/// How the renderer should present frames.
///
/// * `Windowed` opens a `winit` preview window that shows the output surface
///   and reacts to filter hotkeys and dropped files.
/// * `Export` renders once without a window and writes the surface to a PNG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderMode {
    Windowed,
    Export { path: PathBuf },
}

/// Controls how GPU resources are reused between renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Keep the linked pipeline for the process and the image texture until a
    /// different image is rendered. Repeated identical requests are no-ops.
    #[default]
    OnDemand,
    /// Rebuild program, buffers and textures on every render.
    Disabled,
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheMode::OnDemand => f.write_str("on-demand"),
            CacheMode::Disabled => f.write_str("disabled"),
        }
    }
}

impl FromStr for CacheMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "on-demand" | "ondemand" | "on" => Ok(CacheMode::OnDemand),
            "disabled" | "off" | "none" => Ok(CacheMode::Disabled),
            other => Err(format!(
                "unknown cache mode '{other}' (expected on-demand or disabled)"
            )),
        }
    }
}

/// Named kernels and palettes the preview window cycles through.
#[derive(Debug, Clone)]
pub struct FilterPresets {
    pub kernels: Vec<(String, Kernel)>,
    pub palettes: Vec<Palette>,
}

impl Default for FilterPresets {
    fn default() -> Self {
        Self {
            kernels: builtin_kernels()
                .into_iter()
                .map(|(name, kernel)| (name.to_string(), kernel))
                .collect(),
            palettes: builtin_palettes(),
        }
    }
}

/// Immutable configuration passed to the renderer at start-up.
///
/// `RendererConfig` mirrors CLI flags and tells the renderer which image to
/// load, how large the output surface should be, and which presentation mode
/// to use.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Output surface size in physical pixels.
    pub surface_size: (u32, u32),
    /// Image decoded at start-up; the window also accepts dropped files.
    pub image: Option<PathBuf>,
    /// Filter applied to the first frame.
    pub filter: FilterMode,
    /// Presentation mode (preview window vs one-shot export).
    pub mode: RenderMode,
    pub cache_mode: CacheMode,
    /// Shader text compiled for the filter program.
    pub shaders: ShaderSources,
    pub presets: FilterPresets,
}

impl Default for RendererConfig {
    /// Provides a 500x500 windowed configuration with no image selected.
    fn default() -> Self {
        Self {
            surface_size: DEFAULT_SURFACE_SIZE,
            image: None,
            filter: FilterMode::None,
            mode: RenderMode::Windowed,
            cache_mode: CacheMode::default(),
            shaders: ShaderSources::default(),
            presets: FilterPresets::default(),
        }
    }
}
