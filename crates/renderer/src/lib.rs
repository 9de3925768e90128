//! Renderer crate for texfilter.
//!
//! Loads a raster image, runs it through one GPU filter (grayscale, inverse,
//! 3x3 convolution or palette remap) and presents the result. The flow is:
//!
//! ```text
//!   CLI / texfilter
//!          │ RendererConfig
//!          ▼
//!   Renderer::run ──▶ Session (image + filter) ──▶ FrameOrchestrator::render
//!          │                                             │
//!          │                                             ├─▶ compile::build_program
//!          │                                             ├─▶ gpu::binder (buffers, textures, attributes)
//!          │                                             └─▶ one quad draw ─▶ OutputSurface
//!          ▼
//!   winit preview (blit to swapchain)  or  PNG export (readback)
//! ```
//!
//! Shader compilation and linking happen on the host through naga, so a broken
//! shader surfaces as a [`RenderError`] before any GPU object is created and
//! the output surface keeps its previous frame.

pub mod compile;
mod error;
pub mod filter;
pub mod geometry;
pub mod gpu;
mod session;
mod source;
mod types;
mod window;

use anyhow::{Context, Result};

pub use compile::{ShaderSources, StageKind};
pub use error::{RenderError, RenderResult};
pub use filter::{FilterMode, Kernel, Palette};
pub use gpu::{FrameOrchestrator, FrameState, GpuContext, RenderOutcome};
pub use session::{DecodeNotifier, LoadEvent, Session};
pub use source::{ImageId, SourceImage};
pub use types::{CacheMode, FilterPresets, RenderMode, RendererConfig, DEFAULT_SURFACE_SIZE};

/// Entry point that picks between the preview window and one-shot export.
pub struct Renderer {
    config: RendererConfig,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn run(&mut self) -> Result<()> {
        match self.config.mode.clone() {
            RenderMode::Windowed => {
                tracing::info!(
                    width = self.config.surface_size.0,
                    height = self.config.surface_size.1,
                    filter = %self.config.filter,
                    "opening preview window"
                );
                window::run_window(self.config.clone())
            }
            RenderMode::Export { path } => {
                let image_path = self
                    .config
                    .image
                    .as_deref()
                    .context("export needs an input image")?;

                let mut session = Session::new(self.config.filter.clone());
                session.load_blocking(image_path)?;

                let context = GpuContext::headless()?;
                let mut orchestrator = FrameOrchestrator::new(
                    context,
                    self.config.surface_size,
                    self.config.shaders.clone(),
                    self.config.cache_mode,
                )?;
                session.render(&mut orchestrator)?;
                orchestrator
                    .export_png(&path)
                    .with_context(|| format!("failed to export {}", path.display()))?;
                Ok(())
            }
        }
    }
}
