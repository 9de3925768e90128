use std::path::PathBuf;

use crate::compile::StageKind;

/// Failures surfaced by the filter pipeline.
///
/// Compile and link failures are contained to the render attempt that
/// produced them: the orchestrator logs the diagnostic, moves to
/// [`FrameState::Failed`](crate::FrameState::Failed) and leaves the output
/// surface untouched.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("{stage} shader failed to compile:\n{log}")]
    ShaderCompile { stage: StageKind, log: String },

    #[error("shader program failed to link:\n{log}")]
    ProgramLink { log: String },

    #[error("vertex attribute `{name}` is not declared by the shader program")]
    AttributeNotFound { name: String },

    #[error("failed to load image {path}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("render requested before an image was loaded")]
    NoImage,

    #[error("image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("image data length {actual} does not match {width}x{height} RGBA ({expected} bytes)")]
    ImageDataMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("{width}x{height} exceeds the GPU texture limit of {max}")]
    TextureTooLarge { width: u32, height: u32, max: u32 },

    #[error("GPU setup failed: {0}")]
    Gpu(String),

    #[error("image decode worker failed: {0}")]
    Worker(String),

    #[error("GPU rejected the render pipeline:\n{0}")]
    Pipeline(String),

    #[error("failed to read back the output surface: {0}")]
    Readback(String),

    #[error("failed to write {path}")]
    Export {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl RenderError {
    /// True when the failure came from building the shader program, i.e. the
    /// render aborted before any GPU resource was touched.
    pub fn is_program_error(&self) -> bool {
        matches!(
            self,
            RenderError::ShaderCompile { .. } | RenderError::ProgramLink { .. }
        )
    }
}

pub type RenderResult<T> = Result<T, RenderError>;
