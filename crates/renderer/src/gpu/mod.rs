//! GPU side of the filter pipeline.
//!
//! - `context` owns the wgpu instance, adapter, device and queue, and wraps
//!   fallible device calls in validation error scopes.
//! - `binder` uploads vertex data and textures and resolves named vertex
//!   inputs against a linked program.
//! - `uniforms` mirrors the fragment stage's std140 parameter block.
//! - `output` is the preserved offscreen surface the filter draws into, plus
//!   host readback for export.
//! - `orchestrator` drives one render: program, bindings, uniforms, draw. It
//!   also owns the resource cache.
//! - `present` blits the output surface onto a window swapchain.

pub mod binder;
mod context;
mod orchestrator;
mod output;
mod present;
mod uniforms;

pub use context::{AdapterProfile, GpuContext};
pub use orchestrator::{FrameOrchestrator, FrameState, RenderOutcome};
pub use output::{OutputSurface, OUTPUT_FORMAT};
pub(crate) use present::Presenter;
pub use uniforms::FilterUniforms;
