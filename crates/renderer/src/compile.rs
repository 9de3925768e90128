//! Shader program builder.
//!
//! Both stages are Vulkan-flavoured GLSL. They are parsed and validated on the
//! host with naga before any GPU object exists, so compile and link failures
//! surface as [`RenderError`] values carrying the compiler log instead of
//! device-lost panics. Linking checks the stage interface the way a GL linker
//! would: every fragment input location must be written by the vertex stage
//! with the same type.

use std::borrow::Cow;
use std::fmt;

use wgpu::naga;
use wgpu::naga::front::glsl;
use wgpu::naga::valid::{Capabilities, ValidationFlags, Validator};
use wgpu::naga::{Binding, Module, ShaderStage, TypeInner};

use crate::error::{RenderError, RenderResult};

/// Entry point name used by both GLSL stages.
pub const ENTRY_POINT: &str = "main";

/// Vertex input carrying quad positions.
pub const POSITION_ATTRIBUTE: &str = "position";
/// Vertex input carrying texture coordinates.
pub const TEXCOORD_ATTRIBUTE: &str = "texCoords";

/// Pipeline stage a shader source is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Vertex,
    Fragment,
}

impl StageKind {
    fn naga_stage(self) -> ShaderStage {
        match self {
            StageKind::Vertex => ShaderStage::Vertex,
            StageKind::Fragment => ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Vertex => f.write_str("vertex"),
            StageKind::Fragment => f.write_str("fragment"),
        }
    }
}

/// Source text for the two program stages.
///
/// The defaults are the built-in filter program; tests swap in broken sources
/// to exercise the failure path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderSources {
    pub vertex: Cow<'static, str>,
    pub fragment: Cow<'static, str>,
}

impl Default for ShaderSources {
    fn default() -> Self {
        Self {
            vertex: Cow::Borrowed(VERTEX_SHADER_GLSL),
            fragment: Cow::Borrowed(FRAGMENT_SHADER_GLSL),
        }
    }
}

/// A single parsed and validated stage.
#[derive(Debug, Clone)]
pub struct CompiledStage {
    kind: StageKind,
    source: String,
    module: Module,
}

impl CompiledStage {
    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    fn entry_point(&self) -> Option<&naga::EntryPoint> {
        let stage = self.kind.naga_stage();
        self.module
            .entry_points
            .iter()
            .find(|ep| ep.stage == stage && ep.name == ENTRY_POINT)
    }

    /// Creates the GPU-side module. The source already passed host validation,
    /// so any remaining error is a device limitation reported through the
    /// caller's error scope.
    pub(crate) fn create_module(&self, device: &wgpu::Device) -> wgpu::ShaderModule {
        let label = format!("texfilter {} stage", self.kind);
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&label),
            source: wgpu::ShaderSource::Glsl {
                shader: Cow::Owned(self.source.clone()),
                stage: self.kind.naga_stage(),
                defines: &[],
            },
        })
    }
}

/// Location and type of one vertex-stage input.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexInput {
    pub location: u32,
    pub ty: TypeInner,
}

/// Two compiled stages whose interfaces agree.
#[derive(Debug, Clone)]
pub struct Program {
    vertex: CompiledStage,
    fragment: CompiledStage,
}

impl Program {
    pub fn vertex(&self) -> &CompiledStage {
        &self.vertex
    }

    pub fn fragment(&self) -> &CompiledStage {
        &self.fragment
    }

    /// Looks up a named vertex input. `None` means the program does not declare
    /// the attribute.
    pub fn vertex_input(&self, name: &str) -> Option<VertexInput> {
        let ep = self.vertex.entry_point()?;
        ep.function.arguments.iter().find_map(|arg| {
            if arg.name.as_deref() != Some(name) {
                return None;
            }
            match arg.binding {
                Some(Binding::Location { location, .. }) => Some(VertexInput {
                    location,
                    ty: self.vertex.module.types[arg.ty].inner.clone(),
                }),
                _ => None,
            }
        })
    }
}

/// Parses and validates one stage.
///
/// Never panics: on failure the error carries the compiler's diagnostic text
/// rendered against the offending source.
pub fn compile(source: &str, kind: StageKind) -> RenderResult<CompiledStage> {
    let mut frontend = glsl::Frontend::default();
    let options = glsl::Options::from(kind.naga_stage());
    let module = frontend
        .parse(&options, source)
        .map_err(|errors| RenderError::ShaderCompile {
            stage: kind,
            log: errors.emit_to_string(source),
        })?;

    Validator::new(ValidationFlags::all(), Capabilities::default())
        .validate(&module)
        .map_err(|error| RenderError::ShaderCompile {
            stage: kind,
            log: error.emit_to_string(source),
        })?;

    tracing::debug!(
        stage = %kind,
        entry_points = module.entry_points.len(),
        globals = module.global_variables.len(),
        "compiled shader stage"
    );

    Ok(CompiledStage {
        kind,
        source: source.to_owned(),
        module,
    })
}

/// Links a vertex and a fragment stage into a program.
pub fn link(vertex: CompiledStage, fragment: CompiledStage) -> RenderResult<Program> {
    let mut problems = Vec::new();

    if vertex.kind != StageKind::Vertex {
        problems.push(format!("expected a vertex stage, got {}", vertex.kind));
    }
    if fragment.kind != StageKind::Fragment {
        problems.push(format!("expected a fragment stage, got {}", fragment.kind));
    }

    let vertex_ep = vertex.entry_point();
    let fragment_ep = fragment.entry_point();
    if vertex_ep.is_none() {
        problems.push(format!("vertex stage has no `{ENTRY_POINT}` entry point"));
    }
    if fragment_ep.is_none() {
        problems.push(format!("fragment stage has no `{ENTRY_POINT}` entry point"));
    }

    if let (Some(vertex_ep), Some(fragment_ep)) = (vertex_ep, fragment_ep) {
        let outputs = stage_outputs(&vertex.module, vertex_ep);
        for (location, ty) in stage_inputs(&fragment.module, fragment_ep) {
            match outputs.iter().find(|(out_location, _)| *out_location == location) {
                None => problems.push(format!(
                    "fragment input at location {location} is not written by the vertex stage"
                )),
                Some((_, out_ty)) if *out_ty != ty => problems.push(format!(
                    "location {location} type mismatch: vertex writes {out_ty:?}, fragment reads {ty:?}"
                )),
                Some(_) => {}
            }
        }
    }

    if !problems.is_empty() {
        return Err(RenderError::ProgramLink {
            log: problems.join("\n"),
        });
    }

    tracing::debug!("linked shader program");
    Ok(Program { vertex, fragment })
}

/// Compiles and links a full program from its sources.
pub fn build_program(sources: &ShaderSources) -> RenderResult<Program> {
    let vertex = compile(&sources.vertex, StageKind::Vertex)?;
    let fragment = compile(&sources.fragment, StageKind::Fragment)?;
    link(vertex, fragment)
}

fn stage_outputs(module: &Module, ep: &naga::EntryPoint) -> Vec<(u32, TypeInner)> {
    let Some(result) = ep.function.result.as_ref() else {
        return Vec::new();
    };
    located_values(module, result.ty, result.binding.as_ref())
}

fn stage_inputs(module: &Module, ep: &naga::EntryPoint) -> Vec<(u32, TypeInner)> {
    ep.function
        .arguments
        .iter()
        .flat_map(|arg| located_values(module, arg.ty, arg.binding.as_ref()))
        .collect()
}

/// Flattens a binding (or a struct of bound members) into location/type pairs.
/// Builtins are skipped; they are not part of the user interface.
fn located_values(
    module: &Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&Binding>,
) -> Vec<(u32, TypeInner)> {
    match binding {
        Some(Binding::Location { location, .. }) => {
            vec![(*location, module.types[ty].inner.clone())]
        }
        Some(Binding::BuiltIn(_)) => Vec::new(),
        None => match &module.types[ty].inner {
            TypeInner::Struct { members, .. } => members
                .iter()
                .filter_map(|member| match member.binding {
                    Some(Binding::Location { location, .. }) => {
                        Some((location, module.types[member.ty].inner.clone()))
                    }
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        },
    }
}

/// Quad vertex stage. The y axis is flipped so texture row 0 lands at the top
/// of the surface.
pub const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 position;
layout(location = 1) in vec2 texCoords;
layout(location = 0) out vec2 textureCoords;

void main() {
    gl_Position = vec4(position.x, position.y * -1.0, 0.0, 1.0);
    textureCoords = texCoords;
}
";

/// Filter stage. The uniform block layout must match
/// [`FilterUniforms`](crate::gpu::FilterUniforms); `mode` values match
/// [`FilterMode::selector`](crate::FilterMode::selector).
pub const FRAGMENT_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 textureCoords;
layout(location = 0) out vec4 color;

layout(std140, set = 0, binding = 0) uniform FilterParams {
    vec4 uKernel[3];
    vec2 pixelJumpFactor;
    float kernelWeight;
    int mode;
    float activeIndex;
} params;

layout(set = 1, binding = 0) uniform texture2D uImage;
layout(set = 1, binding = 1) uniform sampler uImageSampler;
layout(set = 1, binding = 2) uniform texture2D uColorPalette;
layout(set = 1, binding = 3) uniform sampler uColorPaletteSampler;

vec4 sampleImage(vec2 uv) {
    return textureLod(sampler2D(uImage, uImageSampler), uv, 0.0);
}

vec4 applyKernel() {
    vec2 jump = 1.0 / vec2(textureSize(sampler2D(uImage, uImageSampler), 0));
    vec4 values =
        sampleImage(textureCoords + jump * vec2(-1.0, -1.0)) * params.uKernel[0].x +
        sampleImage(textureCoords + jump * vec2( 0.0, -1.0)) * params.uKernel[0].y +
        sampleImage(textureCoords + jump * vec2( 1.0, -1.0)) * params.uKernel[0].z +
        sampleImage(textureCoords + jump * vec2(-1.0,  0.0)) * params.uKernel[1].x +
        sampleImage(textureCoords + jump * vec2( 0.0,  0.0)) * params.uKernel[1].y +
        sampleImage(textureCoords + jump * vec2( 1.0,  0.0)) * params.uKernel[1].z +
        sampleImage(textureCoords + jump * vec2(-1.0,  1.0)) * params.uKernel[2].x +
        sampleImage(textureCoords + jump * vec2( 0.0,  1.0)) * params.uKernel[2].y +
        sampleImage(textureCoords + jump * vec2( 1.0,  1.0)) * params.uKernel[2].z;
    return vec4((values / params.kernelWeight).rgb, 1.0);
}

void main() {
    vec4 texel = sampleImage(textureCoords);
    if (params.mode == 1) {
        float luminance = texel.r * 0.59 + texel.g * 0.3 + texel.b * 0.11;
        texel = vec4(vec3(luminance), 1.0);
    } else if (params.mode == 2) {
        texel = vec4(vec3(1.0) - texel.rgb, 1.0);
    } else if (params.mode == 3) {
        texel = applyKernel();
    } else if (params.mode == 4) {
        texel = textureLod(sampler2D(uColorPalette, uColorPaletteSampler), vec2(texel.r, 0.0), 0.0);
    }
    color = texel;
}
";
