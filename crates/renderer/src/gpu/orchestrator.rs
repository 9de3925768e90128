use std::path::Path;

use image::RgbaImage;

use crate::compile::{build_program, Program, ShaderSources, POSITION_ATTRIBUTE, TEXCOORD_ATTRIBUTE};
use crate::error::{RenderError, RenderResult};
use crate::filter::{FilterFingerprint, FilterMode, Palette};
use crate::geometry::{self, COMPONENTS_PER_VERTEX};
use crate::source::{ImageId, SourceImage};
use crate::types::CacheMode;

use super::binder::{
    bind_attribute, create_buffer, create_palette_texture, create_texture, AttributeSpec,
    ImageTexture,
};
use super::context::GpuContext;
use super::output::{OutputSurface, OUTPUT_FORMAT};
use super::uniforms::FilterUniforms;

/// Where the orchestrator is in the render of the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Compiling,
    Bound,
    Rendered,
    Failed,
}

/// Result of a render request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// A draw was issued into the output surface.
    Drawn,
    /// The request matched the frame already on the surface.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FrameKey {
    image: ImageId,
    filter: FilterFingerprint,
}

/// Linked program plus the pipeline built from it.
struct FilterPipeline {
    pipeline: wgpu::RenderPipeline,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
}

struct QuadBuffers {
    positions: wgpu::Buffer,
    texcoords: wgpu::Buffer,
}

struct CachedImage {
    id: ImageId,
    texture: ImageTexture,
}

struct CachedPalette {
    palette: Palette,
    texture: ImageTexture,
}

/// Owns the GPU context and the preserved output surface, and turns
/// `(image, filter)` requests into a single full-screen quad draw.
///
/// Rendering is synchronous and takes `&mut self`, so requests never overlap.
pub struct FrameOrchestrator {
    context: GpuContext,
    output: OutputSurface,
    shaders: ShaderSources,
    cache_mode: CacheMode,
    state: FrameState,
    pipeline: Option<FilterPipeline>,
    quad: Option<QuadBuffers>,
    image: Option<CachedImage>,
    palette: Option<CachedPalette>,
    uniform_buffer: wgpu::Buffer,
    last_frame: Option<FrameKey>,
    draw_count: u64,
}

impl FrameOrchestrator {
    pub fn new(
        context: GpuContext,
        surface_size: (u32, u32),
        shaders: ShaderSources,
        cache_mode: CacheMode,
    ) -> RenderResult<Self> {
        context.check_dimensions(surface_size.0, surface_size.1)?;
        let output = OutputSurface::new(&context.device, surface_size);
        let uniform_buffer = context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("filter uniforms"),
            size: std::mem::size_of::<FilterUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        tracing::info!(
            width = surface_size.0,
            height = surface_size.1,
            cache = %cache_mode,
            adapter = %context.profile.name,
            "frame orchestrator ready"
        );
        Ok(Self {
            context,
            output,
            shaders,
            cache_mode,
            state: FrameState::Idle,
            pipeline: None,
            quad: None,
            image: None,
            palette: None,
            uniform_buffer,
            last_frame: None,
            draw_count: 0,
        })
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Number of draws issued since creation.
    pub fn draw_count(&self) -> u64 {
        self.draw_count
    }

    pub fn cache_mode(&self) -> CacheMode {
        self.cache_mode
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    pub fn output(&self) -> &OutputSurface {
        &self.output
    }

    /// Replaces the shader sources; the next render rebuilds the program.
    pub fn set_shaders(&mut self, shaders: ShaderSources) {
        self.shaders = shaders;
        self.pipeline = None;
        self.last_frame = None;
    }

    /// Renders `image` through `filter` into the output surface.
    ///
    /// Compile, link and binding failures leave the surface untouched and the
    /// orchestrator in [`FrameState::Failed`]; a later request starts over.
    pub fn render(&mut self, image: &SourceImage, filter: &FilterMode) -> RenderResult<RenderOutcome> {
        let key = FrameKey {
            image: image.id(),
            filter: filter.fingerprint(),
        };
        if self.cache_mode == CacheMode::OnDemand
            && self.state == FrameState::Rendered
            && self.last_frame.as_ref() == Some(&key)
        {
            tracing::debug!(image = %image.id(), %filter, "frame unchanged; skipping render");
            return Ok(RenderOutcome::Unchanged);
        }

        self.state = FrameState::Idle;
        self.release_stale(image.id(), filter);

        match self.render_frame(image, filter) {
            Ok(()) => {
                self.state = FrameState::Rendered;
                self.last_frame = Some(key);
                self.draw_count += 1;
                tracing::info!(image = %image.id(), %filter, "rendered frame");
                Ok(RenderOutcome::Drawn)
            }
            Err(err) => {
                self.state = FrameState::Failed;
                self.last_frame = None;
                tracing::error!(error = %err, "render abandoned");
                Err(err)
            }
        }
    }

    /// Copies the output surface to host memory.
    pub fn read_back(&self) -> RenderResult<RgbaImage> {
        self.output.read_back(&self.context.device, &self.context.queue)
    }

    /// Writes the output surface to a PNG file.
    pub fn export_png(&self, path: &Path) -> RenderResult<()> {
        let pixels = self.read_back()?;
        pixels
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(|source| RenderError::Export {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::info!(path = %path.display(), "exported output surface");
        Ok(())
    }

    /// Drops whatever the next render cannot reuse, before anything new is
    /// acquired.
    fn release_stale(&mut self, image: ImageId, filter: &FilterMode) {
        match self.cache_mode {
            CacheMode::Disabled => {
                self.pipeline = None;
                self.quad = None;
                self.image = None;
                self.palette = None;
            }
            CacheMode::OnDemand => {
                if self.image.as_ref().is_some_and(|cached| cached.id != image) {
                    tracing::debug!(image = %image, "source image changed; releasing texture");
                    self.image = None;
                }
                if let Some(palette) = filter.palette() {
                    if self
                        .palette
                        .as_ref()
                        .is_some_and(|cached| &cached.palette != palette)
                    {
                        self.palette = None;
                    }
                }
            }
        }
    }

    fn render_frame(&mut self, image: &SourceImage, filter: &FilterMode) -> RenderResult<()> {
        self.context.check_dimensions(image.width(), image.height())?;

        self.state = FrameState::Compiling;
        if self.pipeline.is_none() {
            let program = build_program(&self.shaders)?;
            self.pipeline = Some(create_pipeline(&self.context, &program)?);
        }

        let device = &self.context.device;
        let queue = &self.context.queue;

        // Textures are cached only once the device has accepted them.
        if self.image.is_none() {
            let texture = self
                .context
                .validated(|device| create_texture(device, queue, image))?;
            self.image = Some(CachedImage {
                id: image.id(),
                texture,
            });
        }
        // Non-palette modes never sample the strip, so whatever is cached stays bound.
        if self.palette.is_none() {
            let palette = filter.palette().cloned().unwrap_or_else(Palette::placeholder);
            let texture = self
                .context
                .validated(|device| create_palette_texture(device, queue, &palette))?;
            self.palette = Some(CachedPalette { palette, texture });
        }

        let quad = self.quad.get_or_insert_with(|| QuadBuffers {
            positions: create_buffer(
                device,
                "quad positions",
                wgpu::BufferUsages::VERTEX,
                bytemuck::cast_slice(&geometry::QUAD_VERTICES),
            ),
            texcoords: create_buffer(
                device,
                "quad texture coordinates",
                wgpu::BufferUsages::VERTEX,
                bytemuck::cast_slice(geometry::texture_coordinates()),
            ),
        });
        let (Some(cached_image), Some(cached_palette)) = (self.image.as_ref(), self.palette.as_ref())
        else {
            return Err(RenderError::Pipeline("textures missing after upload".to_string()));
        };

        let Some(pipeline) = self.pipeline.as_ref() else {
            return Err(RenderError::Pipeline("pipeline missing after build".to_string()));
        };

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("filter uniform bind group"),
            layout: &pipeline.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: self.uniform_buffer.as_entire_binding(),
            }],
        });
        let texture_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("filter texture bind group"),
            layout: &pipeline.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&cached_image.texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&cached_image.texture.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&cached_palette.texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&cached_palette.texture.sampler),
                },
            ],
        });
        self.state = FrameState::Bound;

        let uniforms = FilterUniforms::new(filter, image.dimensions());
        queue.write_buffer(&self.uniform_buffer, 0, uniforms.as_bytes());

        let (width, height) = self.output.size();
        let output_view = self.output.view();
        self.context.validated(|device| {
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("filter encoder"),
            });
            {
                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("filter pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: output_view,
                        depth_slice: None,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    occlusion_query_set: None,
                    timestamp_writes: None,
                });
                pass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
                pass.set_pipeline(&pipeline.pipeline);
                pass.set_bind_group(0, &uniform_bind_group, &[]);
                pass.set_bind_group(1, &texture_bind_group, &[]);
                pass.set_vertex_buffer(0, quad.positions.slice(..));
                pass.set_vertex_buffer(1, quad.texcoords.slice(..));
                pass.draw(0..geometry::vertex_count(), 0..1);
            }
            queue.submit(std::iter::once(encoder.finish()));
        })
    }
}

fn create_pipeline(context: &GpuContext, program: &Program) -> RenderResult<FilterPipeline> {
    let position = bind_attribute(
        program,
        AttributeSpec::new(POSITION_ATTRIBUTE, COMPONENTS_PER_VERTEX),
    )
    .ok_or_else(|| RenderError::AttributeNotFound {
        name: POSITION_ATTRIBUTE.to_string(),
    })?;
    let texcoords = bind_attribute(
        program,
        AttributeSpec::new(TEXCOORD_ATTRIBUTE, COMPONENTS_PER_VERTEX),
    )
    .ok_or_else(|| RenderError::AttributeNotFound {
        name: TEXCOORD_ATTRIBUTE.to_string(),
    })?;

    context.validated(|device| {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("filter uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("filter texture layout"),
            entries: &[
                texture_entry(0),
                sampler_entry(1),
                texture_entry(2),
                sampler_entry(3),
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("filter pipeline layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let vertex_module = program.vertex().create_module(device);
        let fragment_module = program.fragment().create_module(device);
        let position_attributes = [position.attribute()];
        let texcoord_attributes = [texcoords.attribute()];

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("filter pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("main"),
                buffers: &[
                    wgpu::VertexBufferLayout {
                        array_stride: position.stride,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &position_attributes,
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: texcoords.stride,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &texcoord_attributes,
                    },
                ],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: OUTPUT_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });
        tracing::debug!("filter pipeline created");

        FilterPipeline {
            pipeline,
            uniform_layout,
            texture_layout,
        }
    })
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}
