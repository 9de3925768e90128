use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::compile::Program;
use crate::filter::Palette;
use crate::source::SourceImage;

/// Component type of a vertex attribute as stored in its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttributeType {
    #[default]
    Float,
    Byte,
    UnsignedByte,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
}

impl AttributeType {
    pub fn size_in_bytes(self) -> u64 {
        match self {
            AttributeType::Byte | AttributeType::UnsignedByte => 1,
            AttributeType::Short | AttributeType::UnsignedShort => 2,
            AttributeType::Float | AttributeType::Int | AttributeType::UnsignedInt => 4,
        }
    }
}

/// How a named vertex input reads its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeSpec<'a> {
    pub name: &'a str,
    pub components: u32,
    pub ty: AttributeType,
    pub normalize: bool,
    /// Bytes between consecutive vertices; 0 means tightly packed.
    pub stride: u64,
    pub offset: u64,
}

impl<'a> AttributeSpec<'a> {
    /// Float components, not normalized, tightly packed from offset 0.
    pub fn new(name: &'a str, components: u32) -> Self {
        Self {
            name,
            components,
            ty: AttributeType::Float,
            normalize: false,
            stride: 0,
            offset: 0,
        }
    }
}

/// A vertex input resolved against a linked program.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundAttribute {
    pub name: String,
    pub location: u32,
    pub format: wgpu::VertexFormat,
    pub stride: u64,
    pub offset: u64,
}

impl BoundAttribute {
    pub fn attribute(&self) -> wgpu::VertexAttribute {
        wgpu::VertexAttribute {
            format: self.format,
            offset: self.offset,
            shader_location: self.location,
        }
    }
}

/// Vertex format for `components` values of `ty`. `None` when the device has
/// no such format (three 8/16-bit components, normalized 32-bit integers).
pub fn vertex_format(
    components: u32,
    ty: AttributeType,
    normalize: bool,
) -> Option<wgpu::VertexFormat> {
    use wgpu::VertexFormat as F;

    let format = match (ty, normalize, components) {
        (AttributeType::Float, _, 1) => F::Float32,
        (AttributeType::Float, _, 2) => F::Float32x2,
        (AttributeType::Float, _, 3) => F::Float32x3,
        (AttributeType::Float, _, 4) => F::Float32x4,

        (AttributeType::UnsignedByte, true, 1) => F::Unorm8,
        (AttributeType::UnsignedByte, true, 2) => F::Unorm8x2,
        (AttributeType::UnsignedByte, true, 4) => F::Unorm8x4,
        (AttributeType::UnsignedByte, false, 1) => F::Uint8,
        (AttributeType::UnsignedByte, false, 2) => F::Uint8x2,
        (AttributeType::UnsignedByte, false, 4) => F::Uint8x4,

        (AttributeType::Byte, true, 1) => F::Snorm8,
        (AttributeType::Byte, true, 2) => F::Snorm8x2,
        (AttributeType::Byte, true, 4) => F::Snorm8x4,
        (AttributeType::Byte, false, 1) => F::Sint8,
        (AttributeType::Byte, false, 2) => F::Sint8x2,
        (AttributeType::Byte, false, 4) => F::Sint8x4,

        (AttributeType::UnsignedShort, true, 1) => F::Unorm16,
        (AttributeType::UnsignedShort, true, 2) => F::Unorm16x2,
        (AttributeType::UnsignedShort, true, 4) => F::Unorm16x4,
        (AttributeType::UnsignedShort, false, 1) => F::Uint16,
        (AttributeType::UnsignedShort, false, 2) => F::Uint16x2,
        (AttributeType::UnsignedShort, false, 4) => F::Uint16x4,

        (AttributeType::Short, true, 1) => F::Snorm16,
        (AttributeType::Short, true, 2) => F::Snorm16x2,
        (AttributeType::Short, true, 4) => F::Snorm16x4,
        (AttributeType::Short, false, 1) => F::Sint16,
        (AttributeType::Short, false, 2) => F::Sint16x2,
        (AttributeType::Short, false, 4) => F::Sint16x4,

        (AttributeType::UnsignedInt, false, 1) => F::Uint32,
        (AttributeType::UnsignedInt, false, 2) => F::Uint32x2,
        (AttributeType::UnsignedInt, false, 3) => F::Uint32x3,
        (AttributeType::UnsignedInt, false, 4) => F::Uint32x4,

        (AttributeType::Int, false, 1) => F::Sint32,
        (AttributeType::Int, false, 2) => F::Sint32x2,
        (AttributeType::Int, false, 3) => F::Sint32x3,
        (AttributeType::Int, false, 4) => F::Sint32x4,

        _ => return None,
    };
    Some(format)
}

/// Resolves `spec.name` against the program's vertex inputs.
///
/// Returns `None` when the program does not declare the attribute; nothing is
/// bound in that case. An unsupported component layout is also `None` and is
/// logged.
pub fn bind_attribute(program: &Program, spec: AttributeSpec<'_>) -> Option<BoundAttribute> {
    let input = program.vertex_input(spec.name)?;
    let Some(format) = vertex_format(spec.components, spec.ty, spec.normalize) else {
        tracing::warn!(
            attribute = spec.name,
            components = spec.components,
            ty = ?spec.ty,
            normalize = spec.normalize,
            "no vertex format for attribute layout"
        );
        return None;
    };
    let stride = if spec.stride == 0 {
        spec.components as u64 * spec.ty.size_in_bytes()
    } else {
        spec.stride
    };
    tracing::debug!(
        attribute = spec.name,
        location = input.location,
        ?format,
        stride,
        offset = spec.offset,
        "bound vertex attribute"
    );
    Some(BoundAttribute {
        name: spec.name.to_string(),
        location: input.location,
        format,
        stride,
        offset: spec.offset,
    })
}

/// Allocates a buffer initialised with `data`.
pub fn create_buffer(
    device: &wgpu::Device,
    label: &str,
    usage: wgpu::BufferUsages,
    data: &[u8],
) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: data,
        usage,
    })
}

/// A sampled 2D texture with its view and sampler.
pub struct ImageTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

/// Uploads the source image as an `Rgba8Unorm` texture with one mip level,
/// nearest filtering and clamp-to-edge addressing.
pub fn create_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    image: &SourceImage,
) -> ImageTexture {
    let label = format!("source texture {}", image.id());
    upload_rgba8(device, queue, &label, image.dimensions(), image.as_bytes())
}

/// Uploads a palette as a one-pixel-tall strip sampled the same way as the
/// source image.
pub fn create_palette_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    palette: &Palette,
) -> ImageTexture {
    let label = format!("palette texture {}", palette.name());
    upload_rgba8(device, queue, &label, (palette.width(), 1), palette.as_bytes())
}

fn upload_rgba8(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    (width, height): (u32, u32),
    data: &[u8],
) -> ImageTexture {
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        data,
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Nearest,
        min_filter: wgpu::FilterMode::Nearest,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    });

    tracing::debug!(label, width, height, "uploaded texture");

    ImageTexture {
        texture,
        view,
        sampler,
    }
}
