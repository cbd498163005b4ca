//! Pixel/vertex formats and fixed-function state enums.
//!
//! These mirror the Metal enumerations the translation layer targets. Only
//! the values the DX11 frontend can produce are modeled.

use bitflags::bitflags;

/// Texture and attachment pixel formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// No attachment bound.
    #[default]
    Invalid,
    /// 8-bit unsigned normalized red.
    R8Unorm,
    /// 16-bit float red.
    R16Float,
    /// 32-bit float red.
    R32Float,
    /// 8-bit unsigned normalized red/green.
    Rg8Unorm,
    /// 8-bit unsigned normalized RGBA.
    Rgba8Unorm,
    /// 8-bit sRGB RGBA.
    Rgba8UnormSrgb,
    /// 8-bit unsigned normalized BGRA (the usual swapchain format).
    Bgra8Unorm,
    /// 8-bit sRGB BGRA.
    Bgra8UnormSrgb,
    /// 10/10/10/2 unsigned normalized.
    Rgb10A2Unorm,
    /// 16-bit float RGBA.
    Rgba16Float,
    /// 32-bit float RGBA.
    Rgba32Float,
    /// 32-bit float depth.
    Depth32Float,
    /// 32-bit float depth with 8-bit stencil.
    Depth32FloatStencil8,
    /// 8-bit stencil.
    Stencil8,
}

impl PixelFormat {
    /// Returns `true` for formats with a depth aspect.
    pub fn has_depth(self) -> bool {
        matches!(self, PixelFormat::Depth32Float | PixelFormat::Depth32FloatStencil8)
    }

    /// Returns `true` for formats with a stencil aspect.
    pub fn has_stencil(self) -> bool {
        matches!(self, PixelFormat::Depth32FloatStencil8 | PixelFormat::Stencil8)
    }
}

/// Vertex attribute formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    /// One 32-bit float.
    Float,
    /// Two 32-bit floats.
    Float2,
    /// Three 32-bit floats.
    Float3,
    /// Four 32-bit floats.
    Float4,
    /// Two 16-bit floats.
    Half2,
    /// Four 16-bit floats.
    Half4,
    /// Four unsigned normalized bytes.
    UChar4Normalized,
    /// Four unsigned bytes.
    UChar4,
    /// One unsigned 32-bit integer.
    UInt,
    /// Two unsigned 32-bit integers.
    UInt2,
    /// Four unsigned 32-bit integers.
    UInt4,
    /// One signed 32-bit integer.
    Int,
    /// Four signed 32-bit integers.
    Int4,
    /// Two signed 16-bit integers, normalized.
    Short2Normalized,
    /// Four signed 16-bit integers, normalized.
    Short4Normalized,
}

/// Primitive topologies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveType {
    /// Point list.
    Point,
    /// Line list.
    Line,
    /// Line strip.
    LineStrip,
    /// Triangle list.
    #[default]
    Triangle,
    /// Triangle strip.
    TriangleStrip,
}

/// Index element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    /// 16-bit indices.
    UInt16,
    /// 32-bit indices.
    UInt32,
}

impl IndexType {
    /// Byte size of one index element.
    pub fn stride(self) -> usize {
        match self {
            IndexType::UInt16 => 2,
            IndexType::UInt32 => 4,
        }
    }
}

/// Face culling modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    /// Cull nothing.
    #[default]
    None,
    /// Cull front faces.
    Front,
    /// Cull back faces.
    Back,
}

/// Front-facing winding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Winding {
    /// Clockwise front faces (the D3D default).
    #[default]
    Clockwise,
    /// Counter-clockwise front faces.
    CounterClockwise,
}

/// Triangle fill modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TriangleFillMode {
    /// Solid fill.
    #[default]
    Fill,
    /// Wireframe.
    Lines,
}

/// Depth clip vs clamp behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthClipMode {
    /// Clip fragments outside the depth range.
    #[default]
    Clip,
    /// Clamp depth instead of clipping (requires device support).
    Clamp,
}

/// Attachment load actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadAction {
    /// Contents are undefined at the start of the pass.
    #[default]
    DontCare,
    /// Preserve the previous contents.
    Load,
    /// Clear to the attachment's clear value.
    Clear,
}

/// Attachment store actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoreAction {
    /// Contents are discarded at the end of the pass.
    DontCare,
    /// Write results back to the attachment.
    #[default]
    Store,
}

/// Visibility result (occlusion query) accumulation modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VisibilityResultMode {
    /// No visibility counting.
    #[default]
    Disabled,
    /// Accumulate passing sample counts.
    Counting,
}

/// Comparison functions for depth/stencil tests and samplers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunction {
    /// Never passes.
    Never,
    /// Passes when incoming < stored.
    Less,
    /// Passes when equal.
    Equal,
    /// Passes when incoming <= stored.
    LessEqual,
    /// Passes when incoming > stored.
    Greater,
    /// Passes when not equal.
    NotEqual,
    /// Passes when incoming >= stored.
    GreaterEqual,
    /// Always passes.
    #[default]
    Always,
}

/// Stencil operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilOperation {
    /// Keep the stored value.
    #[default]
    Keep,
    /// Zero the stored value.
    Zero,
    /// Replace with the reference value.
    Replace,
    /// Increment and clamp.
    IncrementClamp,
    /// Decrement and clamp.
    DecrementClamp,
    /// Bitwise invert.
    Invert,
    /// Increment with wrap.
    IncrementWrap,
    /// Decrement with wrap.
    DecrementWrap,
}

/// Blend factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendFactor {
    /// 0.
    Zero,
    /// 1.
    #[default]
    One,
    /// Source color.
    SourceColor,
    /// 1 - source color.
    OneMinusSourceColor,
    /// Source alpha.
    SourceAlpha,
    /// 1 - source alpha.
    OneMinusSourceAlpha,
    /// Destination color.
    DestinationColor,
    /// 1 - destination color.
    OneMinusDestinationColor,
    /// Destination alpha.
    DestinationAlpha,
    /// 1 - destination alpha.
    OneMinusDestinationAlpha,
    /// Constant blend color.
    BlendColor,
    /// 1 - constant blend color.
    OneMinusBlendColor,
    /// min(source alpha, 1 - destination alpha).
    SourceAlphaSaturated,
}

/// Blend operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendOperation {
    /// src + dst.
    #[default]
    Add,
    /// src - dst.
    Subtract,
    /// dst - src.
    ReverseSubtract,
    /// min(src, dst).
    Min,
    /// max(src, dst).
    Max,
}

bitflags! {
    /// Per-attachment color channel write mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorWriteMask: u8 {
        /// Red channel.
        const RED = 1 << 0;
        /// Green channel.
        const GREEN = 1 << 1;
        /// Blue channel.
        const BLUE = 1 << 2;
        /// Alpha channel.
        const ALPHA = 1 << 3;
    }
}

impl Default for ColorWriteMask {
    fn default() -> Self {
        ColorWriteMask::all()
    }
}

/// Sampler minification/magnification filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SamplerFilter {
    /// Nearest-neighbor.
    #[default]
    Nearest,
    /// Linear interpolation.
    Linear,
}

/// Sampler mip filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SamplerMipFilter {
    /// No mipmapping.
    #[default]
    NotMipmapped,
    /// Nearest mip level.
    Nearest,
    /// Linear between mip levels.
    Linear,
}

/// Sampler addressing modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SamplerAddressMode {
    /// Clamp to edge texels.
    #[default]
    ClampToEdge,
    /// Repeat.
    Repeat,
    /// Mirrored repeat.
    MirrorRepeat,
    /// Clamp to border color.
    ClampToBorderColor,
}

/// Buffer/texture storage modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StorageMode {
    /// CPU/GPU shared memory.
    #[default]
    Shared,
    /// Driver-synchronized memory.
    Managed,
    /// GPU-only memory.
    Private,
}

/// An RGBA clear color.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClearColor {
    /// Red.
    pub red: f64,
    /// Green.
    pub green: f64,
    /// Blue.
    pub blue: f64,
    /// Alpha.
    pub alpha: f64,
}

/// A viewport in framebuffer coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
    /// Near depth range.
    pub znear: f64,
    /// Far depth range.
    pub zfar: f64,
}

/// A scissor rectangle in framebuffer coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScissorRect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}
