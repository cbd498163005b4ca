//! Plain-data descriptors for pipeline, pass, sampler and depth/stencil
//! creation.
//!
//! Descriptors that participate in pipeline cache keys derive `Eq`/`Hash`
//! so structural equality keys the cache directly.

use crate::format::{
    BlendFactor, BlendOperation, ClearColor, ColorWriteMask, CompareFunction, LoadAction,
    PixelFormat, SamplerAddressMode, SamplerFilter, SamplerMipFilter, StencilOperation,
    StoreAction, VertexFormat,
};
use crate::object::{BufferHandle, FunctionHandle, TextureHandle};

/// Maximum color attachments in a render pass.
pub const MAX_COLOR_ATTACHMENTS: usize = 8;

/// One vertex attribute of a vertex descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Attribute format.
    pub format: VertexFormat,
    /// Byte offset within the source layout.
    pub offset: usize,
    /// Index of the buffer layout this attribute reads from.
    pub buffer_index: usize,
}

/// How a vertex buffer layout advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexStepFunction {
    /// Advance per vertex.
    #[default]
    PerVertex,
    /// Advance per instance.
    PerInstance,
}

/// One buffer layout of a vertex descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexBufferLayout {
    /// Byte stride between elements.
    pub stride: usize,
    /// Step function.
    pub step_function: VertexStepFunction,
    /// Step rate for per-instance layouts.
    pub step_rate: usize,
}

/// A complete vertex fetch description.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexDescriptor {
    /// Attributes, indexed by shader attribute slot.
    pub attributes: Vec<(usize, VertexAttribute)>,
    /// Buffer layouts, indexed by argument-table buffer slot.
    pub layouts: Vec<(usize, VertexBufferLayout)>,
}

/// Per-attachment blend state of a render pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColorAttachmentBlend {
    /// Whether blending is enabled for this attachment.
    pub blending_enabled: bool,
    /// RGB source factor.
    pub source_rgb_factor: BlendFactor,
    /// RGB destination factor.
    pub destination_rgb_factor: BlendFactor,
    /// RGB operation.
    pub rgb_operation: BlendOperation,
    /// Alpha source factor.
    pub source_alpha_factor: BlendFactor,
    /// Alpha destination factor.
    pub destination_alpha_factor: BlendFactor,
    /// Alpha operation.
    pub alpha_operation: BlendOperation,
    /// Channel write mask.
    pub write_mask: ColorWriteMask,
}

impl Default for ColorAttachmentBlend {
    fn default() -> Self {
        ColorAttachmentBlend {
            blending_enabled: false,
            source_rgb_factor: BlendFactor::One,
            destination_rgb_factor: BlendFactor::Zero,
            rgb_operation: BlendOperation::Add,
            source_alpha_factor: BlendFactor::One,
            destination_alpha_factor: BlendFactor::Zero,
            alpha_operation: BlendOperation::Add,
            write_mask: ColorWriteMask::all(),
        }
    }
}

/// One color attachment of a render pipeline descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RenderPipelineColorAttachment {
    /// Attachment pixel format; `Invalid` when the slot is unused.
    pub pixel_format: PixelFormat,
    /// Blend state.
    pub blend: ColorAttachmentBlend,
}

/// Creation parameters for a render pipeline.
///
/// Not a cache key itself; the translation layer keys its pipeline cache on
/// a structural configuration and builds this descriptor only on misses.
#[derive(Debug, Clone, Default)]
pub struct RenderPipelineDescriptor {
    /// Debug label.
    pub label: String,
    /// The vertex function.
    pub vertex_function: Option<FunctionHandle>,
    /// The fragment function; `None` for depth-only pipelines.
    pub fragment_function: Option<FunctionHandle>,
    /// Vertex fetch layout, if the pipeline reads vertex buffers.
    pub vertex_descriptor: Option<VertexDescriptor>,
    /// Color attachments.
    pub color_attachments: [RenderPipelineColorAttachment; MAX_COLOR_ATTACHMENTS],
    /// Depth attachment format.
    pub depth_attachment_format: PixelFormat,
    /// Stencil attachment format.
    pub stencil_attachment_format: PixelFormat,
    /// Multisample count (`1` when multisampling is off).
    pub sample_count: usize,
}

/// Creation parameters for a compute pipeline.
#[derive(Debug, Clone, Default)]
pub struct ComputePipelineDescriptor {
    /// Debug label.
    pub label: String,
    /// The kernel function.
    pub compute_function: Option<FunctionHandle>,
}

/// One color attachment of a render pass.
#[derive(Debug, Clone)]
pub struct RenderPassColorAttachment {
    /// Target texture.
    pub texture: TextureHandle,
    /// Load action.
    pub load_action: LoadAction,
    /// Store action.
    pub store_action: StoreAction,
    /// Clear value used when `load_action` is `Clear`.
    pub clear_color: ClearColor,
}

/// The depth attachment of a render pass.
#[derive(Debug, Clone)]
pub struct RenderPassDepthAttachment {
    /// Target texture.
    pub texture: TextureHandle,
    /// Load action.
    pub load_action: LoadAction,
    /// Store action.
    pub store_action: StoreAction,
    /// Clear value used when `load_action` is `Clear`.
    pub clear_depth: f64,
}

/// The stencil attachment of a render pass.
#[derive(Debug, Clone)]
pub struct RenderPassStencilAttachment {
    /// Target texture.
    pub texture: TextureHandle,
    /// Load action.
    pub load_action: LoadAction,
    /// Store action.
    pub store_action: StoreAction,
    /// Clear value used when `load_action` is `Clear`.
    pub clear_stencil: u32,
}

/// Creation parameters for a render command encoder.
#[derive(Debug, Clone, Default)]
pub struct RenderPassDescriptor {
    /// Color attachments; `None` slots are unbound.
    pub color_attachments: Vec<Option<RenderPassColorAttachment>>,
    /// Depth attachment.
    pub depth_attachment: Option<RenderPassDepthAttachment>,
    /// Stencil attachment.
    pub stencil_attachment: Option<RenderPassStencilAttachment>,
    /// Buffer receiving visibility results for occlusion queries.
    pub visibility_result_buffer: Option<BufferHandle>,
}

/// Stencil test/write behavior for one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StencilDescriptor {
    /// Comparison against the reference value.
    pub compare_function: CompareFunction,
    /// Operation on stencil-test failure.
    pub stencil_failure_operation: StencilOperation,
    /// Operation on depth-test failure.
    pub depth_failure_operation: StencilOperation,
    /// Operation when both tests pass.
    pub depth_stencil_pass_operation: StencilOperation,
    /// Read mask.
    pub read_mask: u32,
    /// Write mask.
    pub write_mask: u32,
}

/// Creation parameters for a depth/stencil state object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilDescriptor {
    /// Depth comparison.
    pub depth_compare_function: CompareFunction,
    /// Whether depth writes are enabled.
    pub depth_write_enabled: bool,
    /// Front-face stencil behavior, if stencil is enabled.
    pub front_stencil: Option<StencilDescriptor>,
    /// Back-face stencil behavior, if stencil is enabled.
    pub back_stencil: Option<StencilDescriptor>,
}

impl Default for DepthStencilDescriptor {
    fn default() -> Self {
        DepthStencilDescriptor {
            depth_compare_function: CompareFunction::Less,
            depth_write_enabled: true,
            front_stencil: None,
            back_stencil: None,
        }
    }
}

/// Creation parameters for a sampler state object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SamplerDescriptor {
    /// Minification filter.
    pub min_filter: SamplerFilter,
    /// Magnification filter.
    pub mag_filter: SamplerFilter,
    /// Mip filter.
    pub mip_filter: SamplerMipFilter,
    /// Horizontal addressing.
    pub address_mode_u: SamplerAddressMode,
    /// Vertical addressing.
    pub address_mode_v: SamplerAddressMode,
    /// Depth addressing.
    pub address_mode_w: SamplerAddressMode,
    /// Maximum anisotropy (`1` disables anisotropic filtering).
    pub max_anisotropy: u8,
    /// Comparison function for shadow samplers.
    pub compare_function: Option<CompareFunction>,
}
