//! A typed model of the Metal protocol surface used by the `dxmetal`
//! translation layer.
//!
//! Backends implement the traits in [`device`], [`encoder`] and [`object`];
//! the translation layer is written entirely against them. Retained
//! protocol objects are `Arc<dyn Trait>` handles: cloning is the retain,
//! dropping the release.
//!
//! The [`testing`] module (behind the `test-utils` feature) provides a
//! recording backend that logs every encoder call for assertions.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// Device capability snapshot.
pub mod capabilities;
/// Plain-data creation descriptors.
pub mod descriptor;
/// Device, queue and command buffer traits.
pub mod device;
/// Command encoder traits.
pub mod encoder;
mod error;
/// Formats and fixed-function state enums.
pub mod format;
/// Object traits and shared handles.
pub mod object;
/// Backend pipeline reflection types.
pub mod reflection;

/// Recording backend for tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use crate::capabilities::Capabilities;
pub use crate::descriptor::{
    ColorAttachmentBlend, ComputePipelineDescriptor, DepthStencilDescriptor,
    RenderPassColorAttachment, RenderPassDepthAttachment, RenderPassDescriptor,
    RenderPassStencilAttachment, RenderPipelineColorAttachment, RenderPipelineDescriptor,
    SamplerDescriptor, StencilDescriptor, VertexAttribute, VertexBufferLayout, VertexDescriptor,
    VertexStepFunction, MAX_COLOR_ATTACHMENTS,
};
pub use crate::device::{CompletionHandler, MtlCommandBuffer, MtlCommandQueue, MtlDevice};
pub use crate::encoder::{
    MtlBlitCommandEncoder, MtlCommandEncoder, MtlComputeCommandEncoder, MtlRenderCommandEncoder,
};
pub use crate::error::MetalError;
pub use crate::format::{
    BlendFactor, BlendOperation, ClearColor, ColorWriteMask, CompareFunction, CullMode,
    DepthClipMode, IndexType, LoadAction, PixelFormat, PrimitiveType, SamplerAddressMode,
    SamplerFilter, SamplerMipFilter, ScissorRect, StencilOperation, StorageMode, StoreAction,
    TriangleFillMode, VertexFormat, Viewport, VisibilityResultMode, Winding,
};
pub use crate::object::{
    same_texture, BufferHandle, ComputePipelineHandle, DepthStencilHandle, DrawableHandle,
    FunctionHandle, MtlBuffer, MtlComputePipelineState, MtlDepthStencilState, MtlDrawable,
    MtlFunction, MtlRenderPipelineState, MtlSamplerState, MtlTexture, RenderPipelineHandle,
    SamplerHandle, TextureHandle,
};
pub use crate::reflection::{ArgumentKind, PipelineArgument, PipelineReflection, StructMember};
