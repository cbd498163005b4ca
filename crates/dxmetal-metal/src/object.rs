//! Object traits modeling retained Metal protocol objects.
//!
//! Handles are `Arc<dyn Trait>`: cloning a handle is the retain, dropping
//! it the release. Raw retain/release never appears outside a backend
//! implementation.

use crate::error::MetalError;
use crate::format::{PixelFormat, StorageMode};
use std::fmt::Debug;
use std::sync::Arc;

/// A GPU buffer.
pub trait MtlBuffer: Debug + Send + Sync {
    /// Byte length of the buffer.
    fn length(&self) -> usize;
    /// Storage mode the buffer was created with.
    fn storage_mode(&self) -> StorageMode;
    /// Writes `data` at `offset`. Fails on out-of-bounds ranges and on
    /// GPU-private buffers.
    fn write(&self, offset: usize, data: &[u8]) -> Result<(), MetalError>;
    /// Reads `len` bytes at `offset`. Fails on out-of-bounds ranges and on
    /// GPU-private buffers.
    fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>, MetalError>;
    /// Stable identity of the underlying allocation.
    fn buffer_id(&self) -> u64;
}

/// A GPU texture.
pub trait MtlTexture: Debug + Send + Sync {
    /// Width in texels.
    fn width(&self) -> u32;
    /// Height in texels.
    fn height(&self) -> u32;
    /// Pixel format.
    fn pixel_format(&self) -> PixelFormat;
    /// Stable identity of the underlying allocation. Two handles to the
    /// same texture compare equal by this id.
    fn texture_id(&self) -> u64;
}

/// A compiled shader function.
pub trait MtlFunction: Debug + Send + Sync {
    /// Entry point name.
    fn name(&self) -> &str;
    /// The MSL source this function was compiled from.
    fn source(&self) -> &str;
}

/// An immutable sampler state object.
pub trait MtlSamplerState: Debug + Send + Sync {
    /// Stable identity of the state object.
    fn sampler_id(&self) -> u64;
}

/// An immutable depth/stencil state object.
pub trait MtlDepthStencilState: Debug + Send + Sync {
    /// Stable identity of the state object.
    fn depth_stencil_id(&self) -> u64;
}

/// A compiled render pipeline.
pub trait MtlRenderPipelineState: Debug + Send + Sync {
    /// Stable identity of the pipeline object.
    fn pipeline_id(&self) -> u64;
}

/// A compiled compute pipeline.
pub trait MtlComputePipelineState: Debug + Send + Sync {
    /// Stable identity of the pipeline object.
    fn pipeline_id(&self) -> u64;
}

/// A presentable surface (one frame of the swapchain).
pub trait MtlDrawable: Debug + Send + Sync {
    /// The texture rendering targets.
    fn texture(&self) -> TextureHandle;
}

/// Shared handle to a [`MtlBuffer`].
pub type BufferHandle = Arc<dyn MtlBuffer>;
/// Shared handle to a [`MtlTexture`].
pub type TextureHandle = Arc<dyn MtlTexture>;
/// Shared handle to a [`MtlFunction`].
pub type FunctionHandle = Arc<dyn MtlFunction>;
/// Shared handle to a [`MtlSamplerState`].
pub type SamplerHandle = Arc<dyn MtlSamplerState>;
/// Shared handle to a [`MtlDepthStencilState`].
pub type DepthStencilHandle = Arc<dyn MtlDepthStencilState>;
/// Shared handle to a [`MtlRenderPipelineState`].
pub type RenderPipelineHandle = Arc<dyn MtlRenderPipelineState>;
/// Shared handle to a [`MtlComputePipelineState`].
pub type ComputePipelineHandle = Arc<dyn MtlComputePipelineState>;
/// Shared handle to a [`MtlDrawable`].
pub type DrawableHandle = Arc<dyn MtlDrawable>;

/// Returns `true` when both handles refer to the same texture allocation.
pub fn same_texture(a: &TextureHandle, b: &TextureHandle) -> bool {
    a.texture_id() == b.texture_id()
}
