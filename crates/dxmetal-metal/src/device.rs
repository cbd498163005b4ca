//! Device, queue and command buffer traits.

use crate::capabilities::Capabilities;
use crate::descriptor::{
    ComputePipelineDescriptor, DepthStencilDescriptor, RenderPassDescriptor,
    RenderPipelineDescriptor, SamplerDescriptor,
};
use crate::encoder::{MtlBlitCommandEncoder, MtlComputeCommandEncoder, MtlRenderCommandEncoder};
use crate::error::MetalError;
use crate::format::StorageMode;
use crate::object::{
    BufferHandle, ComputePipelineHandle, DepthStencilHandle, DrawableHandle, FunctionHandle,
    SamplerHandle,
};
use crate::reflection::PipelineReflection;
use std::sync::Arc;

/// Handler invoked when a command buffer's GPU work completes.
pub type CompletionHandler = Box<dyn FnOnce() + Send>;

/// The device: creates resources, compiles pipelines, vends queues.
pub trait MtlDevice: Send + Sync {
    /// The device's feature snapshot.
    fn capabilities(&self) -> &Capabilities;

    /// Creates a buffer of `length` bytes.
    fn new_buffer(&self, length: usize, storage: StorageMode) -> Result<BufferHandle, MetalError>;

    /// Creates a sampler state object.
    fn new_sampler_state(&self, desc: &SamplerDescriptor) -> Result<SamplerHandle, MetalError>;

    /// Creates a depth/stencil state object.
    fn new_depth_stencil_state(
        &self,
        desc: &DepthStencilDescriptor,
    ) -> Result<DepthStencilHandle, MetalError>;

    /// Compiles MSL source into a function.
    fn new_function(&self, source: &str, entry_point: &str)
        -> Result<FunctionHandle, MetalError>;

    /// Compiles a render pipeline, returning the pipeline state and the
    /// backend's reflection of it.
    fn new_render_pipeline(
        &self,
        desc: &RenderPipelineDescriptor,
    ) -> Result<(crate::object::RenderPipelineHandle, PipelineReflection), MetalError>;

    /// Compiles a compute pipeline, returning the pipeline state and the
    /// backend's reflection of it.
    fn new_compute_pipeline(
        &self,
        desc: &ComputePipelineDescriptor,
    ) -> Result<(ComputePipelineHandle, PipelineReflection), MetalError>;

    /// Creates a command queue.
    fn new_command_queue(&self) -> Arc<dyn MtlCommandQueue>;
}

/// A command queue: vends command buffers in submission order.
pub trait MtlCommandQueue: Send + Sync {
    /// Creates a new command buffer.
    fn command_buffer(&self) -> Box<dyn MtlCommandBuffer>;
}

/// A command buffer under construction.
///
/// Encoders borrow the buffer's recording position; at most one may be open
/// at a time.
pub trait MtlCommandBuffer {
    /// Opens a render encoder for the given pass.
    fn render_encoder(&mut self, desc: &RenderPassDescriptor)
        -> Box<dyn MtlRenderCommandEncoder>;
    /// Opens a compute encoder.
    fn compute_encoder(&mut self) -> Box<dyn MtlComputeCommandEncoder>;
    /// Opens a blit encoder.
    fn blit_encoder(&mut self) -> Box<dyn MtlBlitCommandEncoder>;

    /// Registers a handler invoked when the GPU finishes this buffer.
    fn on_completed(&mut self, handler: CompletionHandler);
    /// Schedules `drawable` for presentation after this buffer executes.
    fn present_drawable(&mut self, drawable: &DrawableHandle);

    /// Submits the buffer for execution.
    fn commit(self: Box<Self>);
    /// Submits and blocks until the GPU has finished executing it.
    fn commit_and_wait(self: Box<Self>);
}
