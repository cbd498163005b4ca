//! Command encoder traits.
//!
//! One encoder is open on a command buffer at a time; ending an encoder
//! before opening the next is the caller's responsibility (the translation
//! layer's encoder management enforces it).

use crate::format::{
    CullMode, DepthClipMode, IndexType, PrimitiveType, ScissorRect, TriangleFillMode,
    Viewport, VisibilityResultMode, Winding,
};
use crate::object::{
    BufferHandle, ComputePipelineHandle, DepthStencilHandle, RenderPipelineHandle, SamplerHandle,
    TextureHandle,
};

/// Operations common to every encoder kind.
pub trait MtlCommandEncoder {
    /// Opens a nested debug group.
    fn push_debug_group(&mut self, label: &str);
    /// Closes the innermost debug group.
    fn pop_debug_group(&mut self);
    /// Inserts a point marker.
    fn insert_debug_signpost(&mut self, label: &str);
    /// Ends encoding. No commands may follow.
    fn end_encoding(&mut self);
}

/// A render command encoder.
pub trait MtlRenderCommandEncoder: MtlCommandEncoder {
    /// Binds the render pipeline.
    fn set_render_pipeline_state(&mut self, pipeline: &RenderPipelineHandle);

    /// Binds a vertex-stage buffer at `index`, or unbinds with `None`.
    fn set_vertex_buffer(&mut self, index: usize, buffer: Option<&BufferHandle>, offset: usize);
    /// Rebinds only the offset of the vertex-stage buffer at `index`.
    fn set_vertex_buffer_offset(&mut self, index: usize, offset: usize);
    /// Binds a vertex-stage texture at `index`.
    fn set_vertex_texture(&mut self, index: usize, texture: Option<&TextureHandle>);
    /// Binds a vertex-stage sampler at `index`.
    fn set_vertex_sampler_state(&mut self, index: usize, sampler: Option<&SamplerHandle>);

    /// Binds a fragment-stage buffer at `index`, or unbinds with `None`.
    fn set_fragment_buffer(&mut self, index: usize, buffer: Option<&BufferHandle>, offset: usize);
    /// Binds a fragment-stage texture at `index`.
    fn set_fragment_texture(&mut self, index: usize, texture: Option<&TextureHandle>);
    /// Binds a fragment-stage sampler at `index`.
    fn set_fragment_sampler_state(&mut self, index: usize, sampler: Option<&SamplerHandle>);

    /// Binds the depth/stencil state object.
    fn set_depth_stencil_state(&mut self, state: &DepthStencilHandle);
    /// Sets the stencil reference value.
    fn set_stencil_reference_value(&mut self, value: u32);
    /// Sets face culling.
    fn set_cull_mode(&mut self, mode: CullMode);
    /// Sets the front-facing winding.
    fn set_front_facing_winding(&mut self, winding: Winding);
    /// Sets triangle fill mode.
    fn set_triangle_fill_mode(&mut self, mode: TriangleFillMode);
    /// Sets depth clip/clamp behavior.
    fn set_depth_clip_mode(&mut self, mode: DepthClipMode);
    /// Sets the depth bias equation parameters.
    fn set_depth_bias(&mut self, bias: f32, slope_scale: f32, clamp: f32);
    /// Sets the viewport.
    fn set_viewport(&mut self, viewport: Viewport);
    /// Sets the scissor rectangle. Must lie within the render targets.
    fn set_scissor_rect(&mut self, rect: ScissorRect);
    /// Sets the constant blend color.
    fn set_blend_color(&mut self, red: f32, green: f32, blue: f32, alpha: f32);
    /// Sets the visibility-result mode and the result slot byte offset.
    fn set_visibility_result_mode(&mut self, mode: VisibilityResultMode, offset: usize);

    /// Non-indexed draw.
    fn draw_primitives(
        &mut self,
        primitive: PrimitiveType,
        vertex_start: usize,
        vertex_count: usize,
        instance_count: usize,
        base_instance: usize,
    );
    /// Indexed draw.
    #[allow(clippy::too_many_arguments)]
    fn draw_indexed_primitives(
        &mut self,
        primitive: PrimitiveType,
        index_count: usize,
        index_type: IndexType,
        index_buffer: &BufferHandle,
        index_buffer_offset: usize,
        instance_count: usize,
        base_vertex: i64,
        base_instance: usize,
    );
}

/// A compute command encoder.
pub trait MtlComputeCommandEncoder: MtlCommandEncoder {
    /// Binds the compute pipeline.
    fn set_compute_pipeline_state(&mut self, pipeline: &ComputePipelineHandle);
    /// Binds a buffer at `index`, or unbinds with `None`.
    fn set_buffer(&mut self, index: usize, buffer: Option<&BufferHandle>, offset: usize);
    /// Binds a texture at `index`.
    fn set_texture(&mut self, index: usize, texture: Option<&TextureHandle>);
    /// Binds a sampler at `index`.
    fn set_sampler_state(&mut self, index: usize, sampler: Option<&SamplerHandle>);
    /// Dispatches `thread_groups` groups of `threads_per_group` threads.
    fn dispatch_thread_groups(&mut self, thread_groups: [u32; 3], threads_per_group: [u32; 3]);
}

/// A blit command encoder.
pub trait MtlBlitCommandEncoder: MtlCommandEncoder {
    /// Copies a byte range between buffers.
    fn copy_buffer(
        &mut self,
        source: &BufferHandle,
        source_offset: usize,
        destination: &BufferHandle,
        destination_offset: usize,
        size: usize,
    );
    /// Copies the full contents of `source` into `destination`. Formats and
    /// dimensions must match.
    fn copy_texture(&mut self, source: &TextureHandle, destination: &TextureHandle);
    /// Schedules a managed-storage resource for synchronization.
    fn synchronize_buffer(&mut self, buffer: &BufferHandle);
}
