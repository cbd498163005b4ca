//! The translation context: the D3D11-shaped frontend over one device.
//!
//! Every setter is a cheap recording operation against cached state;
//! nothing touches an encoder until a draw or dispatch flushes the dirty
//! subset. Encoders are created lazily and swapped only when the render
//! targets change or the workload kind changes, with queued debug markers
//! replayed across the swap.

use crate::config::ContextConfig;
use crate::error::ContextError;
use crate::events::{FlushMode, GpuEventQueue};
use crate::frame::{ContextEvent, FrameSemaphore};
use crate::pipeline::{Pipeline, PipelineCache, PipelineConfiguration};
use crate::ring::RingBuffer;
use crate::shader::{ShaderId, ShaderRegistry, ShaderStage};
use crate::state::{
    vertex_buffer_table_index, BufferBinding, DepthStencilState, InputAssemblerState,
    RasterizerDirty, RasterizerState, StageState, VertexBufferBinding, ViewportState,
    MAX_CONSTANT_BUFFERS, MAX_STAGE_SAMPLERS, MAX_STAGE_TEXTURES, MAX_UAV_BUFFERS,
    MAX_VERTEX_BUFFERS, UAV_BUFFER_BASE,
};
use crate::target::{DepthStencilTargetHandle, RenderTargetHandle};
use dxmetal_dxbc::ShaderReflection;
use dxmetal_metal::{
    BufferHandle, Capabilities, ClearColor, ColorAttachmentBlend, CullMode, DepthClipMode,
    DepthStencilDescriptor, DrawableHandle, IndexType, LoadAction, MtlBlitCommandEncoder,
    MtlBuffer, MtlCommandBuffer, MtlCommandQueue, MtlComputeCommandEncoder, MtlDevice,
    MtlRenderCommandEncoder, MtlTexture, PixelFormat, PrimitiveType, RenderPassColorAttachment,
    RenderPassDepthAttachment, RenderPassDescriptor, RenderPassStencilAttachment,
    RenderPipelineColorAttachment, SamplerDescriptor, SamplerHandle, ScissorRect, StorageMode,
    StoreAction, TextureHandle, TriangleFillMode, VertexAttribute, VertexBufferLayout,
    VertexDescriptor, VertexStepFunction, Viewport, VisibilityResultMode, Winding,
    MAX_COLOR_ATTACHMENTS,
};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Identifier of an occlusion query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryId(u64);

struct ActiveQuery {
    id: QueryId,
    offset: usize,
}

struct PendingQuery {
    offset: usize,
    event: ContextEvent,
}

enum ActiveEncoder {
    None,
    Render(Box<dyn MtlRenderCommandEncoder>),
    Compute(Box<dyn MtlComputeCommandEncoder>),
    Blit(Box<dyn MtlBlitCommandEncoder>),
}

/// The GPU state tracker and command recorder.
pub struct Context {
    device: Arc<dyn MtlDevice>,
    queue: Arc<dyn MtlCommandQueue>,
    config: ContextConfig,
    capabilities: Capabilities,

    command_buffer: Option<Box<dyn MtlCommandBuffer>>,
    encoder: ActiveEncoder,

    shaders: ShaderRegistry,
    pipelines: PipelineCache,
    current_pipeline: Option<Rc<Pipeline>>,
    pipeline_dirty: bool,
    compute_pipeline_dirty: bool,

    vertex_shader: Option<ShaderId>,
    fragment_shader: Option<ShaderId>,
    compute_shader: Option<ShaderId>,

    vertex_stage: StageState,
    fragment_stage: StageState,
    compute_stage: StageState,

    rasterizer: RasterizerState,
    depth_stencil: DepthStencilState,
    depth_stencil_states: HashMap<DepthStencilDescriptor, dxmetal_metal::DepthStencilHandle>,
    blend: [ColorAttachmentBlend; MAX_COLOR_ATTACHMENTS],
    blend_color: [f32; 4],
    blend_color_dirty: bool,
    input_assembler: InputAssemblerState,
    input_layout: Vec<(usize, VertexAttribute)>,
    viewport: ViewportState,

    render_targets: Vec<Option<RenderTargetHandle>>,
    depth_target: Option<DepthStencilTargetHandle>,
    framebuffer_size: (u32, u32),
    framebuffer_dirty: bool,

    transient_ring: RingBuffer,
    query_ring: RingBuffer,

    events: GpuEventQueue,
    semaphore: FrameSemaphore,
    frame_slot: usize,
    frame_event: ContextEvent,

    default_sampler: SamplerHandle,

    active_query: Option<ActiveQuery>,
    pending_queries: HashMap<QueryId, PendingQuery>,
    next_query_id: u64,
    visibility_dirty: bool,
    sample_count: usize,
}

impl Context {
    /// Creates a context over `device` with the given tuning.
    pub fn new(device: Arc<dyn MtlDevice>, config: ContextConfig) -> Result<Context, ContextError> {
        let queue = device.new_command_queue();
        let transient = device.new_buffer(config.transient_ring_capacity, StorageMode::Shared)?;
        let query = device.new_buffer(config.query_ring_capacity, StorageMode::Shared)?;
        let default_sampler = device.new_sampler_state(&SamplerDescriptor::default())?;
        let capabilities = device.capabilities().clone();

        Ok(Context {
            queue,
            capabilities,
            command_buffer: None,
            encoder: ActiveEncoder::None,
            shaders: ShaderRegistry::new(),
            pipelines: PipelineCache::new(),
            current_pipeline: None,
            pipeline_dirty: true,
            compute_pipeline_dirty: true,
            vertex_shader: None,
            fragment_shader: None,
            compute_shader: None,
            vertex_stage: StageState::new(),
            fragment_stage: StageState::new(),
            compute_stage: StageState::new(),
            rasterizer: RasterizerState::new(),
            depth_stencil: DepthStencilState::new(),
            depth_stencil_states: HashMap::new(),
            blend: Default::default(),
            blend_color: [0.0; 4],
            blend_color_dirty: true,
            input_assembler: InputAssemblerState::new(),
            input_layout: Vec::new(),
            viewport: ViewportState::new(),
            render_targets: vec![None; MAX_COLOR_ATTACHMENTS],
            depth_target: None,
            framebuffer_size: (0, 0),
            framebuffer_dirty: true,
            transient_ring: RingBuffer::new(
                transient,
                config.frame_queue_depth,
                config.transient_reservation_floor,
            ),
            query_ring: RingBuffer::new(query, config.frame_queue_depth, 0),
            events: GpuEventQueue::new(),
            semaphore: FrameSemaphore::new(config.frame_queue_depth),
            frame_slot: 0,
            frame_event: ContextEvent::new(),
            default_sampler,
            active_query: None,
            pending_queries: HashMap::new(),
            next_query_id: 0,
            visibility_dirty: false,
            sample_count: 1,
            config,
            device,
        })
    }

    /// The device's capability snapshot.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// The pipeline cache, for inspection.
    pub fn pipelines(&self) -> &PipelineCache {
        &self.pipelines
    }

    /// The shader registry, for inspection.
    pub fn shaders(&self) -> &ShaderRegistry {
        &self.shaders
    }

    /// The frame slot current allocations are attributed to.
    pub fn frame_slot(&self) -> usize {
        self.frame_slot
    }

    /// The pipeline bound by the most recent draw or dispatch.
    pub fn current_pipeline(&self) -> Option<&Rc<Pipeline>> {
        self.current_pipeline.as_ref()
    }

    // ---- shaders ----

    /// Parses `bytecode`, compiles its generated MSL, and registers the
    /// shader. A parse failure registers nothing.
    pub fn initialize_shader(&mut self, bytecode: &[u8]) -> Result<ShaderId, ContextError> {
        let reflection = ShaderReflection::parse(bytecode)?;
        let stage: ShaderStage = reflection.stage().into();
        let function = self
            .device
            .new_function(&reflection.mtlx.msl_source, stage.entry_point())?;
        let id = self.shaders.register(function, reflection);
        debug!(shader = id.0, ?stage, "initialized shader");
        Ok(id)
    }

    /// Destroys a shader and evicts every pipeline built from it.
    pub fn destroy_shader(&mut self, id: ShaderId) -> Result<(), ContextError> {
        let shader = self
            .shaders
            .remove(id)
            .ok_or(ContextError::UnknownShader(id))?;
        self.pipelines.evict_for_shader(&shader, &self.shaders);
        if self.vertex_shader == Some(id) {
            self.vertex_shader = None;
            self.pipeline_dirty = true;
        }
        if self.fragment_shader == Some(id) {
            self.fragment_shader = None;
            self.pipeline_dirty = true;
        }
        if self.compute_shader == Some(id) {
            self.compute_shader = None;
            self.compute_pipeline_dirty = true;
        }
        self.current_pipeline = None;
        Ok(())
    }

    /// Binds (or unbinds) the vertex shader.
    pub fn set_vertex_shader(&mut self, shader: Option<ShaderId>) -> Result<(), ContextError> {
        self.bind_stage_shader(ShaderStage::Vertex, shader)
    }

    /// Binds (or unbinds) the fragment shader.
    pub fn set_fragment_shader(&mut self, shader: Option<ShaderId>) -> Result<(), ContextError> {
        self.bind_stage_shader(ShaderStage::Fragment, shader)
    }

    /// Binds (or unbinds) the compute shader.
    pub fn set_compute_shader(&mut self, shader: Option<ShaderId>) -> Result<(), ContextError> {
        self.bind_stage_shader(ShaderStage::Compute, shader)
    }

    fn bind_stage_shader(
        &mut self,
        stage: ShaderStage,
        shader: Option<ShaderId>,
    ) -> Result<(), ContextError> {
        if let Some(id) = shader {
            let registered = self
                .shaders
                .get(id)
                .ok_or(ContextError::UnknownShader(id))?;
            if registered.stage() != stage {
                error!(
                    shader = id.0,
                    requested = ?stage,
                    actual = ?registered.stage(),
                    "shader bound to the wrong stage"
                );
                return Err(ContextError::UnknownShader(id));
            }
        }
        let slot = match stage {
            ShaderStage::Vertex => &mut self.vertex_shader,
            ShaderStage::Fragment => &mut self.fragment_shader,
            ShaderStage::Compute => &mut self.compute_shader,
        };
        if *slot != shader {
            *slot = shader;
            match stage {
                ShaderStage::Compute => self.compute_pipeline_dirty = true,
                _ => self.pipeline_dirty = true,
            }
        }
        Ok(())
    }

    // ---- resource bindings ----

    /// Binds a constant buffer at `slot` for `stage`.
    pub fn set_constant_buffer(
        &mut self,
        stage: ShaderStage,
        slot: usize,
        buffer: Option<&BufferHandle>,
        offset: usize,
    ) {
        if slot >= MAX_CONSTANT_BUFFERS {
            warn!(slot, "constant buffer slot out of range, ignored");
            return;
        }
        let state = self.stage_state_mut(stage);
        state.buffers[slot] = BufferBinding {
            buffer: buffer.cloned(),
            offset,
        };
        state.buffers_dirty.mark(slot);
    }

    /// Copies `data` into the transient ring and binds it as the constant
    /// buffer at `slot` for `stage`.
    pub fn set_constant_data(
        &mut self,
        stage: ShaderStage,
        slot: usize,
        data: &[u8],
    ) -> Result<(), ContextError> {
        if slot >= MAX_CONSTANT_BUFFERS {
            warn!(slot, "constant buffer slot out of range, ignored");
            return Ok(());
        }
        let offset = self
            .transient_ring
            .write(self.frame_slot, data, self.config.constant_alignment)?;
        let buffer = Arc::clone(self.transient_ring.buffer());
        let state = self.stage_state_mut(stage);
        state.buffers[slot] = BufferBinding {
            buffer: Some(buffer),
            offset,
        };
        state.buffers_dirty.mark(slot);
        Ok(())
    }

    /// Binds a texture at `slot` for `stage`.
    pub fn set_texture(&mut self, stage: ShaderStage, slot: usize, texture: Option<&TextureHandle>) {
        if slot >= MAX_STAGE_TEXTURES {
            warn!(slot, "texture slot out of range, ignored");
            return;
        }
        let state = self.stage_state_mut(stage);
        state.textures[slot] = texture.cloned();
        state.textures_dirty.mark(slot);
    }

    /// Binds a sampler at `slot` for `stage`.
    pub fn set_sampler(&mut self, stage: ShaderStage, slot: usize, sampler: Option<&SamplerHandle>) {
        if slot >= MAX_STAGE_SAMPLERS {
            warn!(slot, "sampler slot out of range, ignored");
            return;
        }
        let state = self.stage_state_mut(stage);
        state.samplers[slot] = sampler.cloned();
        state.samplers_dirty.mark(slot);
    }

    /// Binds an unordered-access buffer at UAV `slot` for `stage`.
    pub fn set_uav_buffer(
        &mut self,
        stage: ShaderStage,
        slot: usize,
        buffer: Option<&BufferHandle>,
        offset: usize,
    ) {
        if slot >= MAX_UAV_BUFFERS {
            warn!(slot, "UAV buffer slot out of range, ignored");
            return;
        }
        let index = UAV_BUFFER_BASE + slot;
        let state = self.stage_state_mut(stage);
        state.buffers[index] = BufferBinding {
            buffer: buffer.cloned(),
            offset,
        };
        state.buffers_dirty.mark(index);
    }

    fn stage_state_mut(&mut self, stage: ShaderStage) -> &mut StageState {
        match stage {
            ShaderStage::Vertex => &mut self.vertex_stage,
            ShaderStage::Fragment => &mut self.fragment_stage,
            ShaderStage::Compute => &mut self.compute_stage,
        }
    }

    // ---- input assembler ----

    /// Binds a vertex buffer at input slot `slot`.
    pub fn set_vertex_buffer(
        &mut self,
        slot: usize,
        buffer: Option<&BufferHandle>,
        offset: usize,
        stride: usize,
    ) {
        if slot >= MAX_VERTEX_BUFFERS {
            warn!(slot, "vertex buffer slot out of range, ignored");
            return;
        }
        let binding = &mut self.input_assembler.vertex_buffers[slot];
        if binding.stride != stride {
            // A stride change invalidates the baked vertex layout.
            self.pipeline_dirty = true;
        }
        *binding = VertexBufferBinding {
            buffer: buffer.cloned(),
            offset,
            stride,
        };
        self.input_assembler.vertex_buffers_dirty.mark(slot);
    }

    /// Binds the index buffer.
    pub fn set_index_buffer(
        &mut self,
        buffer: Option<&BufferHandle>,
        index_type: IndexType,
        offset: usize,
    ) {
        self.input_assembler.index_buffer = buffer.cloned();
        self.input_assembler.index_type = index_type;
        self.input_assembler.index_offset = offset;
    }

    /// Sets the vertex input layout.
    ///
    /// `attributes` pairs a shader attribute slot with its format, byte
    /// offset, and the frontend vertex buffer slot it reads from; strides
    /// come from the bound vertex buffers at draw time.
    pub fn set_input_layout(&mut self, attributes: &[(usize, VertexAttribute)]) {
        self.input_layout = attributes.to_vec();
        self.pipeline_dirty = true;
    }

    /// Sets the primitive topology.
    pub fn set_primitive_topology(&mut self, primitive: PrimitiveType) {
        self.input_assembler.primitive = primitive;
    }

    // ---- fixed function ----

    /// Sets per-attachment blend state, first attachment first. Unlisted
    /// attachments reset to no blending.
    pub fn set_blend_state(&mut self, attachments: &[ColorAttachmentBlend]) {
        if attachments.len() > MAX_COLOR_ATTACHMENTS {
            warn!(
                count = attachments.len(),
                "too many blend attachments, extra entries ignored"
            );
        }
        for (i, slot) in self.blend.iter_mut().enumerate() {
            *slot = attachments.get(i).cloned().unwrap_or_default();
        }
        self.pipeline_dirty = true;
    }

    /// Sets the constant blend color.
    pub fn set_blend_color(&mut self, color: [f32; 4]) {
        if self.blend_color != color {
            self.blend_color = color;
            self.blend_color_dirty = true;
        }
    }

    /// Sets the depth/stencil descriptor; realized as a state object at the
    /// next draw.
    pub fn set_depth_stencil_state(&mut self, descriptor: DepthStencilDescriptor) {
        if self.depth_stencil.descriptor != descriptor {
            self.depth_stencil.descriptor = descriptor;
            self.depth_stencil.state_dirty = true;
        }
    }

    /// Sets the stencil reference value.
    pub fn set_stencil_reference(&mut self, reference: u32) {
        if self.depth_stencil.stencil_reference != reference {
            self.depth_stencil.stencil_reference = reference;
            self.depth_stencil.reference_dirty = true;
        }
    }

    /// Sets face culling.
    pub fn set_cull_mode(&mut self, mode: CullMode) {
        if self.rasterizer.cull_mode != mode {
            self.rasterizer.cull_mode = mode;
            self.rasterizer.dirty |= RasterizerDirty::CULL_MODE;
        }
    }

    /// Sets the front-facing winding.
    pub fn set_front_facing_winding(&mut self, winding: Winding) {
        if self.rasterizer.winding != winding {
            self.rasterizer.winding = winding;
            self.rasterizer.dirty |= RasterizerDirty::WINDING;
        }
    }

    /// Sets triangle fill mode.
    pub fn set_fill_mode(&mut self, mode: TriangleFillMode) {
        if self.rasterizer.fill_mode != mode {
            self.rasterizer.fill_mode = mode;
            self.rasterizer.dirty |= RasterizerDirty::FILL_MODE;
        }
    }

    /// Sets the depth bias equation parameters.
    pub fn set_depth_bias(&mut self, bias: f32, slope_scaled: f32, clamp: f32) {
        let r = &mut self.rasterizer;
        if r.depth_bias != bias || r.slope_scaled_depth_bias != slope_scaled || r.depth_bias_clamp != clamp
        {
            r.depth_bias = bias;
            r.slope_scaled_depth_bias = slope_scaled;
            r.depth_bias_clamp = clamp;
            r.dirty |= RasterizerDirty::DEPTH_BIAS;
        }
    }

    /// Enables or disables depth clipping. Disabling clamps depth instead,
    /// when the device supports it.
    pub fn set_depth_clip_enabled(&mut self, enabled: bool) {
        let mode = if enabled {
            DepthClipMode::Clip
        } else if self.capabilities.supports_depth_clamp {
            DepthClipMode::Clamp
        } else {
            warn!("depth clamp not supported by the device, keeping depth clip");
            DepthClipMode::Clip
        };
        if self.rasterizer.depth_clip != mode {
            self.rasterizer.depth_clip = mode;
            self.rasterizer.dirty |= RasterizerDirty::DEPTH_CLIP;
        }
    }

    /// Enables or disables scissor testing.
    pub fn set_scissor_enabled(&mut self, enabled: bool) {
        if self.rasterizer.scissor_enabled != enabled {
            self.rasterizer.scissor_enabled = enabled;
            self.rasterizer.dirty |= RasterizerDirty::SCISSOR;
        }
    }

    /// Sets the scissor rectangle, clamped to the viewport at flush.
    pub fn set_scissor_rect(&mut self, rect: ScissorRect) {
        self.rasterizer.scissor_rect = rect;
        self.rasterizer.dirty |= RasterizerDirty::SCISSOR;
    }

    /// Sets the viewport.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport.current = Some(viewport);
        self.viewport.dirty = true;
        // The scissor clamp depends on the viewport.
        self.rasterizer.dirty |= RasterizerDirty::SCISSOR;
    }

    /// Sets the multisample coverage mask. All attachments are
    /// single-sampled, so only the all-ones mask has an effect.
    pub fn set_sample_mask(&mut self, mask: u32) {
        if mask != u32::MAX {
            warn!(mask, "partial sample masks are not supported, ignored");
        }
    }

    // ---- render targets and clears ----

    /// Binds the given color targets and depth/stencil target.
    ///
    /// The encoder swap is deferred to the next draw; markers queued before
    /// this call stay with the current encoder.
    pub fn set_render_targets(
        &mut self,
        colors: &[Option<RenderTargetHandle>],
        depth: Option<DepthStencilTargetHandle>,
    ) {
        if colors.len() > MAX_COLOR_ATTACHMENTS {
            warn!(
                count = colors.len(),
                "too many render targets, extra entries ignored"
            );
        }

        let mut new_targets: Vec<Option<RenderTargetHandle>> = vec![None; MAX_COLOR_ATTACHMENTS];
        for (slot, target) in colors.iter().take(MAX_COLOR_ATTACHMENTS).enumerate() {
            new_targets[slot] = target.clone();
        }

        let colors_unchanged = self
            .render_targets
            .iter()
            .zip(new_targets.iter())
            .all(|(a, b)| match (a, b) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            });
        let depth_unchanged = match (&self.depth_target, &depth) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if colors_unchanged && depth_unchanged {
            return;
        }

        self.events.on_set_render_targets();
        self.render_targets = new_targets;
        self.depth_target = depth;
        self.framebuffer_dirty = true;
        self.pipeline_dirty = true;

        let size = self
            .render_targets
            .iter()
            .flatten()
            .map(|t| t.texture())
            .chain(self.depth_target.iter().map(|t| t.texture()))
            .next()
            .map(|t| (t.width(), t.height()))
            .unwrap_or((0, 0));
        self.framebuffer_size = size;
        self.viewport.default = Viewport {
            x: 0.0,
            y: 0.0,
            width: size.0 as f64,
            height: size.1 as f64,
            znear: 0.0,
            zfar: 1.0,
        };
        self.viewport.dirty = true;
    }

    /// Records a deferred clear on a color target. The clear becomes the
    /// load action of the pass that next binds the target.
    pub fn clear_render_target(&mut self, target: &RenderTargetHandle, color: ClearColor) {
        target.record_clear(color);
    }

    /// Records a deferred depth and/or stencil clear.
    pub fn clear_depth_stencil(
        &mut self,
        target: &DepthStencilTargetHandle,
        depth: Option<f64>,
        stencil: Option<u32>,
    ) {
        target.record_clear(depth, stencil);
    }

    // ---- draws ----

    /// Non-indexed, non-instanced draw.
    pub fn draw(&mut self, vertex_start: usize, vertex_count: usize) -> Result<(), ContextError> {
        self.draw_instanced(vertex_start, vertex_count, 1, 0)
    }

    /// Non-indexed instanced draw.
    pub fn draw_instanced(
        &mut self,
        vertex_start: usize,
        vertex_count: usize,
        instance_count: usize,
        base_instance: usize,
    ) -> Result<(), ContextError> {
        self.pre_draw()?;
        let (_, base_instance) = self.gate_base_offsets(0, base_instance);
        let primitive = self.input_assembler.primitive;
        if let ActiveEncoder::Render(encoder) = &mut self.encoder {
            encoder.draw_primitives(primitive, vertex_start, vertex_count, instance_count, base_instance);
        }
        Ok(())
    }

    /// Indexed, non-instanced draw.
    pub fn draw_indexed(
        &mut self,
        index_count: usize,
        first_index: usize,
        base_vertex: i64,
    ) -> Result<(), ContextError> {
        self.draw_indexed_instanced(index_count, first_index, base_vertex, 1, 0)
    }

    /// Indexed instanced draw.
    pub fn draw_indexed_instanced(
        &mut self,
        index_count: usize,
        first_index: usize,
        base_vertex: i64,
        instance_count: usize,
        base_instance: usize,
    ) -> Result<(), ContextError> {
        let index_buffer = self
            .input_assembler
            .index_buffer
            .clone()
            .ok_or(ContextError::MissingIndexBuffer)?;
        self.pre_draw()?;
        let (base_vertex, base_instance) = self.gate_base_offsets(base_vertex, base_instance);
        let index_type = self.input_assembler.index_type;
        let offset = self.input_assembler.index_offset + first_index * index_type.stride();
        let primitive = self.input_assembler.primitive;
        if let ActiveEncoder::Render(encoder) = &mut self.encoder {
            encoder.draw_indexed_primitives(
                primitive,
                index_count,
                index_type,
                &index_buffer,
                offset,
                instance_count,
                base_vertex,
                base_instance,
            );
        }
        Ok(())
    }

    fn gate_base_offsets(&self, base_vertex: i64, base_instance: usize) -> (i64, usize) {
        if self.capabilities.supports_base_vertex_instance {
            return (base_vertex, base_instance);
        }
        if base_vertex != 0 || base_instance != 0 {
            warn!(
                base_vertex,
                base_instance, "base vertex/instance not supported by the device, zeroed"
            );
        }
        (0, 0)
    }

    // ---- compute ----

    /// Dispatches `thread_groups` groups of the bound compute shader.
    ///
    /// Threads per group come from the shader's own backend trailer, never
    /// from the caller; the cross-compiler baked them into the kernel.
    pub fn dispatch(&mut self, thread_groups: [u32; 3]) -> Result<(), ContextError> {
        let cs_id = self
            .compute_shader
            .ok_or(ContextError::MissingBoundShader("compute"))?;
        let threads_per_group = self
            .shaders
            .get(cs_id)
            .ok_or(ContextError::UnknownShader(cs_id))?
            .reflection()
            .mtlx
            .threads_per_group()
            .ok_or(ContextError::MissingBoundShader("compute"))?;

        self.ensure_compute_encoder();
        self.flush_compute_pipeline(cs_id)?;
        self.flush_compute_bindings();
        self.flush_markers(FlushMode::Default);

        if let ActiveEncoder::Compute(encoder) = &mut self.encoder {
            encoder.dispatch_thread_groups(thread_groups, threads_per_group);
        }
        Ok(())
    }

    fn ensure_compute_encoder(&mut self) {
        if matches!(self.encoder, ActiveEncoder::Compute(_)) {
            return;
        }
        self.end_encoder();
        let mut encoder = self.command_buffer_mut().compute_encoder();
        self.events.flush_actions(encoder.as_mut(), FlushMode::NewEncoder);
        self.encoder = ActiveEncoder::Compute(encoder);
        self.compute_stage.mark_all_dirty();
        self.compute_pipeline_dirty = true;
    }

    fn flush_compute_pipeline(&mut self, cs_id: ShaderId) -> Result<(), ContextError> {
        if !self.compute_pipeline_dirty {
            return Ok(());
        }
        let config = PipelineConfiguration {
            compute_shader: Some(cs_id),
            ..PipelineConfiguration::default()
        };
        let pipeline = self
            .pipelines
            .allocate(self.device.as_ref(), &self.shaders, &config)?;
        if let (ActiveEncoder::Compute(encoder), Some(state)) =
            (&mut self.encoder, pipeline.compute_state())
        {
            encoder.set_compute_pipeline_state(state);
        }
        self.current_pipeline = Some(pipeline);
        self.compute_pipeline_dirty = false;
        Ok(())
    }

    fn flush_compute_bindings(&mut self) {
        let ActiveEncoder::Compute(encoder) = &mut self.encoder else {
            return;
        };
        let stage = &mut self.compute_stage;
        if let Some((lo, hi)) = stage.buffers_dirty.take() {
            for i in lo..=hi {
                let binding = &stage.buffers[i];
                encoder.set_buffer(i, binding.buffer.as_ref(), binding.offset);
            }
        }
        if let Some((lo, hi)) = stage.textures_dirty.take() {
            for i in lo..=hi {
                encoder.set_texture(i, stage.textures[i].as_ref());
            }
        }
        if let Some((lo, hi)) = stage.samplers_dirty.take() {
            for i in lo..=hi {
                let sampler = stage.samplers[i].as_ref().unwrap_or(&self.default_sampler);
                encoder.set_sampler_state(i, Some(sampler));
            }
        }
    }

    // ---- occlusion queries ----

    /// Begins an occlusion query. At most one may be active; the backend
    /// has a single visibility counter.
    pub fn begin_occlusion_query(&mut self) -> Result<QueryId, ContextError> {
        if self.active_query.is_some() {
            error!("occlusion query begun while another is active");
            return Err(ContextError::QueryAlreadyActive);
        }
        let offset = self
            .query_ring
            .allocate(self.frame_slot, 8, self.config.query_alignment)?;
        // The counter slot must start at zero; the GPU only accumulates.
        self.query_ring.buffer().write(offset, &[0u8; 8])?;

        self.next_query_id += 1;
        let id = QueryId(self.next_query_id);
        self.active_query = Some(ActiveQuery { id, offset });
        self.visibility_dirty = true;
        Ok(id)
    }

    /// Ends the active occlusion query.
    pub fn end_occlusion_query(&mut self, id: QueryId) -> Result<(), ContextError> {
        match self.active_query.take() {
            Some(query) if query.id == id => {
                if let ActiveEncoder::Render(encoder) = &mut self.encoder {
                    encoder.set_visibility_result_mode(VisibilityResultMode::Disabled, 0);
                }
                self.visibility_dirty = false;
                self.pending_queries.insert(
                    id,
                    PendingQuery {
                        offset: query.offset,
                        event: self.frame_event.clone(),
                    },
                );
                Ok(())
            }
            other => {
                self.active_query = other;
                Err(ContextError::UnknownQuery)
            }
        }
    }

    /// Returns the sample count of a finished query, or `None` while its
    /// command buffer has not retired on the GPU.
    pub fn occlusion_query_result(&mut self, id: QueryId) -> Result<Option<u64>, ContextError> {
        let pending = self
            .pending_queries
            .get(&id)
            .ok_or(ContextError::UnknownQuery)?;
        if !pending.event.is_triggered() {
            return Ok(None);
        }
        let bytes = self.query_ring.buffer().read(pending.offset, 8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes);
        self.pending_queries.remove(&id);
        Ok(Some(u64::from_le_bytes(raw)))
    }

    // ---- debug markers ----

    /// Opens a nested debug group.
    pub fn push_debug_group(&mut self, label: &str) {
        self.events.push_group(label);
    }

    /// Closes the innermost debug group.
    pub fn pop_debug_group(&mut self) {
        self.events.pop_group();
    }

    /// Inserts a point marker.
    pub fn insert_debug_marker(&mut self, label: &str) {
        self.events.event(label);
    }

    // ---- frames and submission ----

    /// Starts a frame: blocks until a frame slot retires on the GPU, then
    /// reclaims the slot's transient allocations.
    pub fn begin_frame(&mut self) {
        self.semaphore.acquire();
        let next = (self.frame_slot + 1) % self.config.frame_queue_depth;
        // The slot being entered is the one whose frame just retired.
        self.transient_ring.on_frame_start(next, next);
        self.query_ring.on_frame_start(next, next);
        self.frame_slot = next;
    }

    /// Ends open encoders and submits the command buffer, optionally
    /// presenting `drawable`. Presenting releases a frame slot when the GPU
    /// retires the buffer.
    pub fn flush(&mut self, present: Option<&DrawableHandle>) {
        self.end_encoder();
        if self.command_buffer.is_none() && present.is_none() {
            return;
        }
        let mut cmd = match self.command_buffer.take() {
            Some(cmd) => cmd,
            None => self.queue.command_buffer(),
        };

        let event = std::mem::replace(&mut self.frame_event, ContextEvent::new());
        event.mark_submitted();
        let completion = event.clone();
        let semaphore = present.is_some().then(|| self.semaphore.clone());
        cmd.on_completed(Box::new(move || {
            completion.trigger();
            if let Some(semaphore) = semaphore {
                semaphore.release();
            }
        }));

        if let Some(drawable) = present {
            cmd.present_drawable(drawable);
        }
        cmd.commit();
    }

    /// Submits the command buffer and blocks until the GPU retires it.
    /// Used as the teardown drain path.
    pub fn flush_and_wait(&mut self) {
        self.end_encoder();
        let Some(mut cmd) = self.command_buffer.take() else {
            return;
        };
        let event = std::mem::replace(&mut self.frame_event, ContextEvent::new());
        event.mark_submitted();
        let completion = event.clone();
        cmd.on_completed(Box::new(move || completion.trigger()));
        cmd.commit_and_wait();
    }

    // ---- copies ----

    /// Full-texture copy through the blit path. Formats and dimensions
    /// must match.
    pub fn copy_texture(&mut self, destination: &TextureHandle, source: &TextureHandle) {
        if source.pixel_format() != destination.pixel_format() {
            warn!(
                source = ?source.pixel_format(),
                destination = ?destination.pixel_format(),
                "copying between differing pixel formats through the blit path"
            );
        }
        self.blit_encoder().copy_texture(source, destination);
    }

    /// The blit encoder, ending any other open encoder first. Queued debug
    /// markers replay onto the new encoder.
    pub fn blit_encoder(&mut self) -> &mut dyn MtlBlitCommandEncoder {
        if !matches!(self.encoder, ActiveEncoder::Blit(_)) {
            self.end_encoder();
            let mut encoder = self.command_buffer_mut().blit_encoder();
            self.events.flush_actions(encoder.as_mut(), FlushMode::NewEncoder);
            self.encoder = ActiveEncoder::Blit(encoder);
        }
        match &mut self.encoder {
            ActiveEncoder::Blit(encoder) => encoder.as_mut(),
            // Set just above.
            _ => unreachable!("blit encoder was just activated"),
        }
    }

    // ---- flush machinery ----

    fn command_buffer_mut(&mut self) -> &mut dyn MtlCommandBuffer {
        self.command_buffer
            .get_or_insert_with(|| self.queue.command_buffer())
            .as_mut()
    }

    fn end_encoder(&mut self) {
        let mut encoder = std::mem::replace(&mut self.encoder, ActiveEncoder::None);
        match &mut encoder {
            ActiveEncoder::None => {}
            ActiveEncoder::Render(enc) => {
                self.events.flush_actions(enc.as_mut(), FlushMode::FlushEncoder);
                enc.end_encoding();
            }
            ActiveEncoder::Compute(enc) => {
                self.events.flush_actions(enc.as_mut(), FlushMode::FlushEncoder);
                enc.end_encoding();
            }
            ActiveEncoder::Blit(enc) => {
                self.events.flush_actions(enc.as_mut(), FlushMode::FlushEncoder);
                enc.end_encoding();
            }
        }
    }

    fn flush_markers(&mut self, mode: FlushMode) {
        match &mut self.encoder {
            ActiveEncoder::None => {}
            ActiveEncoder::Render(enc) => self.events.flush_actions(enc.as_mut(), mode),
            ActiveEncoder::Compute(enc) => self.events.flush_actions(enc.as_mut(), mode),
            ActiveEncoder::Blit(enc) => self.events.flush_actions(enc.as_mut(), mode),
        }
    }

    fn pre_draw(&mut self) -> Result<(), ContextError> {
        if self.vertex_shader.is_none() {
            return Err(ContextError::MissingBoundShader("vertex"));
        }
        self.flush_framebuffer();
        self.flush_fixed_function()?;
        self.flush_input_assembler();
        self.flush_render_pipeline()?;
        self.flush_render_bindings();
        self.flush_markers(FlushMode::Default);
        Ok(())
    }

    fn flush_framebuffer(&mut self) {
        let clears_pending = self
            .render_targets
            .iter()
            .flatten()
            .any(|t| t.has_pending_clear())
            || self
                .depth_target
                .as_ref()
                .is_some_and(|t| t.has_pending_clear());
        let needs_new_pass = self.framebuffer_dirty
            || clears_pending
            || !matches!(self.encoder, ActiveEncoder::Render(_));
        if !needs_new_pass {
            return;
        }

        self.end_encoder();
        let desc = self.build_render_pass();
        let mut encoder = self.command_buffer_mut().render_encoder(&desc);
        self.events.flush_actions(encoder.as_mut(), FlushMode::NewEncoder);
        self.encoder = ActiveEncoder::Render(encoder);
        self.framebuffer_dirty = false;
        self.mark_all_state_dirty();
    }

    // A fresh encoder starts with no state; everything re-binds.
    fn mark_all_state_dirty(&mut self) {
        self.vertex_stage.mark_all_dirty();
        self.fragment_stage.mark_all_dirty();
        self.rasterizer.dirty = RasterizerDirty::all();
        self.depth_stencil.state_dirty = true;
        self.depth_stencil.reference_dirty = true;
        self.blend_color_dirty = true;
        self.viewport.dirty = true;
        self.input_assembler
            .vertex_buffers_dirty
            .mark_all(self.input_assembler.vertex_buffers.len());
        self.pipeline_dirty = true;
        self.visibility_dirty = self.active_query.is_some();
    }

    fn build_render_pass(&mut self) -> RenderPassDescriptor {
        let mut desc = RenderPassDescriptor::default();
        for target in &self.render_targets {
            desc.color_attachments.push(target.as_ref().map(|t| {
                let clear = t.take_clear();
                RenderPassColorAttachment {
                    texture: Arc::clone(t.texture()),
                    load_action: if clear.is_some() {
                        LoadAction::Clear
                    } else {
                        LoadAction::Load
                    },
                    store_action: StoreAction::Store,
                    clear_color: clear.unwrap_or_default(),
                }
            }));
        }
        if let Some(depth) = &self.depth_target {
            let format = depth.texture().pixel_format();
            if format.has_depth() {
                let clear = depth.take_depth_clear();
                desc.depth_attachment = Some(RenderPassDepthAttachment {
                    texture: Arc::clone(depth.texture()),
                    load_action: if clear.is_some() {
                        LoadAction::Clear
                    } else {
                        LoadAction::Load
                    },
                    store_action: StoreAction::Store,
                    clear_depth: clear.unwrap_or(1.0),
                });
            }
            if format.has_stencil() {
                let clear = depth.take_stencil_clear();
                desc.stencil_attachment = Some(RenderPassStencilAttachment {
                    texture: Arc::clone(depth.texture()),
                    load_action: if clear.is_some() {
                        LoadAction::Clear
                    } else {
                        LoadAction::Load
                    },
                    store_action: StoreAction::Store,
                    clear_stencil: clear.unwrap_or(0),
                });
            }
        }
        // Occlusion queries may begin at any point in the pass; every pass
        // carries the result buffer so the mode can switch mid-pass.
        desc.visibility_result_buffer = Some(Arc::clone(self.query_ring.buffer()));
        desc
    }

    fn flush_fixed_function(&mut self) -> Result<(), ContextError> {
        let depth_stencil_handle = if self.depth_stencil.state_dirty {
            let descriptor = self.depth_stencil.descriptor;
            let handle = match self.depth_stencil_states.get(&descriptor) {
                Some(handle) => Arc::clone(handle),
                None => {
                    let handle = self.device.new_depth_stencil_state(&descriptor)?;
                    self.depth_stencil_states
                        .insert(descriptor, Arc::clone(&handle));
                    handle
                }
            };
            Some(handle)
        } else {
            None
        };

        let ActiveEncoder::Render(encoder) = &mut self.encoder else {
            return Ok(());
        };

        let rasterizer = &mut self.rasterizer;
        if rasterizer.dirty.contains(RasterizerDirty::CULL_MODE) {
            encoder.set_cull_mode(rasterizer.cull_mode);
        }
        if rasterizer.dirty.contains(RasterizerDirty::WINDING) {
            encoder.set_front_facing_winding(rasterizer.winding);
        }
        if rasterizer.dirty.contains(RasterizerDirty::FILL_MODE) {
            encoder.set_triangle_fill_mode(rasterizer.fill_mode);
        }
        if rasterizer.dirty.contains(RasterizerDirty::DEPTH_BIAS) {
            encoder.set_depth_bias(
                rasterizer.depth_bias,
                rasterizer.slope_scaled_depth_bias,
                rasterizer.depth_bias_clamp,
            );
        }
        if rasterizer.dirty.contains(RasterizerDirty::DEPTH_CLIP) {
            encoder.set_depth_clip_mode(rasterizer.depth_clip);
        }
        if rasterizer.dirty.contains(RasterizerDirty::SCISSOR) {
            let rect = if rasterizer.scissor_enabled {
                clamp_scissor(rasterizer.scissor_rect, self.viewport.effective())
            } else {
                ScissorRect {
                    x: 0,
                    y: 0,
                    width: self.framebuffer_size.0,
                    height: self.framebuffer_size.1,
                }
            };
            encoder.set_scissor_rect(rect);
        }
        rasterizer.dirty = RasterizerDirty::empty();

        if let Some(handle) = depth_stencil_handle {
            encoder.set_depth_stencil_state(&handle);
            self.depth_stencil.state_dirty = false;
        }
        if self.depth_stencil.reference_dirty {
            encoder.set_stencil_reference_value(self.depth_stencil.stencil_reference);
            self.depth_stencil.reference_dirty = false;
        }

        if self.viewport.dirty {
            let viewport = self.viewport.effective();
            if viewport_fits(viewport, self.framebuffer_size) {
                encoder.set_viewport(viewport);
            } else {
                warn!(?viewport, "viewport exceeds the framebuffer, using the full-target viewport");
                encoder.set_viewport(self.viewport.default);
            }
            self.viewport.dirty = false;
        }

        if self.blend_color_dirty {
            let [r, g, b, a] = self.blend_color;
            encoder.set_blend_color(r, g, b, a);
            self.blend_color_dirty = false;
        }

        if self.visibility_dirty {
            if let Some(query) = &self.active_query {
                encoder.set_visibility_result_mode(VisibilityResultMode::Counting, query.offset);
            }
            self.visibility_dirty = false;
        }
        Ok(())
    }

    fn flush_input_assembler(&mut self) {
        let ActiveEncoder::Render(encoder) = &mut self.encoder else {
            return;
        };
        if let Some((lo, hi)) = self.input_assembler.vertex_buffers_dirty.take() {
            for slot in lo..=hi {
                let binding = &self.input_assembler.vertex_buffers[slot];
                encoder.set_vertex_buffer(
                    vertex_buffer_table_index(slot),
                    binding.buffer.as_ref(),
                    binding.offset,
                );
            }
        }
    }

    fn flush_render_pipeline(&mut self) -> Result<(), ContextError> {
        if !self.pipeline_dirty {
            return Ok(());
        }
        let config = self.render_pipeline_configuration();
        let pipeline = self
            .pipelines
            .allocate(self.device.as_ref(), &self.shaders, &config)?;
        if let (ActiveEncoder::Render(encoder), Some(state)) =
            (&mut self.encoder, pipeline.render_state())
        {
            encoder.set_render_pipeline_state(state);
        }
        self.current_pipeline = Some(pipeline);
        self.pipeline_dirty = false;
        Ok(())
    }

    fn render_pipeline_configuration(&self) -> PipelineConfiguration {
        let mut color_attachments: [RenderPipelineColorAttachment; MAX_COLOR_ATTACHMENTS] =
            Default::default();
        for (i, target) in self.render_targets.iter().enumerate() {
            if let Some(target) = target {
                color_attachments[i] = RenderPipelineColorAttachment {
                    pixel_format: target.texture().pixel_format(),
                    blend: self.blend[i].clone(),
                };
            }
        }
        let (depth_format, stencil_format) = match &self.depth_target {
            Some(target) => {
                let format = target.texture().pixel_format();
                (
                    if format.has_depth() { format } else { PixelFormat::Invalid },
                    if format.has_stencil() { format } else { PixelFormat::Invalid },
                )
            }
            None => (PixelFormat::Invalid, PixelFormat::Invalid),
        };
        PipelineConfiguration {
            vertex_shader: self.vertex_shader,
            fragment_shader: self.fragment_shader,
            compute_shader: None,
            vertex_descriptor: self.vertex_descriptor(),
            color_attachments,
            depth_format,
            stencil_format,
            sample_count: self.sample_count,
        }
    }

    // Bakes the frontend input layout plus the bound strides into the
    // argument-table-addressed vertex descriptor.
    fn vertex_descriptor(&self) -> Option<VertexDescriptor> {
        if self.input_layout.is_empty() {
            return None;
        }
        let mut attributes = Vec::with_capacity(self.input_layout.len());
        let mut used = [false; MAX_VERTEX_BUFFERS];
        for (attribute_slot, attribute) in &self.input_layout {
            let buffer_slot = attribute.buffer_index;
            if buffer_slot >= MAX_VERTEX_BUFFERS {
                warn!(buffer_slot, "input layout references an out-of-range vertex buffer slot");
                continue;
            }
            used[buffer_slot] = true;
            attributes.push((
                *attribute_slot,
                VertexAttribute {
                    format: attribute.format,
                    offset: attribute.offset,
                    buffer_index: vertex_buffer_table_index(buffer_slot),
                },
            ));
        }
        let mut layouts = Vec::new();
        for (slot, used) in used.iter().enumerate() {
            if *used {
                layouts.push((
                    vertex_buffer_table_index(slot),
                    VertexBufferLayout {
                        stride: self.input_assembler.vertex_buffers[slot].stride,
                        step_function: VertexStepFunction::PerVertex,
                        step_rate: 0,
                    },
                ));
            }
        }
        Some(VertexDescriptor { attributes, layouts })
    }

    fn flush_render_bindings(&mut self) {
        let ActiveEncoder::Render(encoder) = &mut self.encoder else {
            return;
        };
        flush_render_stage(
            encoder.as_mut(),
            &mut self.vertex_stage,
            RenderStage::Vertex,
            &self.default_sampler,
        );
        flush_render_stage(
            encoder.as_mut(),
            &mut self.fragment_stage,
            RenderStage::Fragment,
            &self.default_sampler,
        );
    }
}

#[derive(Clone, Copy)]
enum RenderStage {
    Vertex,
    Fragment,
}

fn flush_render_stage(
    encoder: &mut dyn MtlRenderCommandEncoder,
    stage: &mut StageState,
    kind: RenderStage,
    default_sampler: &SamplerHandle,
) {
    if let Some((lo, hi)) = stage.buffers_dirty.take() {
        for i in lo..=hi {
            let binding = &stage.buffers[i];
            match kind {
                RenderStage::Vertex => {
                    encoder.set_vertex_buffer(i, binding.buffer.as_ref(), binding.offset)
                }
                RenderStage::Fragment => {
                    encoder.set_fragment_buffer(i, binding.buffer.as_ref(), binding.offset)
                }
            }
        }
    }
    if let Some((lo, hi)) = stage.textures_dirty.take() {
        for i in lo..=hi {
            match kind {
                RenderStage::Vertex => encoder.set_vertex_texture(i, stage.textures[i].as_ref()),
                RenderStage::Fragment => {
                    encoder.set_fragment_texture(i, stage.textures[i].as_ref())
                }
            }
        }
    }
    if let Some((lo, hi)) = stage.samplers_dirty.take() {
        for i in lo..=hi {
            // Metal rejects draws with a nil sampler in a used slot.
            let sampler = stage.samplers[i].as_ref().unwrap_or(default_sampler);
            match kind {
                RenderStage::Vertex => encoder.set_vertex_sampler_state(i, Some(sampler)),
                RenderStage::Fragment => encoder.set_fragment_sampler_state(i, Some(sampler)),
            }
        }
    }
}

fn clamp_scissor(rect: ScissorRect, viewport: Viewport) -> ScissorRect {
    let vp_left = viewport.x.max(0.0) as u32;
    let vp_top = viewport.y.max(0.0) as u32;
    let vp_right = (viewport.x + viewport.width).max(0.0) as u32;
    let vp_bottom = (viewport.y + viewport.height).max(0.0) as u32;

    let left = rect.x.clamp(vp_left, vp_right);
    let top = rect.y.clamp(vp_top, vp_bottom);
    let right = rect.x.saturating_add(rect.width).min(vp_right);
    let bottom = rect.y.saturating_add(rect.height).min(vp_bottom);
    ScissorRect {
        x: left,
        y: top,
        width: right.saturating_sub(left),
        height: bottom.saturating_sub(top),
    }
}

fn viewport_fits(viewport: Viewport, framebuffer: (u32, u32)) -> bool {
    viewport.x >= 0.0
        && viewport.y >= 0.0
        && viewport.x + viewport.width <= framebuffer.0 as f64
        && viewport.y + viewport.height <= framebuffer.1 as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{DepthStencilView, RenderTargetView};
    use dxmetal_dxbc::test_utils::{build_container, build_mtlx_chunk, build_rdef_chunk, MtlxSpec};
    use dxmetal_dxbc::FourCC;
    use dxmetal_metal::testing::{EncoderCommand, RecordingDevice, RecordingDrawable, RecordingTexture};
    use dxmetal_metal::LoadAction;

    fn shader_bytes(stage: u32) -> Vec<u8> {
        let rdef = build_rdef_chunk(&[], &[]);
        let mtlx = build_mtlx_chunk(&MtlxSpec {
            stage,
            threads_per_group: [8, 8, 1],
            samplers: &[],
            input_hash: 0,
            msl_source: "/* msl */",
        });
        build_container(&[
            (FourCC(*b"RDEF"), rdef.as_slice()),
            (FourCC(*b"MTLX"), mtlx.as_slice()),
        ])
    }

    fn test_config() -> ContextConfig {
        ContextConfig {
            transient_ring_capacity: 4096,
            query_ring_capacity: 256,
            constant_alignment: 256,
            query_alignment: 8,
            transient_reservation_floor: 0,
            frame_queue_depth: 2,
        }
    }

    fn context() -> (Arc<RecordingDevice>, Context) {
        let device = RecordingDevice::new();
        let context = Context::new(device.clone(), test_config()).expect("context");
        (device, context)
    }

    fn color_target(width: u32, height: u32) -> RenderTargetHandle {
        RenderTargetView::new(RecordingTexture::new(width, height, PixelFormat::Bgra8Unorm))
    }

    // A context with vertex+fragment shaders bound and one 64x64 target.
    fn drawable_context() -> (Arc<RecordingDevice>, Context, RenderTargetHandle) {
        let (device, mut ctx) = context();
        let vs = ctx.initialize_shader(&shader_bytes(0)).expect("vs");
        let fs = ctx.initialize_shader(&shader_bytes(1)).expect("fs");
        ctx.set_vertex_shader(Some(vs)).expect("bind vs");
        ctx.set_fragment_shader(Some(fs)).expect("bind fs");
        let target = color_target(64, 64);
        ctx.set_render_targets(&[Some(target.clone())], None);
        (device, ctx, target)
    }

    fn render_passes(device: &RecordingDevice) -> Vec<EncoderCommand> {
        device
            .log()
            .filtered(|c| matches!(c, EncoderCommand::BeginRenderPass { .. }))
    }

    #[test]
    fn deferred_clear_becomes_the_pass_load_action() {
        let (device, mut ctx, target) = drawable_context();

        ctx.clear_render_target(
            &target,
            ClearColor { red: 1.0, ..ClearColor::default() },
        );
        ctx.draw(0, 3).expect("first draw");
        ctx.draw(3, 3).expect("second draw");

        let passes = render_passes(&device);
        assert_eq!(passes.len(), 1, "both draws share one pass");
        let EncoderCommand::BeginRenderPass { color_load_actions, .. } = &passes[0] else {
            panic!("expected a render pass");
        };
        assert_eq!(color_load_actions[0], Some(LoadAction::Clear));
        assert!(!target.has_pending_clear());
    }

    #[test]
    fn rebinding_a_target_without_a_clear_loads_its_contents() {
        let (device, mut ctx, _target) = drawable_context();
        ctx.draw(0, 3).expect("draw");

        let passes = render_passes(&device);
        let EncoderCommand::BeginRenderPass { color_load_actions, .. } = &passes[0] else {
            panic!("expected a render pass");
        };
        assert_eq!(color_load_actions[0], Some(LoadAction::Load));
    }

    #[test]
    fn texture_rebind_flushes_only_the_dirty_slot() {
        let (device, mut ctx, _target) = drawable_context();
        ctx.draw(0, 3).expect("first draw");
        device.log().clear();

        let texture = RecordingTexture::new(16, 16, PixelFormat::Rgba8Unorm);
        ctx.set_texture(ShaderStage::Fragment, 5, Some(&texture));
        ctx.draw(0, 3).expect("second draw");

        let binds = device
            .log()
            .filtered(|c| matches!(c, EncoderCommand::SetFragmentTexture { .. }));
        assert_eq!(
            binds,
            vec![EncoderCommand::SetFragmentTexture {
                index: 5,
                texture: Some(texture.texture_id()),
            }]
        );
    }

    #[test]
    fn target_switch_ends_the_encoder_and_reopens_debug_groups() {
        let (device, mut ctx, _target) = drawable_context();

        ctx.push_debug_group("frame");
        ctx.draw(0, 3).expect("first draw");

        let second = color_target(64, 64);
        ctx.set_render_targets(&[Some(second)], None);
        ctx.draw(0, 3).expect("second draw");

        assert_eq!(render_passes(&device).len(), 2);
        let log = device.log();
        assert_eq!(
            log.filtered(|c| matches!(c, EncoderCommand::EndEncoding)).len(),
            1
        );
        // The group closes with the first encoder and reopens on the second.
        assert_eq!(
            log.filtered(|c| c == &EncoderCommand::PushDebugGroup("frame".to_owned())).len(),
            2
        );
        assert_eq!(
            log.filtered(|c| matches!(c, EncoderCommand::PopDebugGroup)).len(),
            1
        );
    }

    #[test]
    fn pipelines_are_reused_across_draws() {
        let (device, mut ctx, _target) = drawable_context();
        ctx.draw(0, 3).expect("first draw");
        ctx.draw(0, 3).expect("second draw");

        assert_eq!(device.log().render_pipelines_compiled(), 1);
        assert_eq!(
            device
                .log()
                .filtered(|c| matches!(c, EncoderCommand::SetRenderPipeline(_)))
                .len(),
            1
        );
    }

    #[test]
    fn destroying_a_bound_shader_unbinds_it() {
        let (_device, mut ctx, _target) = drawable_context();
        ctx.draw(0, 3).expect("draw");
        assert_eq!(ctx.pipelines().len(), 1);

        let fs = ctx.shaders().get(ShaderId(2)).expect("fragment shader").id();
        ctx.destroy_shader(fs).expect("destroy");
        assert_eq!(ctx.pipelines().len(), 0);

        // The next draw runs depth-only rather than referencing a dead id.
        ctx.draw(0, 3).expect("draw after destroy");
        assert_eq!(ctx.pipelines().len(), 1);
    }

    #[test]
    fn stage_mismatched_shader_bind_is_rejected() {
        let (_device, mut ctx) = context();
        let fs = ctx.initialize_shader(&shader_bytes(1)).expect("fs");
        assert!(matches!(
            ctx.set_vertex_shader(Some(fs)),
            Err(ContextError::UnknownShader(_))
        ));
    }

    #[test]
    fn draw_without_a_vertex_shader_is_rejected() {
        let (_device, mut ctx) = context();
        assert!(matches!(
            ctx.draw(0, 3),
            Err(ContextError::MissingBoundShader("vertex"))
        ));
    }

    #[test]
    fn indexed_draw_applies_the_index_offset() {
        let (device, mut ctx, _target) = drawable_context();
        let index_buffer = device
            .new_buffer(1024, StorageMode::Shared)
            .expect("index buffer");
        ctx.set_index_buffer(Some(&index_buffer), IndexType::UInt32, 8);

        ctx.draw_indexed(6, 3, 2).expect("indexed draw");

        let draws = device
            .log()
            .filtered(|c| matches!(c, EncoderCommand::DrawIndexed { .. }));
        let EncoderCommand::DrawIndexed {
            index_count,
            index_buffer_offset,
            base_vertex,
            ..
        } = &draws[0]
        else {
            panic!("expected an indexed draw");
        };
        assert_eq!(*index_count, 6);
        // Bound offset 8 plus 3 indices of 4 bytes.
        assert_eq!(*index_buffer_offset, 20);
        assert_eq!(*base_vertex, 2);
    }

    #[test]
    fn indexed_draw_without_an_index_buffer_is_rejected() {
        let (_device, mut ctx, _target) = drawable_context();
        assert!(matches!(
            ctx.draw_indexed(6, 0, 0),
            Err(ContextError::MissingIndexBuffer)
        ));
    }

    #[test]
    fn base_offsets_are_zeroed_without_device_support() {
        let device = RecordingDevice::with_capabilities(Capabilities {
            supports_base_vertex_instance: false,
            ..Capabilities::default()
        });
        let mut ctx = Context::new(device.clone(), test_config()).expect("context");
        let vs = ctx.initialize_shader(&shader_bytes(0)).expect("vs");
        ctx.set_vertex_shader(Some(vs)).expect("bind vs");
        ctx.set_render_targets(&[Some(color_target(64, 64))], None);

        ctx.draw_instanced(0, 3, 4, 7).expect("draw");

        let draws = device.log().filtered(|c| matches!(c, EncoderCommand::Draw { .. }));
        let EncoderCommand::Draw { instance_count, base_instance, .. } = &draws[0] else {
            panic!("expected a draw");
        };
        assert_eq!(*instance_count, 4);
        assert_eq!(*base_instance, 0);
    }

    #[test]
    fn constant_data_binds_through_the_transient_ring() {
        let (device, mut ctx, _target) = drawable_context();
        ctx.set_constant_data(ShaderStage::Vertex, 1, &[5u8; 64])
            .expect("constant data");
        ctx.draw(0, 3).expect("draw");

        let binds = device.log().filtered(|c| {
            matches!(c, EncoderCommand::SetVertexBuffer { buffer: Some(_), .. })
        });
        assert_eq!(binds.len(), 1);
        let EncoderCommand::SetVertexBuffer { index, offset, .. } = &binds[0] else {
            panic!("expected a buffer bind");
        };
        assert_eq!(*index, 1);
        assert_eq!(*offset, 0);
    }

    #[test]
    fn constant_data_larger_than_the_ring_is_rejected() {
        let (_device, mut ctx, _target) = drawable_context();
        let err = ctx
            .set_constant_data(ShaderStage::Vertex, 0, &[0u8; 8192])
            .expect_err("allocation larger than the transient ring");
        assert!(matches!(
            err,
            ContextError::TransientAllocationTooLarge { .. }
        ));
    }

    #[test]
    fn vertex_buffers_bind_at_the_table_tail() {
        let (device, mut ctx, _target) = drawable_context();
        let buffer = device.new_buffer(1024, StorageMode::Shared).expect("vb");
        ctx.set_vertex_buffer(0, Some(&buffer), 16, 32);
        ctx.draw(0, 3).expect("draw");

        let binds = device.log().filtered(|c| {
            matches!(
                c,
                EncoderCommand::SetVertexBuffer { index, buffer: Some(_), .. }
                    if *index == vertex_buffer_table_index(0)
            )
        });
        assert_eq!(binds.len(), 1);
    }

    #[test]
    fn enabled_scissor_clamps_to_the_viewport() {
        let (device, mut ctx, _target) = drawable_context();
        ctx.set_viewport(Viewport {
            x: 0.0,
            y: 0.0,
            width: 64.0,
            height: 64.0,
            znear: 0.0,
            zfar: 1.0,
        });
        ctx.set_scissor_enabled(true);
        ctx.set_scissor_rect(ScissorRect { x: 32, y: 32, width: 64, height: 64 });
        ctx.draw(0, 3).expect("draw");

        let rects = device
            .log()
            .filtered(|c| matches!(c, EncoderCommand::SetScissorRect(_)));
        assert_eq!(
            rects,
            vec![EncoderCommand::SetScissorRect(ScissorRect {
                x: 32,
                y: 32,
                width: 32,
                height: 32,
            })]
        );
    }

    #[test]
    fn oversized_viewport_falls_back_to_the_framebuffer() {
        let (device, mut ctx, _target) = drawable_context();
        ctx.set_viewport(Viewport {
            x: 0.0,
            y: 0.0,
            width: 128.0,
            height: 128.0,
            znear: 0.0,
            zfar: 1.0,
        });
        ctx.draw(0, 3).expect("draw");

        let viewports = device
            .log()
            .filtered(|c| matches!(c, EncoderCommand::SetViewport(_)));
        assert_eq!(
            viewports,
            vec![EncoderCommand::SetViewport(Viewport {
                x: 0.0,
                y: 0.0,
                width: 64.0,
                height: 64.0,
                znear: 0.0,
                zfar: 1.0,
            })]
        );
    }

    #[test]
    fn depth_clears_park_until_the_next_pass() {
        let (device, mut ctx, target) = drawable_context();
        let depth = DepthStencilView::new(RecordingTexture::new(
            64,
            64,
            PixelFormat::Depth32FloatStencil8,
        ));
        ctx.set_render_targets(&[Some(target)], Some(depth.clone()));
        ctx.clear_depth_stencil(&depth, Some(1.0), Some(0));
        ctx.draw(0, 3).expect("draw");

        let passes = render_passes(&device);
        let EncoderCommand::BeginRenderPass { depth_load_action, stencil_texture, .. } =
            &passes[0]
        else {
            panic!("expected a render pass");
        };
        assert_eq!(*depth_load_action, Some(LoadAction::Clear));
        assert!(stencil_texture.is_some());
        assert!(!depth.has_pending_clear());
    }

    #[test]
    fn dispatch_uses_the_shader_thread_dimensions() {
        let (device, mut ctx) = context();
        let cs = ctx.initialize_shader(&shader_bytes(2)).expect("cs");
        ctx.set_compute_shader(Some(cs)).expect("bind cs");

        ctx.dispatch([4, 2, 1]).expect("dispatch");

        let log = device.log();
        assert_eq!(
            log.filtered(|c| matches!(c, EncoderCommand::BeginComputePass)).len(),
            1
        );
        assert_eq!(
            log.filtered(|c| matches!(c, EncoderCommand::Dispatch { .. })),
            vec![EncoderCommand::Dispatch {
                thread_groups: [4, 2, 1],
                threads_per_group: [8, 8, 1],
            }]
        );
        assert_eq!(device.log().compute_pipelines_compiled(), 1);
    }

    #[test]
    fn only_one_occlusion_query_may_be_active() {
        let (device, mut ctx, _target) = drawable_context();
        let query = ctx.begin_occlusion_query().expect("first query");
        assert!(matches!(
            ctx.begin_occlusion_query(),
            Err(ContextError::QueryAlreadyActive)
        ));

        ctx.draw(0, 3).expect("draw");
        let modes = device
            .log()
            .filtered(|c| matches!(c, EncoderCommand::SetVisibilityResultMode { .. }));
        assert_eq!(
            modes,
            vec![EncoderCommand::SetVisibilityResultMode { counting: true, offset: 0 }]
        );

        ctx.end_occlusion_query(query).expect("end query");
        let modes = device
            .log()
            .filtered(|c| matches!(c, EncoderCommand::SetVisibilityResultMode { .. }));
        assert_eq!(modes.len(), 2);
        assert_eq!(
            modes[1],
            EncoderCommand::SetVisibilityResultMode { counting: false, offset: 0 }
        );
    }

    #[test]
    fn query_results_arrive_after_the_frame_retires() {
        let (_device, mut ctx, _target) = drawable_context();
        let query = ctx.begin_occlusion_query().expect("query");
        ctx.draw(0, 3).expect("draw");
        ctx.end_occlusion_query(query).expect("end");

        // Not submitted yet: the result is pending.
        assert_eq!(ctx.occlusion_query_result(query).expect("pending"), None);

        // The recording backend retires command buffers at commit.
        ctx.flush(None);
        assert_eq!(ctx.occlusion_query_result(query).expect("done"), Some(0));

        // Results are consumed on read.
        assert!(matches!(
            ctx.occlusion_query_result(query),
            Err(ContextError::UnknownQuery)
        ));
    }

    #[test]
    fn every_render_pass_carries_the_visibility_buffer() {
        let (device, mut ctx, _target) = drawable_context();
        ctx.draw(0, 3).expect("draw");

        let passes = render_passes(&device);
        let EncoderCommand::BeginRenderPass { has_visibility_buffer, .. } = &passes[0] else {
            panic!("expected a render pass");
        };
        assert!(has_visibility_buffer);
    }

    #[test]
    fn presenting_flush_schedules_the_drawable_and_releases_a_frame() {
        let (device, mut ctx, _target) = drawable_context();
        let drawable = RecordingDrawable::new(64, 64, PixelFormat::Bgra8Unorm);

        ctx.begin_frame();
        ctx.draw(0, 3).expect("draw");
        ctx.flush(Some(&drawable));

        let log = device.log();
        assert_eq!(
            log.filtered(|c| matches!(c, EncoderCommand::Present(_))).len(),
            1
        );
        assert_eq!(log.filtered(|c| matches!(c, EncoderCommand::Commit)).len(), 1);

        // Immediate retirement returned the frame permit; these do not block.
        ctx.begin_frame();
        ctx.begin_frame();
    }

    #[test]
    fn copy_texture_runs_on_a_blit_encoder() {
        let (device, mut ctx) = context();
        let source = RecordingTexture::new(32, 32, PixelFormat::Rgba8Unorm);
        let destination = RecordingTexture::new(32, 32, PixelFormat::Rgba8Unorm);

        ctx.copy_texture(&destination, &source);
        ctx.flush(None);

        let log = device.log();
        assert_eq!(
            log.filtered(|c| matches!(c, EncoderCommand::BeginBlitPass)).len(),
            1
        );
        assert_eq!(
            log.filtered(|c| matches!(c, EncoderCommand::CopyTexture { .. })),
            vec![EncoderCommand::CopyTexture {
                source: source.texture_id(),
                destination: destination.texture_id(),
            }]
        );
    }

    #[test]
    fn compute_dispatch_after_draws_swaps_the_encoder() {
        let (device, mut ctx, _target) = drawable_context();
        let cs = ctx.initialize_shader(&shader_bytes(2)).expect("cs");
        ctx.set_compute_shader(Some(cs)).expect("bind cs");

        ctx.draw(0, 3).expect("draw");
        ctx.dispatch([1, 1, 1]).expect("dispatch");
        // Returning to rasterization opens a fresh render pass.
        ctx.draw(0, 3).expect("draw after dispatch");

        let log = device.log();
        assert_eq!(render_passes(&device).len(), 2);
        assert_eq!(
            log.filtered(|c| matches!(c, EncoderCommand::BeginComputePass)).len(),
            1
        );
        assert_eq!(
            log.filtered(|c| matches!(c, EncoderCommand::EndEncoding)).len(),
            2
        );
    }
}
