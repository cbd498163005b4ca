//! A recording backend for tests.
//!
//! Every encoder call appends an [`EncoderCommand`] to a shared
//! [`CommandLog`]; assertions inspect the log instead of a GPU. Command
//! buffer completion handlers run at commit, simulating immediate GPU
//! retirement, so frame-pacing logic can be exercised deterministically.

use crate::capabilities::Capabilities;
use crate::descriptor::{
    ComputePipelineDescriptor, DepthStencilDescriptor, RenderPassDescriptor,
    RenderPipelineDescriptor, SamplerDescriptor,
};
use crate::device::{CompletionHandler, MtlCommandBuffer, MtlCommandQueue, MtlDevice};
use crate::encoder::{
    MtlBlitCommandEncoder, MtlCommandEncoder, MtlComputeCommandEncoder, MtlRenderCommandEncoder,
};
use crate::error::MetalError;
use crate::format::{
    CullMode, DepthClipMode, IndexType, LoadAction, PixelFormat, PrimitiveType, ScissorRect,
    StorageMode, TriangleFillMode, Viewport, VisibilityResultMode, Winding,
};
use crate::object::{
    BufferHandle, ComputePipelineHandle, DepthStencilHandle, DrawableHandle, FunctionHandle,
    MtlBuffer, MtlComputePipelineState, MtlDepthStencilState, MtlDrawable, MtlFunction,
    MtlRenderPipelineState, MtlSamplerState, MtlTexture, RenderPipelineHandle, SamplerHandle,
    TextureHandle,
};
use crate::reflection::PipelineReflection;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

fn next_object_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum EncoderCommand {
    BeginRenderPass {
        color_textures: Vec<Option<u64>>,
        color_load_actions: Vec<Option<LoadAction>>,
        depth_texture: Option<u64>,
        depth_load_action: Option<LoadAction>,
        stencil_texture: Option<u64>,
        has_visibility_buffer: bool,
    },
    BeginComputePass,
    BeginBlitPass,
    EndEncoding,
    PushDebugGroup(String),
    PopDebugGroup,
    Signpost(String),

    SetRenderPipeline(u64),
    SetVertexBuffer { index: usize, buffer: Option<u64>, offset: usize },
    SetVertexBufferOffset { index: usize, offset: usize },
    SetVertexTexture { index: usize, texture: Option<u64> },
    SetVertexSampler { index: usize, sampler: Option<u64> },
    SetFragmentBuffer { index: usize, buffer: Option<u64>, offset: usize },
    SetFragmentTexture { index: usize, texture: Option<u64> },
    SetFragmentSampler { index: usize, sampler: Option<u64> },
    SetDepthStencilState(u64),
    SetStencilReference(u32),
    SetCullMode(CullMode),
    SetWinding(Winding),
    SetFillMode(TriangleFillMode),
    SetDepthClipMode(DepthClipMode),
    SetDepthBias { bias: f32, slope_scale: f32, clamp: f32 },
    SetViewport(Viewport),
    SetScissorRect(ScissorRect),
    SetBlendColor([f32; 4]),
    SetVisibilityResultMode { counting: bool, offset: usize },
    Draw {
        primitive: PrimitiveType,
        vertex_start: usize,
        vertex_count: usize,
        instance_count: usize,
        base_instance: usize,
    },
    DrawIndexed {
        primitive: PrimitiveType,
        index_count: usize,
        index_type: IndexType,
        index_buffer: u64,
        index_buffer_offset: usize,
        instance_count: usize,
        base_vertex: i64,
        base_instance: usize,
    },

    SetComputePipeline(u64),
    SetComputeBuffer { index: usize, buffer: Option<u64>, offset: usize },
    SetComputeTexture { index: usize, texture: Option<u64> },
    SetComputeSampler { index: usize, sampler: Option<u64> },
    Dispatch { thread_groups: [u32; 3], threads_per_group: [u32; 3] },

    CopyBuffer {
        source: u64,
        source_offset: usize,
        destination: u64,
        destination_offset: usize,
        size: usize,
    },
    CopyTexture { source: u64, destination: u64 },
    SynchronizeBuffer(u64),

    Present(u64),
    Commit,
}

#[derive(Default)]
struct LogInner {
    commands: Vec<EncoderCommand>,
    render_pipelines_compiled: usize,
    compute_pipelines_compiled: usize,
    functions_compiled: usize,
}

/// Shared log of recorded backend calls.
#[derive(Clone, Default)]
pub struct CommandLog {
    inner: Arc<Mutex<LogInner>>,
}

impl CommandLog {
    fn push(&self, command: EncoderCommand) {
        self.inner.lock().unwrap().commands.push(command);
    }

    /// Returns a snapshot of all recorded commands.
    pub fn commands(&self) -> Vec<EncoderCommand> {
        self.inner.lock().unwrap().commands.clone()
    }

    /// Clears the recorded commands (counters are kept).
    pub fn clear(&self) {
        self.inner.lock().unwrap().commands.clear();
    }

    /// Number of render pipelines the device has compiled.
    pub fn render_pipelines_compiled(&self) -> usize {
        self.inner.lock().unwrap().render_pipelines_compiled
    }

    /// Number of compute pipelines the device has compiled.
    pub fn compute_pipelines_compiled(&self) -> usize {
        self.inner.lock().unwrap().compute_pipelines_compiled
    }

    /// Number of functions the device has compiled.
    pub fn functions_compiled(&self) -> usize {
        self.inner.lock().unwrap().functions_compiled
    }

    /// Returns the recorded commands matching `predicate`.
    pub fn filtered(&self, predicate: impl Fn(&EncoderCommand) -> bool) -> Vec<EncoderCommand> {
        self.commands().into_iter().filter(|c| predicate(c)).collect()
    }
}

/// A CPU-backed buffer.
#[derive(Debug)]
pub struct RecordingBuffer {
    id: u64,
    storage: StorageMode,
    data: Mutex<Vec<u8>>,
}

impl RecordingBuffer {
    /// The buffer's stable identity, as recorded in [`EncoderCommand`]s.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl MtlBuffer for RecordingBuffer {
    fn length(&self) -> usize {
        self.data.lock().unwrap().len()
    }

    fn storage_mode(&self) -> StorageMode {
        self.storage
    }

    fn write(&self, offset: usize, data: &[u8]) -> Result<(), MetalError> {
        if self.storage == StorageMode::Private {
            return Err(MetalError::NotCpuAccessible);
        }
        let mut contents = self.data.lock().unwrap();
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= contents.len())
            .ok_or(MetalError::BufferOutOfBounds {
                offset,
                len: data.len(),
                length: contents.len(),
            })?;
        contents[offset..end].copy_from_slice(data);
        Ok(())
    }

    fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>, MetalError> {
        if self.storage == StorageMode::Private {
            return Err(MetalError::NotCpuAccessible);
        }
        let contents = self.data.lock().unwrap();
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= contents.len())
            .ok_or(MetalError::BufferOutOfBounds {
                offset,
                len,
                length: contents.len(),
            })?;
        Ok(contents[offset..end].to_vec())
    }

    fn buffer_id(&self) -> u64 {
        self.id
    }
}

/// A dimension/format-only texture.
#[derive(Debug)]
pub struct RecordingTexture {
    id: u64,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl RecordingTexture {
    /// Creates a texture handle with the given dimensions and format.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> TextureHandle {
        Arc::new(RecordingTexture {
            id: next_object_id(),
            width,
            height,
            format,
        })
    }
}

impl MtlTexture for RecordingTexture {
    fn width(&self) -> u32 {
        self.width
    }
    fn height(&self) -> u32 {
        self.height
    }
    fn pixel_format(&self) -> PixelFormat {
        self.format
    }
    fn texture_id(&self) -> u64 {
        self.id
    }
}

/// A drawable wrapping a [`RecordingTexture`].
#[derive(Debug)]
pub struct RecordingDrawable {
    texture: TextureHandle,
}

impl RecordingDrawable {
    /// Creates a drawable presenting to a fresh texture.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> DrawableHandle {
        Arc::new(RecordingDrawable {
            texture: RecordingTexture::new(width, height, format),
        })
    }
}

impl MtlDrawable for RecordingDrawable {
    fn texture(&self) -> TextureHandle {
        Arc::clone(&self.texture)
    }
}

#[derive(Debug)]
struct RecordingFunction {
    name: String,
    source: String,
}

impl MtlFunction for RecordingFunction {
    fn name(&self) -> &str {
        &self.name
    }
    fn source(&self) -> &str {
        &self.source
    }
}

#[derive(Debug)]
struct RecordingSampler {
    id: u64,
}
impl MtlSamplerState for RecordingSampler {
    fn sampler_id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug)]
struct RecordingDepthStencil {
    id: u64,
}
impl MtlDepthStencilState for RecordingDepthStencil {
    fn depth_stencil_id(&self) -> u64 {
        self.id
    }
}

/// A compiled render pipeline stub.
#[derive(Debug)]
pub struct RecordingRenderPipeline {
    id: u64,
}
impl MtlRenderPipelineState for RecordingRenderPipeline {
    fn pipeline_id(&self) -> u64 {
        self.id
    }
}

/// A compiled compute pipeline stub.
#[derive(Debug)]
pub struct RecordingComputePipeline {
    id: u64,
}
impl MtlComputePipelineState for RecordingComputePipeline {
    fn pipeline_id(&self) -> u64 {
        self.id
    }
}

/// The recording device.
pub struct RecordingDevice {
    capabilities: Capabilities,
    log: CommandLog,
    fail_next_pipeline: Mutex<Option<String>>,
    next_reflection: Mutex<Option<PipelineReflection>>,
}

impl RecordingDevice {
    /// Creates a device with default capabilities.
    pub fn new() -> Arc<RecordingDevice> {
        RecordingDevice::with_capabilities(Capabilities::default())
    }

    /// Creates a device with explicit capabilities.
    pub fn with_capabilities(capabilities: Capabilities) -> Arc<RecordingDevice> {
        Arc::new(RecordingDevice {
            capabilities,
            log: CommandLog::default(),
            fail_next_pipeline: Mutex::new(None),
            next_reflection: Mutex::new(None),
        })
    }

    /// The shared command log.
    pub fn log(&self) -> CommandLog {
        self.log.clone()
    }

    /// Makes the next pipeline compilation fail with `message`.
    pub fn fail_next_pipeline(&self, message: &str) {
        *self.fail_next_pipeline.lock().unwrap() = Some(message.to_owned());
    }

    /// Attaches `reflection` to the next compiled pipeline. Subsequent
    /// pipelines report empty reflection again.
    pub fn set_next_reflection(&self, reflection: PipelineReflection) {
        *self.next_reflection.lock().unwrap() = Some(reflection);
    }

    fn take_pipeline_outcome(&self) -> Result<PipelineReflection, MetalError> {
        if let Some(message) = self.fail_next_pipeline.lock().unwrap().take() {
            return Err(MetalError::PipelineCompilation(message));
        }
        Ok(self.next_reflection.lock().unwrap().take().unwrap_or_default())
    }
}

impl MtlDevice for RecordingDevice {
    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn new_buffer(&self, length: usize, storage: StorageMode) -> Result<BufferHandle, MetalError> {
        Ok(Arc::new(RecordingBuffer {
            id: next_object_id(),
            storage,
            data: Mutex::new(vec![0; length]),
        }))
    }

    fn new_sampler_state(&self, _desc: &SamplerDescriptor) -> Result<SamplerHandle, MetalError> {
        Ok(Arc::new(RecordingSampler {
            id: next_object_id(),
        }))
    }

    fn new_depth_stencil_state(
        &self,
        _desc: &DepthStencilDescriptor,
    ) -> Result<DepthStencilHandle, MetalError> {
        Ok(Arc::new(RecordingDepthStencil {
            id: next_object_id(),
        }))
    }

    fn new_function(
        &self,
        source: &str,
        entry_point: &str,
    ) -> Result<FunctionHandle, MetalError> {
        self.log.inner.lock().unwrap().functions_compiled += 1;
        Ok(Arc::new(RecordingFunction {
            name: entry_point.to_owned(),
            source: source.to_owned(),
        }))
    }

    fn new_render_pipeline(
        &self,
        _desc: &RenderPipelineDescriptor,
    ) -> Result<(RenderPipelineHandle, PipelineReflection), MetalError> {
        let reflection = self.take_pipeline_outcome()?;
        self.log.inner.lock().unwrap().render_pipelines_compiled += 1;
        Ok((
            Arc::new(RecordingRenderPipeline {
                id: next_object_id(),
            }),
            reflection,
        ))
    }

    fn new_compute_pipeline(
        &self,
        _desc: &ComputePipelineDescriptor,
    ) -> Result<(ComputePipelineHandle, PipelineReflection), MetalError> {
        let reflection = self.take_pipeline_outcome()?;
        self.log.inner.lock().unwrap().compute_pipelines_compiled += 1;
        Ok((
            Arc::new(RecordingComputePipeline {
                id: next_object_id(),
            }),
            reflection,
        ))
    }

    fn new_command_queue(&self) -> Arc<dyn MtlCommandQueue> {
        Arc::new(RecordingQueue {
            log: self.log.clone(),
        })
    }
}

struct RecordingQueue {
    log: CommandLog,
}

impl MtlCommandQueue for RecordingQueue {
    fn command_buffer(&self) -> Box<dyn MtlCommandBuffer> {
        Box::new(RecordingCommandBuffer {
            log: self.log.clone(),
            completion_handlers: Vec::new(),
        })
    }
}

struct RecordingCommandBuffer {
    log: CommandLog,
    completion_handlers: Vec<CompletionHandler>,
}

impl RecordingCommandBuffer {
    fn finish(mut self: Box<Self>) {
        self.log.push(EncoderCommand::Commit);
        // Simulated immediate GPU retirement.
        for handler in self.completion_handlers.drain(..) {
            handler();
        }
    }
}

impl MtlCommandBuffer for RecordingCommandBuffer {
    fn render_encoder(
        &mut self,
        desc: &RenderPassDescriptor,
    ) -> Box<dyn MtlRenderCommandEncoder> {
        self.log.push(EncoderCommand::BeginRenderPass {
            color_textures: desc
                .color_attachments
                .iter()
                .map(|a| a.as_ref().map(|a| a.texture.texture_id()))
                .collect(),
            color_load_actions: desc
                .color_attachments
                .iter()
                .map(|a| a.as_ref().map(|a| a.load_action))
                .collect(),
            depth_texture: desc.depth_attachment.as_ref().map(|a| a.texture.texture_id()),
            depth_load_action: desc.depth_attachment.as_ref().map(|a| a.load_action),
            stencil_texture: desc
                .stencil_attachment
                .as_ref()
                .map(|a| a.texture.texture_id()),
            has_visibility_buffer: desc.visibility_result_buffer.is_some(),
        });
        Box::new(RecordingEncoder {
            log: self.log.clone(),
        })
    }

    fn compute_encoder(&mut self) -> Box<dyn MtlComputeCommandEncoder> {
        self.log.push(EncoderCommand::BeginComputePass);
        Box::new(RecordingEncoder {
            log: self.log.clone(),
        })
    }

    fn blit_encoder(&mut self) -> Box<dyn MtlBlitCommandEncoder> {
        self.log.push(EncoderCommand::BeginBlitPass);
        Box::new(RecordingEncoder {
            log: self.log.clone(),
        })
    }

    fn on_completed(&mut self, handler: CompletionHandler) {
        self.completion_handlers.push(handler);
    }

    fn present_drawable(&mut self, drawable: &DrawableHandle) {
        self.log
            .push(EncoderCommand::Present(drawable.texture().texture_id()));
    }

    fn commit(self: Box<Self>) {
        self.finish();
    }

    fn commit_and_wait(self: Box<Self>) {
        self.finish();
    }
}

struct RecordingEncoder {
    log: CommandLog,
}

impl MtlCommandEncoder for RecordingEncoder {
    fn push_debug_group(&mut self, label: &str) {
        self.log.push(EncoderCommand::PushDebugGroup(label.to_owned()));
    }
    fn pop_debug_group(&mut self) {
        self.log.push(EncoderCommand::PopDebugGroup);
    }
    fn insert_debug_signpost(&mut self, label: &str) {
        self.log.push(EncoderCommand::Signpost(label.to_owned()));
    }
    fn end_encoding(&mut self) {
        self.log.push(EncoderCommand::EndEncoding);
    }
}

impl MtlRenderCommandEncoder for RecordingEncoder {
    fn set_render_pipeline_state(&mut self, pipeline: &RenderPipelineHandle) {
        self.log
            .push(EncoderCommand::SetRenderPipeline(pipeline.pipeline_id()));
    }

    fn set_vertex_buffer(&mut self, index: usize, buffer: Option<&BufferHandle>, offset: usize) {
        self.log.push(EncoderCommand::SetVertexBuffer {
            index,
            buffer: buffer.map(buffer_id),
            offset,
        });
    }

    fn set_vertex_buffer_offset(&mut self, index: usize, offset: usize) {
        self.log
            .push(EncoderCommand::SetVertexBufferOffset { index, offset });
    }

    fn set_vertex_texture(&mut self, index: usize, texture: Option<&TextureHandle>) {
        self.log.push(EncoderCommand::SetVertexTexture {
            index,
            texture: texture.map(|t| t.texture_id()),
        });
    }

    fn set_vertex_sampler_state(&mut self, index: usize, sampler: Option<&SamplerHandle>) {
        self.log.push(EncoderCommand::SetVertexSampler {
            index,
            sampler: sampler.map(sampler_id),
        });
    }

    fn set_fragment_buffer(&mut self, index: usize, buffer: Option<&BufferHandle>, offset: usize) {
        self.log.push(EncoderCommand::SetFragmentBuffer {
            index,
            buffer: buffer.map(buffer_id),
            offset,
        });
    }

    fn set_fragment_texture(&mut self, index: usize, texture: Option<&TextureHandle>) {
        self.log.push(EncoderCommand::SetFragmentTexture {
            index,
            texture: texture.map(|t| t.texture_id()),
        });
    }

    fn set_fragment_sampler_state(&mut self, index: usize, sampler: Option<&SamplerHandle>) {
        self.log.push(EncoderCommand::SetFragmentSampler {
            index,
            sampler: sampler.map(sampler_id),
        });
    }

    fn set_depth_stencil_state(&mut self, state: &DepthStencilHandle) {
        self.log
            .push(EncoderCommand::SetDepthStencilState(state.depth_stencil_id()));
    }

    fn set_stencil_reference_value(&mut self, value: u32) {
        self.log.push(EncoderCommand::SetStencilReference(value));
    }

    fn set_cull_mode(&mut self, mode: CullMode) {
        self.log.push(EncoderCommand::SetCullMode(mode));
    }

    fn set_front_facing_winding(&mut self, winding: Winding) {
        self.log.push(EncoderCommand::SetWinding(winding));
    }

    fn set_triangle_fill_mode(&mut self, mode: TriangleFillMode) {
        self.log.push(EncoderCommand::SetFillMode(mode));
    }

    fn set_depth_clip_mode(&mut self, mode: DepthClipMode) {
        self.log.push(EncoderCommand::SetDepthClipMode(mode));
    }

    fn set_depth_bias(&mut self, bias: f32, slope_scale: f32, clamp: f32) {
        self.log.push(EncoderCommand::SetDepthBias {
            bias,
            slope_scale,
            clamp,
        });
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.log.push(EncoderCommand::SetViewport(viewport));
    }

    fn set_scissor_rect(&mut self, rect: ScissorRect) {
        self.log.push(EncoderCommand::SetScissorRect(rect));
    }

    fn set_blend_color(&mut self, red: f32, green: f32, blue: f32, alpha: f32) {
        self.log
            .push(EncoderCommand::SetBlendColor([red, green, blue, alpha]));
    }

    fn set_visibility_result_mode(&mut self, mode: VisibilityResultMode, offset: usize) {
        self.log.push(EncoderCommand::SetVisibilityResultMode {
            counting: mode == VisibilityResultMode::Counting,
            offset,
        });
    }

    fn draw_primitives(
        &mut self,
        primitive: PrimitiveType,
        vertex_start: usize,
        vertex_count: usize,
        instance_count: usize,
        base_instance: usize,
    ) {
        self.log.push(EncoderCommand::Draw {
            primitive,
            vertex_start,
            vertex_count,
            instance_count,
            base_instance,
        });
    }

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
    ) {
        self.log.push(EncoderCommand::DrawIndexed {
            primitive,
            index_count,
            index_type,
            index_buffer: buffer_id(index_buffer),
            index_buffer_offset,
            instance_count,
            base_vertex,
            base_instance,
        });
    }
}

impl MtlComputeCommandEncoder for RecordingEncoder {
    fn set_compute_pipeline_state(&mut self, pipeline: &ComputePipelineHandle) {
        self.log
            .push(EncoderCommand::SetComputePipeline(pipeline.pipeline_id()));
    }

    fn set_buffer(&mut self, index: usize, buffer: Option<&BufferHandle>, offset: usize) {
        self.log.push(EncoderCommand::SetComputeBuffer {
            index,
            buffer: buffer.map(buffer_id),
            offset,
        });
    }

    fn set_texture(&mut self, index: usize, texture: Option<&TextureHandle>) {
        self.log.push(EncoderCommand::SetComputeTexture {
            index,
            texture: texture.map(|t| t.texture_id()),
        });
    }

    fn set_sampler_state(&mut self, index: usize, sampler: Option<&SamplerHandle>) {
        self.log.push(EncoderCommand::SetComputeSampler {
            index,
            sampler: sampler.map(sampler_id),
        });
    }

    fn dispatch_thread_groups(&mut self, thread_groups: [u32; 3], threads_per_group: [u32; 3]) {
        self.log.push(EncoderCommand::Dispatch {
            thread_groups,
            threads_per_group,
        });
    }
}

impl MtlBlitCommandEncoder for RecordingEncoder {
    fn copy_buffer(
        &mut self,
        source: &BufferHandle,
        source_offset: usize,
        destination: &BufferHandle,
        destination_offset: usize,
        size: usize,
    ) {
        self.log.push(EncoderCommand::CopyBuffer {
            source: buffer_id(source),
            source_offset,
            destination: buffer_id(destination),
            destination_offset,
            size,
        });
    }

    fn copy_texture(&mut self, source: &TextureHandle, destination: &TextureHandle) {
        self.log.push(EncoderCommand::CopyTexture {
            source: source.texture_id(),
            destination: destination.texture_id(),
        });
    }

    fn synchronize_buffer(&mut self, buffer: &BufferHandle) {
        self.log
            .push(EncoderCommand::SynchronizeBuffer(buffer_id(buffer)));
    }
}

fn buffer_id(buffer: &BufferHandle) -> u64 {
    buffer.buffer_id()
}

fn sampler_id(sampler: &SamplerHandle) -> u64 {
    sampler.sampler_id()
}
