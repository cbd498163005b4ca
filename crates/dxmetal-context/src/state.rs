//! Cached binding state and dirty tracking.
//!
//! Every frontend setter is O(1): it updates a slot, widens the stage's
//! dirty range, and sets a flag. The flush code re-binds only the dirty
//! sub-range.

use bitflags::bitflags;
use dxmetal_metal::{
    BufferHandle, CullMode, DepthClipMode, DepthStencilDescriptor, IndexType, SamplerHandle,
    ScissorRect, TextureHandle, TriangleFillMode, Viewport, Winding,
};

/// Buffer argument-table entries per stage.
///
/// Constant buffers bind from slot 0 upward, unordered-access buffers from
/// [`UAV_BUFFER_BASE`], and vertex buffers from the table's tail downward
/// (see [`vertex_buffer_table_index`]).
pub const MAX_STAGE_BUFFERS: usize = 31;
/// Texture argument-table entries per stage.
pub const MAX_STAGE_TEXTURES: usize = 32;
/// Sampler argument-table entries per stage.
pub const MAX_STAGE_SAMPLERS: usize = 16;
/// Vertex buffer input slots exposed to the frontend.
pub const MAX_VERTEX_BUFFERS: usize = 8;
/// First buffer argument-table slot used for unordered-access buffers.
pub const UAV_BUFFER_BASE: usize = 16;
/// Unordered-access buffer slots exposed to the frontend. Bounded so the
/// UAV range ends before the vertex-buffer tail of the table.
pub const MAX_UAV_BUFFERS: usize = MAX_STAGE_BUFFERS - MAX_VERTEX_BUFFERS - UAV_BUFFER_BASE;
/// Constant buffer slots exposed to the frontend.
pub const MAX_CONSTANT_BUFFERS: usize = 14;

/// Argument-table index of frontend vertex buffer slot `slot`.
///
/// Vertex buffers occupy the tail of the buffer argument table so they
/// never collide with constant buffer slots; slot 0 maps to the last
/// entry.
pub fn vertex_buffer_table_index(slot: usize) -> usize {
    (MAX_STAGE_BUFFERS - 1) - slot
}

/// An incrementally maintained `[min, max]` index range.
///
/// Marking extends the range in O(1); flushing takes the whole range at
/// once. Empty until something is marked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyRange {
    min: usize,
    max: usize,
}

impl DirtyRange {
    /// An empty range.
    pub const fn empty() -> DirtyRange {
        DirtyRange { min: usize::MAX, max: 0 }
    }

    /// Extends the range to include `index`.
    pub fn mark(&mut self, index: usize) {
        self.min = self.min.min(index);
        self.max = self.max.max(index);
    }

    /// Extends the range to cover `0..len`.
    pub fn mark_all(&mut self, len: usize) {
        if len > 0 {
            self.min = 0;
            self.max = len - 1;
        }
    }

    /// Returns `true` when nothing is marked.
    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    /// Takes the current `(min, max)` inclusive range, leaving the range
    /// empty. `None` when nothing was marked.
    pub fn take(&mut self) -> Option<(usize, usize)> {
        if self.is_empty() {
            return None;
        }
        let range = (self.min, self.max);
        *self = DirtyRange::empty();
        Some(range)
    }
}

impl Default for DirtyRange {
    fn default() -> Self {
        DirtyRange::empty()
    }
}

/// A bound buffer slot.
#[derive(Clone, Default)]
pub struct BufferBinding {
    /// The bound buffer, if any.
    pub buffer: Option<BufferHandle>,
    /// Byte offset of the binding.
    pub offset: usize,
}

/// Per-stage binding tables with dirty ranges.
pub struct StageState {
    /// Buffer bindings (constant buffers, UAV buffers, vertex buffers).
    pub buffers: Vec<BufferBinding>,
    /// Dirty sub-range of `buffers`.
    pub buffers_dirty: DirtyRange,
    /// Texture bindings.
    pub textures: Vec<Option<TextureHandle>>,
    /// Dirty sub-range of `textures`.
    pub textures_dirty: DirtyRange,
    /// Sampler bindings.
    pub samplers: Vec<Option<SamplerHandle>>,
    /// Dirty sub-range of `samplers`.
    pub samplers_dirty: DirtyRange,
}

impl StageState {
    pub(crate) fn new() -> StageState {
        StageState {
            buffers: vec![BufferBinding::default(); MAX_STAGE_BUFFERS],
            buffers_dirty: DirtyRange::empty(),
            textures: vec![None; MAX_STAGE_TEXTURES],
            textures_dirty: DirtyRange::empty(),
            samplers: vec![None; MAX_STAGE_SAMPLERS],
            samplers_dirty: DirtyRange::empty(),
        }
    }

    /// Marks every binding dirty, as after an encoder switch.
    pub fn mark_all_dirty(&mut self) {
        // Buffers re-bind only the occupied span: the tail of the table
        // belongs to vertex fetch buffers bound by the input assembler,
        // which a full-range `None` re-bind would clobber.
        let top = self
            .buffers
            .iter()
            .rposition(|b| b.buffer.is_some())
            .map(|i| i + 1)
            .unwrap_or(0);
        self.buffers_dirty.mark_all(top);
        self.textures_dirty.mark_all(self.textures.len());
        // Samplers re-bind only the occupied span; missing entries are
        // patched with the default sampler at flush.
        let top = self
            .samplers
            .iter()
            .rposition(|s| s.is_some())
            .map(|i| i + 1)
            .unwrap_or(0);
        self.samplers_dirty.mark_all(top);
    }
}

bitflags! {
    /// Dirty bits of the rasterizer sub-states.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RasterizerDirty: u32 {
        /// Cull mode.
        const CULL_MODE = 1 << 0;
        /// Front-face winding.
        const WINDING = 1 << 1;
        /// Fill mode.
        const FILL_MODE = 1 << 2;
        /// Depth bias parameters.
        const DEPTH_BIAS = 1 << 3;
        /// Depth clip/clamp mode.
        const DEPTH_CLIP = 1 << 4;
        /// Scissor enable or rect.
        const SCISSOR = 1 << 5;
    }
}

/// Cached rasterizer state.
pub struct RasterizerState {
    /// Face culling.
    pub cull_mode: CullMode,
    /// Front-face winding.
    pub winding: Winding,
    /// Fill mode.
    pub fill_mode: TriangleFillMode,
    /// Depth bias.
    pub depth_bias: f32,
    /// Slope-scaled depth bias.
    pub slope_scaled_depth_bias: f32,
    /// Depth bias clamp.
    pub depth_bias_clamp: f32,
    /// Depth clip/clamp behavior.
    pub depth_clip: DepthClipMode,
    /// Whether scissor testing is enabled.
    pub scissor_enabled: bool,
    /// The scissor rectangle when enabled.
    pub scissor_rect: ScissorRect,
    /// Which sub-states need re-encoding.
    pub dirty: RasterizerDirty,
}

impl RasterizerState {
    pub(crate) fn new() -> RasterizerState {
        RasterizerState {
            cull_mode: CullMode::None,
            winding: Winding::Clockwise,
            fill_mode: TriangleFillMode::Fill,
            depth_bias: 0.0,
            slope_scaled_depth_bias: 0.0,
            depth_bias_clamp: 0.0,
            depth_clip: DepthClipMode::Clip,
            scissor_enabled: false,
            scissor_rect: ScissorRect::default(),
            dirty: RasterizerDirty::all(),
        }
    }
}

/// Cached depth/stencil state.
pub struct DepthStencilState {
    /// The descriptor to realize on next flush.
    pub descriptor: DepthStencilDescriptor,
    /// Stencil reference value.
    pub stencil_reference: u32,
    /// Whether the state object must be re-bound.
    pub state_dirty: bool,
    /// Whether the reference value must be re-encoded.
    pub reference_dirty: bool,
}

impl DepthStencilState {
    pub(crate) fn new() -> DepthStencilState {
        DepthStencilState {
            descriptor: DepthStencilDescriptor::default(),
            stencil_reference: 0,
            state_dirty: true,
            reference_dirty: true,
        }
    }
}

/// A bound vertex buffer slot as the frontend sees it.
#[derive(Clone, Default)]
pub struct VertexBufferBinding {
    /// The bound buffer.
    pub buffer: Option<BufferHandle>,
    /// Byte offset of the first vertex.
    pub offset: usize,
    /// Byte stride between vertices.
    pub stride: usize,
}

/// Cached input-assembler state.
pub struct InputAssemblerState {
    /// Vertex buffer slots.
    pub vertex_buffers: Vec<VertexBufferBinding>,
    /// Dirty vertex buffer slots.
    pub vertex_buffers_dirty: DirtyRange,
    /// Bound index buffer.
    pub index_buffer: Option<BufferHandle>,
    /// Index element type.
    pub index_type: IndexType,
    /// Byte offset of the first index.
    pub index_offset: usize,
    /// Current primitive topology.
    pub primitive: dxmetal_metal::PrimitiveType,
}

impl InputAssemblerState {
    pub(crate) fn new() -> InputAssemblerState {
        InputAssemblerState {
            vertex_buffers: vec![VertexBufferBinding::default(); MAX_VERTEX_BUFFERS],
            vertex_buffers_dirty: DirtyRange::empty(),
            index_buffer: None,
            index_type: IndexType::UInt16,
            index_offset: 0,
            primitive: dxmetal_metal::PrimitiveType::Triangle,
        }
    }
}

/// Cached viewport state.
pub struct ViewportState {
    /// The viewport set by the frontend, if any.
    pub current: Option<Viewport>,
    /// The fallback covering the full framebuffer.
    pub default: Viewport,
    /// Whether the viewport must be re-encoded.
    pub dirty: bool,
}

impl ViewportState {
    pub(crate) fn new() -> ViewportState {
        ViewportState {
            current: None,
            default: Viewport::default(),
            dirty: true,
        }
    }

    /// The viewport to encode: the explicit one, or the full-framebuffer
    /// default.
    pub fn effective(&self) -> Viewport {
        self.current.unwrap_or(self.default)
    }
}
