//! The DirectX11-to-Metal translation engine.
//!
//! [`Context`] presents a D3D11-shaped frontend: shader registration from
//! DXBC bytecode, slot-indexed resource binding, deferred clears, draws,
//! dispatches, occlusion queries and frame pacing. Behind it sit a shader
//! registry, a configuration-keyed pipeline cache with reflection
//! cross-validation, dirty-range state tracking, transient ring allocators
//! and a debug-marker queue that survives encoder switches.
//!
//! Backends are injected as [`dxmetal_metal`] trait objects; nothing here
//! talks to a GPU directly.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// Context construction parameters.
pub mod config;
/// The translation context.
pub mod context;
mod error;
/// Debug-marker queueing across encoder switches.
pub mod events;
/// Frame pipelining primitives.
pub mod frame;
/// Pipeline cache and reflection validation.
pub mod pipeline;
/// Transient ring allocation.
pub mod ring;
/// Shader registry.
pub mod shader;
/// Cached binding state and dirty tracking.
pub mod state;
/// Render target views with deferred clears.
pub mod target;

pub use crate::config::ContextConfig;
pub use crate::context::{Context, QueryId};
pub use crate::error::{ContextError, PipelineError};
pub use crate::events::{FlushMode, GpuEventQueue};
pub use crate::frame::{ContextEvent, FrameSemaphore};
pub use crate::pipeline::{Pipeline, PipelineCache, PipelineConfiguration, PipelineState};
pub use crate::ring::RingBuffer;
pub use crate::shader::{Shader, ShaderId, ShaderRegistry, ShaderStage};
pub use crate::state::{
    vertex_buffer_table_index, MAX_CONSTANT_BUFFERS, MAX_STAGE_BUFFERS, MAX_STAGE_SAMPLERS,
    MAX_STAGE_TEXTURES, MAX_UAV_BUFFERS, MAX_VERTEX_BUFFERS, UAV_BUFFER_BASE,
};
pub use crate::target::{
    DepthStencilTargetHandle, DepthStencilView, RenderTargetHandle, RenderTargetView,
};
