//! DirectX11-to-Metal GPU translation layer.
//!
//! The workspace splits into three crates, re-exported here:
//!
//! - [`dxbc`]: safe parsing of DXBC shader containers and the Metal
//!   backend reflection trailer the offline cross-compiler embeds.
//! - [`metal`]: a typed model of the Metal protocol surface, implemented
//!   by real backends and by a recording test backend.
//! - The translation engine ([`Context`] and friends): D3D11-shaped state
//!   caching, a pipeline cache with reflection cross-validation, transient
//!   rings and frame pacing.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub use dxmetal_dxbc as dxbc;
pub use dxmetal_metal as metal;

pub use dxmetal_context::{
    Context, ContextConfig, ContextError, DepthStencilTargetHandle, DepthStencilView,
    PipelineCache, PipelineConfiguration, PipelineError, QueryId, RenderTargetHandle,
    RenderTargetView, ShaderId, ShaderStage,
};
