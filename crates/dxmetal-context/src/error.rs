use crate::shader::ShaderId;
use dxmetal_dxbc::DxbcError;
use dxmetal_metal::MetalError;
use thiserror::Error;

/// Errors from pipeline allocation.
///
/// A compile failure or a reflection mismatch indicates an upstream shader
/// code-generation bug, not a recoverable runtime condition; callers log
/// and drop the draw.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The backend rejected the pipeline.
    #[error("pipeline compilation failed: {0}")]
    Compilation(#[from] MetalError),

    /// Backend reflection disagrees with the source shader's reflection.
    #[error("pipeline reflection mismatch: {0}")]
    ReflectionMismatch(String),

    /// A shader id in the configuration is not registered.
    #[error("pipeline references unknown shader {0:?}")]
    MissingShader(ShaderId),

    /// The configuration names no shaders at all.
    #[error("pipeline configuration names no shaders")]
    EmptyConfiguration,
}

/// Errors surfaced by [`crate::Context`] operations.
#[derive(Debug, Error)]
pub enum ContextError {
    /// Shader bytecode failed to parse. The shader is not registered.
    #[error("shader reflection parse failed: {0}")]
    ShaderParse(#[from] DxbcError),

    /// A backend object could not be created.
    #[error(transparent)]
    Metal(#[from] MetalError),

    /// Pipeline allocation failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// An operation referenced an unregistered shader.
    #[error("unknown shader {0:?}")]
    UnknownShader(ShaderId),

    /// A second occlusion query was begun while one is active. The backend
    /// supports at most one visibility counter at a time.
    #[error("an occlusion query is already active")]
    QueryAlreadyActive,

    /// An operation referenced an unknown occlusion query.
    #[error("unknown occlusion query")]
    UnknownQuery,

    /// A draw or dispatch was issued without the required shaders bound.
    #[error("draw issued without a {0} shader bound")]
    MissingBoundShader(&'static str),

    /// An indexed draw was issued without an index buffer bound.
    #[error("indexed draw issued without an index buffer bound")]
    MissingIndexBuffer,

    /// A transient allocation was larger than its ring buffer.
    #[error("transient allocation of {size} bytes exceeds the {capacity} byte ring")]
    TransientAllocationTooLarge {
        /// Requested allocation size, including the reservation floor.
        size: usize,
        /// Total ring capacity.
        capacity: usize,
    },
}
