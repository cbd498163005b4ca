use thiserror::Error;

/// Errors produced by a Metal backend implementation.
#[derive(Debug, Error)]
pub enum MetalError {
    /// A pipeline failed to compile.
    #[error("pipeline compilation failed: {0}")]
    PipelineCompilation(String),

    /// A shader function failed to compile.
    #[error("function compilation failed: {0}")]
    FunctionCompilation(String),

    /// Resource creation failed (out of memory, unsupported parameters).
    #[error("resource creation failed: {0}")]
    ResourceCreation(String),

    /// A buffer access escaped the buffer's bounds.
    #[error("buffer access of {len} bytes at offset {offset} is outside length {length}")]
    BufferOutOfBounds {
        /// Start of the attempted access.
        offset: usize,
        /// Length of the attempted access.
        len: usize,
        /// The buffer's actual length.
        length: usize,
    },

    /// CPU access to a GPU-private resource.
    #[error("resource is not CPU-accessible")]
    NotCpuAccessible,
}
