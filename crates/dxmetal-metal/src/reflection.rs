//! Backend pipeline reflection.
//!
//! When a pipeline compiles, the backend reports the arguments each stage
//! actually consumes: bind indices, argument kinds, and for buffer
//! arguments the struct member layout the compiler settled on. The
//! translation layer cross-checks this against the source shader's own
//! reflection to catch cross-compiler drift.

/// The kind of one pipeline argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentKind {
    /// A buffer argument with its struct member layout.
    Buffer {
        /// Members of the buffer's struct type, in declaration order.
        members: Vec<StructMember>,
    },
    /// A texture argument.
    Texture,
    /// A sampler argument.
    Sampler,
    /// A threadgroup memory argument.
    ThreadgroupMemory,
}

/// One member of a buffer argument's struct type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructMember {
    /// Member name.
    pub name: String,
    /// Byte offset within the struct.
    pub offset: u32,
}

/// One argument of a compiled pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineArgument {
    /// Argument name as seen by the backend compiler.
    pub name: String,
    /// Bind index in the stage's argument table.
    pub index: u32,
    /// Whether the argument is actually used by the compiled code.
    pub active: bool,
    /// Argument kind and kind-specific details.
    pub kind: ArgumentKind,
}

/// Reflection for a compiled pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReflection {
    /// Vertex-stage arguments (or the kernel's arguments for compute).
    pub vertex_arguments: Vec<PipelineArgument>,
    /// Fragment-stage arguments; empty for compute pipelines.
    pub fragment_arguments: Vec<PipelineArgument>,
}
