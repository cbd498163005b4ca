//! A safe, zero-copy parser for DirectX shader bytecode containers (`DXBC`)
//! and the Metal backend reflection chunks embedded in them.
//!
//! Shader blobs arrive from an offline HLSL cross-compiler and are treated
//! as **untrusted**: parsing never panics or reads out of bounds on
//! malformed data.
//!
//! This crate provides:
//!
//! - Container parsing with strict bounds validation ([`DxbcFile`]).
//! - Parsers for the chunks the translation runtime needs:
//!   - `RDEF` (constant buffers + bound resources)
//!   - `ISGN`/`OSGN` and their extended `ISG1`/`OSG1` variants
//!   - `MTLX`, the backend trailer written by the HLSL-to-MSL
//!     cross-compiler (sampler map, symbol tables, MSL source, compute
//!     thread-group dimensions)
//! - [`ShaderReflection`], the one-pass aggregate of all of the above.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod container;
mod error;
mod fourcc;
mod read;

/// Parser for the Metal backend extension chunk (`MTLX`).
pub mod mtlx;
/// Parser for DXBC resource definition chunks (`RDEF`).
pub mod rdef;
/// High-level reflection aggregate and chunk lookup helpers.
pub mod reflection;
/// Parsers for DXBC signature chunks (`ISGN`, `OSGN`, ...).
pub mod signature;

/// Builders for synthetic shader containers in tests.
///
/// Only available when compiling this crate's own tests or with the
/// `test-utils` feature. Not part of the stable parsing API.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

#[cfg(test)]
mod tests_container;
#[cfg(test)]
mod tests_mtlx;
#[cfg(test)]
mod tests_rdef;
#[cfg(test)]
mod tests_reflection;
#[cfg(test)]
mod tests_signature;

pub use crate::container::{DxbcChunk, DxbcFile, DxbcHeader};
pub use crate::error::{DxbcError, DxbcErrorKind};
pub use crate::fourcc::FourCC;
pub use crate::mtlx::{
    parse_mtlx_chunk, MtlxChunk, MtlxSamplerMapEntry, MtlxStage, MtlxStageExt, MtlxSymbol,
    MTLX_FOURCC,
};
pub use crate::rdef::{
    parse_rdef_chunk, RdefChunk, RdefConstantBuffer, RdefInputType, RdefResourceBinding,
    RdefVariable,
};
pub use crate::reflection::{get_rdef, get_signature, ShaderReflection, VERTEX_BUFFER_PREFIX};
pub use crate::signature::{
    parse_signature_chunk, parse_signature_chunk_for_fourcc, SignatureChunk, SignatureParameter,
};
