//! The one-pass reflection aggregate used by the translation runtime.
//!
//! [`ShaderReflection::parse`] walks a complete shader container and pulls
//! out everything the runtime needs to bind and validate the shader:
//! resource definitions, input/output signatures, and the Metal backend
//! trailer. Parsing is all-or-nothing; a failure in any required chunk
//! fails the whole reflection.

use crate::container::DxbcFile;
use crate::error::DxbcError;
use crate::fourcc::FourCC;
use crate::mtlx::{parse_mtlx_chunk, MtlxChunk, MtlxStage, MTLX_FOURCC};
use crate::rdef::{parse_rdef_chunk, RdefChunk};
use crate::signature::{parse_signature_chunk_for_fourcc, SignatureChunk};

/// Reserved name prefix for resources the cross-compiler attaches to vertex
/// buffers rather than the regular argument table. Pipeline reflection
/// validation must not expect these in the source resource bindings.
pub const VERTEX_BUFFER_PREFIX: &str = "vertexBuffer.";

/// Complete reflection data for one shader blob.
///
/// Immutable after parsing. Collections preserve the record order of the
/// underlying chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderReflection {
    /// Resource definitions (`RDEF`).
    pub rdef: RdefChunk,
    /// Input signature (`ISGN`/`ISG1`); empty for stages without one.
    pub input_signature: SignatureChunk,
    /// Output signature (`OSGN`/`OSG1`); empty for stages without one.
    pub output_signature: SignatureChunk,
    /// The Metal backend trailer.
    pub mtlx: MtlxChunk,
}

impl ShaderReflection {
    /// Parses a full shader container into its reflection aggregate.
    ///
    /// Required chunks: `RDEF` (or `RD11`) and `MTLX`. Missing signatures
    /// parse as empty, since not every stage has both.
    pub fn parse(bytes: &[u8]) -> Result<ShaderReflection, DxbcError> {
        let file = DxbcFile::parse(bytes)?;

        let rdef = get_rdef(&file).ok_or_else(|| {
            DxbcError::invalid_chunk("container has no RDEF or RD11 chunk")
        })??;

        let input_signature = match get_signature(&file, FourCC(*b"ISGN")) {
            Some(result) => result?,
            None => SignatureChunk {
                parameters: Vec::new(),
            },
        };
        let output_signature = match get_signature(&file, FourCC(*b"OSGN")) {
            Some(result) => result?,
            None => SignatureChunk {
                parameters: Vec::new(),
            },
        };

        let mtlx_chunk = file.get_chunk(MTLX_FOURCC).ok_or_else(|| {
            DxbcError::invalid_chunk("container has no MTLX backend trailer chunk")
        })?;
        let mtlx = parse_mtlx_chunk(mtlx_chunk.data)
            .map_err(|e| DxbcError::invalid_chunk(format!("MTLX chunk: {}", e.context())))?;

        Ok(ShaderReflection {
            rdef,
            input_signature,
            output_signature,
            mtlx,
        })
    }

    /// The stage recorded in the backend trailer.
    pub fn stage(&self) -> MtlxStage {
        self.mtlx.stage
    }
}

/// Returns and parses the first resource definition chunk, if any.
///
/// Most toolchains emit `RDEF`; some use `RD11`. Tries `RDEF` chunks in
/// file order first and falls back to `RD11`.
pub fn get_rdef(file: &DxbcFile<'_>) -> Option<Result<RdefChunk, DxbcError>> {
    let primary = first_parsing(file, FourCC(*b"RDEF"), parse_rdef_chunk);
    if matches!(primary, Some(Ok(_))) {
        return primary;
    }
    match first_parsing(file, FourCC(*b"RD11"), parse_rdef_chunk) {
        ok @ Some(Ok(_)) => ok,
        Some(Err(err)) if primary.is_none() => Some(Err(err)),
        _ => primary,
    }
}

/// Returns and parses the first signature chunk matching `kind`, accepting
/// the `*SG1` extended-layout spelling as a fallback (and vice versa).
pub fn get_signature(
    file: &DxbcFile<'_>,
    kind: FourCC,
) -> Option<Result<SignatureChunk, DxbcError>> {
    let fallback = match kind.0 {
        [b'I', b'S', b'G', b'N'] => Some(FourCC(*b"ISG1")),
        [b'O', b'S', b'G', b'N'] => Some(FourCC(*b"OSG1")),
        [b'I', b'S', b'G', b'1'] => Some(FourCC(*b"ISGN")),
        [b'O', b'S', b'G', b'1'] => Some(FourCC(*b"OSGN")),
        _ => None,
    };

    let parse = |fourcc: FourCC, data: &[u8]| parse_signature_chunk_for_fourcc(fourcc, data);

    let primary = first_parsing_with_fourcc(file, kind, parse);
    if matches!(primary, Some(Ok(_))) {
        return primary;
    }
    let fallback = fallback?;
    match first_parsing_with_fourcc(file, fallback, parse) {
        ok @ Some(Ok(_)) => ok,
        Some(Err(err)) if primary.is_none() => Some(Err(err)),
        _ => primary,
    }
}

/// Parses chunks matching `kind` in file order, returning the first success
/// or the first error if none parse. `None` means no chunk matched.
fn first_parsing<T>(
    file: &DxbcFile<'_>,
    kind: FourCC,
    parse: impl Fn(&[u8]) -> Result<T, DxbcError>,
) -> Option<Result<T, DxbcError>> {
    first_parsing_with_fourcc(file, kind, |_, data| parse(data))
}

fn first_parsing_with_fourcc<T>(
    file: &DxbcFile<'_>,
    kind: FourCC,
    parse: impl Fn(FourCC, &[u8]) -> Result<T, DxbcError>,
) -> Option<Result<T, DxbcError>> {
    let mut first_err = None;
    for chunk in file.chunks().filter(|c| c.fourcc == kind) {
        match parse(chunk.fourcc, chunk.data)
            .map_err(|e| DxbcError::invalid_chunk(format!("{} chunk: {}", chunk.fourcc, e.context())))
        {
            Ok(parsed) => return Some(Ok(parsed)),
            Err(err) => {
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
    }
    first_err.map(Err)
}
