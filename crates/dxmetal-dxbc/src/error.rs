use core::fmt;

/// The broad category of a parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DxbcErrorKind {
    /// The fixed container header is missing or self-contradictory.
    MalformedHeader,
    /// The chunk offset table points outside the container or into itself.
    MalformedOffsets,
    /// An offset or size escapes the container's declared bounds.
    OutOfBounds,
    /// A chunk payload is structurally invalid.
    InvalidChunk,
}

/// An error produced while parsing a `DXBC` container or one of its chunks.
///
/// Parsing is fail-fast: the first structural problem aborts the whole parse
/// and no partial reflection data is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DxbcError {
    kind: DxbcErrorKind,
    context: String,
}

impl DxbcError {
    pub(crate) fn malformed_header(context: impl Into<String>) -> Self {
        DxbcError {
            kind: DxbcErrorKind::MalformedHeader,
            context: context.into(),
        }
    }

    pub(crate) fn malformed_offsets(context: impl Into<String>) -> Self {
        DxbcError {
            kind: DxbcErrorKind::MalformedOffsets,
            context: context.into(),
        }
    }

    pub(crate) fn out_of_bounds(context: impl Into<String>) -> Self {
        DxbcError {
            kind: DxbcErrorKind::OutOfBounds,
            context: context.into(),
        }
    }

    pub(crate) fn invalid_chunk(context: impl Into<String>) -> Self {
        DxbcError {
            kind: DxbcErrorKind::InvalidChunk,
            context: context.into(),
        }
    }

    /// Returns the error category.
    pub fn kind(&self) -> DxbcErrorKind {
        self.kind
    }

    /// Returns the human-readable context describing what failed and where.
    pub fn context(&self) -> &str {
        &self.context
    }
}

impl fmt::Display for DxbcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            DxbcErrorKind::MalformedHeader => "malformed DXBC header",
            DxbcErrorKind::MalformedOffsets => "malformed DXBC chunk offsets",
            DxbcErrorKind::OutOfBounds => "DXBC read out of bounds",
            DxbcErrorKind::InvalidChunk => "invalid DXBC chunk",
        };
        write!(f, "{kind}: {}", self.context)
    }
}

impl std::error::Error for DxbcError {}
