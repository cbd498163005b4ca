//! Device capability snapshot.
//!
//! Probed once at device creation and injected into the translation layer;
//! there is no process-wide capability state.

/// Features and limits of the underlying device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    /// Whether `DepthClipMode::Clamp` is available.
    pub supports_depth_clamp: bool,
    /// Whether draws may carry a base vertex and base instance.
    pub supports_base_vertex_instance: bool,
    /// Whether depth and stencil must share one combined attachment
    /// texture (`Depth32FloatStencil8`).
    pub combined_depth_stencil: bool,
    /// Number of color attachment slots.
    pub max_color_attachments: usize,
    /// Required alignment for constant buffer bind offsets.
    pub constant_buffer_alignment: usize,
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities {
            supports_depth_clamp: true,
            supports_base_vertex_instance: true,
            combined_depth_stencil: true,
            max_color_attachments: crate::descriptor::MAX_COLOR_ATTACHMENTS,
            constant_buffer_alignment: 256,
        }
    }
}
