//! Render target and depth/stencil views with deferred clears.
//!
//! Clears are not encoded when requested. The clear value is parked on the
//! view and becomes the attachment's load action the next time the view is
//! bound into a render pass, which is how tile-based GPUs want clears
//! expressed. Clearing the same view twice before a pass consumes the
//! first value is a frontend contract violation.

use dxmetal_metal::{ClearColor, TextureHandle};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::error;

/// A color render target view over a texture.
pub struct RenderTargetView {
    texture: TextureHandle,
    pending_clear: Mutex<Option<ClearColor>>,
}

/// Shared handle to a [`RenderTargetView`].
pub type RenderTargetHandle = Arc<RenderTargetView>;

impl RenderTargetView {
    /// Creates a view over `texture`.
    pub fn new(texture: TextureHandle) -> RenderTargetHandle {
        Arc::new(RenderTargetView {
            texture,
            pending_clear: Mutex::new(None),
        })
    }

    /// The viewed texture.
    pub fn texture(&self) -> &TextureHandle {
        &self.texture
    }

    /// Whether a clear is parked on this view.
    pub fn has_pending_clear(&self) -> bool {
        self.lock().is_some()
    }

    pub(crate) fn record_clear(&self, color: ClearColor) {
        let mut pending = self.lock();
        if pending.is_some() {
            error!("render target cleared twice before a pass consumed the first clear");
            debug_assert!(pending.is_none(), "double clear on a render target view");
        }
        *pending = Some(color);
    }

    pub(crate) fn take_clear(&self) -> Option<ClearColor> {
        self.lock().take()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<ClearColor>> {
        self.pending_clear
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// A depth/stencil view over a texture.
pub struct DepthStencilView {
    texture: TextureHandle,
    pending_clear: Mutex<PendingDepthClear>,
}

#[derive(Default, Clone, Copy)]
struct PendingDepthClear {
    depth: Option<f64>,
    stencil: Option<u32>,
}

/// Shared handle to a [`DepthStencilView`].
pub type DepthStencilTargetHandle = Arc<DepthStencilView>;

impl DepthStencilView {
    /// Creates a view over `texture`.
    pub fn new(texture: TextureHandle) -> DepthStencilTargetHandle {
        Arc::new(DepthStencilView {
            texture,
            pending_clear: Mutex::new(PendingDepthClear::default()),
        })
    }

    /// The viewed texture.
    pub fn texture(&self) -> &TextureHandle {
        &self.texture
    }

    /// Whether a depth or stencil clear is parked on this view.
    pub fn has_pending_clear(&self) -> bool {
        let pending = self.lock();
        pending.depth.is_some() || pending.stencil.is_some()
    }

    pub(crate) fn record_clear(&self, depth: Option<f64>, stencil: Option<u32>) {
        let mut pending = self.lock();
        if depth.is_some() && pending.depth.is_some() {
            error!("depth target cleared twice before a pass consumed the first clear");
            debug_assert!(pending.depth.is_none(), "double depth clear");
        }
        if stencil.is_some() && pending.stencil.is_some() {
            error!("stencil target cleared twice before a pass consumed the first clear");
            debug_assert!(pending.stencil.is_none(), "double stencil clear");
        }
        if let Some(depth) = depth {
            pending.depth = Some(depth);
        }
        if let Some(stencil) = stencil {
            pending.stencil = Some(stencil);
        }
    }

    pub(crate) fn take_depth_clear(&self) -> Option<f64> {
        self.lock().depth.take()
    }

    pub(crate) fn take_stencil_clear(&self) -> Option<u32> {
        self.lock().stencil.take()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PendingDepthClear> {
        self.pending_clear
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
