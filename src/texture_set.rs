// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use crate::gpu::{ GpuContext, TextureId };
use crate::planner::PlaneDescriptor;
use parking_lot::RwLock;
use std::sync::Arc;

/// Handle array shared with outgoing frames. `None` is a texture not allocated yet.
pub type SharedHandles = Arc<RwLock<Vec<Option<TextureId>>>>;

/// Per-stream textures, one per plane, created lazily and reused across frames.
#[derive(Debug, Default)]
pub struct TextureSet {
    planes: Vec<PlaneDescriptor>,
    handles: SharedHandles,
}

impl TextureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn planes(&self) -> &[PlaneDescriptor] { &self.planes }
    pub fn len(&self) -> usize { self.planes.len() }
    pub fn is_empty(&self) -> bool { self.planes.is_empty() }

    pub fn handles(&self) -> SharedHandles { self.handles.clone() }
    pub fn texture_ids(&self) -> Vec<Option<TextureId>> { self.handles.read().clone() }

    /// Installs `planes` as the current layout. Returns `true` when the handle array was
    /// rebuilt, `false` when the existing textures still fit and were kept.
    ///
    /// Either way, frames emitted before this call lose access to the textures.
    pub fn ensure<C: GpuContext + ?Sized>(&mut self, gpu: &mut C, planes: &[PlaneDescriptor]) -> bool {
        let unchanged = planes.len() == self.planes.len()
            && planes.iter().zip(&self.planes).all(|(new, old)| new.same_texture(old));

        if unchanged {
            // Offsets may still move (stride change), the textures don't.
            self.planes = planes.to_vec();
            self.detach();
            return false;
        }

        self.release(gpu);
        self.planes = planes.to_vec();
        self.handles = Arc::new(RwLock::new(vec![None; planes.len()]));
        true
    }

    /// Moves the textures into a new handle array and leaves the old one empty, so frames
    /// holding the old array see not-found.
    fn detach(&mut self) {
        let ids = std::mem::take(&mut *self.handles.write());
        self.handles = Arc::new(RwLock::new(ids));
    }

    /// Destroys every allocated texture and empties the set. Frames still holding the
    /// handle array see it empty afterwards.
    pub fn release<C: GpuContext + ?Sized>(&mut self, gpu: &mut C) {
        let mut handles = self.handles.write();
        for id in handles.iter_mut().filter_map(Option::take) {
            log::trace!("Destroying texture {id:?}");
            gpu.destroy_texture(id);
        }
        handles.clear();
        drop(handles);
        self.planes.clear();
    }
}
