// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use crate::gpu::{ PlaneTexture, TextureTarget };
use crate::texture_set::SharedHandles;
use crate::types::*;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, Ordering };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffState {
    /// No frame pending, the stream may upload.
    Idle,
    /// A frame sent downstream still samples the stream's textures.
    Emitted,
}

#[derive(Debug, Default)]
struct GateState {
    emitted: Option<u64>,
    next_generation: u64,
}

/// Backpressure gate of one stream: at most one emitted frame owns the textures.
#[derive(Debug, Clone, Default)]
pub struct FrameGate {
    inner: Arc<Mutex<GateState>>,
}

impl FrameGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> HandoffState {
        if self.inner.lock().emitted.is_some() { HandoffState::Emitted } else { HandoffState::Idle }
    }

    pub fn is_pending(&self) -> bool {
        self.state() == HandoffState::Emitted
    }

    fn open(&self) -> u64 {
        let mut gate = self.inner.lock();
        gate.next_generation += 1;
        gate.emitted = Some(gate.next_generation);
        gate.next_generation
    }

    fn close(&self, generation: u64) -> bool {
        let mut gate = self.inner.lock();
        if gate.emitted == Some(generation) {
            gate.emitted = None;
            true
        } else {
            false
        }
    }

    /// Forces the gate back to `Idle`, forgetting the frame in flight. Its release hook
    /// becomes a no-op.
    pub fn reset(&self) {
        self.inner.lock().emitted = None;
    }
}

/// What an outgoing frame exposes to downstream consumers.
pub trait PlaneAccess {
    fn plane_at(&self, index: usize) -> Option<PlaneTexture>;
    fn on_release(&self);
}

/// Ties an emitted frame to its stream: the gate it holds and the handle array it samples.
pub struct HandoffLink {
    gate: FrameGate,
    handles: SharedHandles,
    generation: u64,
    released: AtomicBool,
}

impl PlaneAccess for HandoffLink {
    fn plane_at(&self, index: usize) -> Option<PlaneTexture> {
        let id = (*self.handles.read().get(index)?)?;
        Some(PlaneTexture { id, target: TextureTarget::Texture2D })
    }

    fn on_release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if !self.gate.close(self.generation) {
            log::trace!("Release of stale frame generation {}", self.generation);
        }
    }
}

/// A GPU-resident frame: pixels are only reachable through per-plane texture handles.
///
/// The textures are shared with every other frame of the same stream, so the stream
/// won't upload again until this frame is released (explicitly or by dropping it).
pub struct GpuFrame {
    link: HandoffLink,
    width: u32,
    height: u32,
    format: PixelFormat,
    plane_count: usize,
    props: FrameProps,
}

impl GpuFrame {
    /// Builds the outgoing frame and closes the gate in the same step.
    pub(crate) fn emit(gate: &FrameGate, handles: SharedHandles, width: u32, height: u32, format: PixelFormat, props: FrameProps) -> Self {
        let plane_count = handles.read().len();
        let generation = gate.open();
        Self {
            link: HandoffLink {
                gate: gate.clone(),
                handles,
                generation,
                released: AtomicBool::new(false),
            },
            width,
            height,
            format,
            plane_count,
            props,
        }
    }

    pub fn width(&self) -> u32 { self.width }
    pub fn height(&self) -> u32 { self.height }
    /// Pixel format of the source; consumers use it to reinterpret channel order.
    pub fn format(&self) -> PixelFormat { self.format }
    pub fn plane_count(&self) -> usize { self.plane_count }
    pub fn props(&self) -> &FrameProps { &self.props }
    pub fn timestamp_us(&self) -> Option<i64> { self.props.timestamp_us }

    /// The host must not recycle this frame's GPU content before calling [`GpuFrame::release`].
    pub fn is_blocking(&self) -> bool { true }

    pub fn plane_at(&self, index: usize) -> Option<PlaneTexture> {
        self.link.plane_at(index)
    }

    /// Downstream is done sampling. Only the first call has an effect.
    pub fn release(&self) {
        self.link.on_release();
    }

    pub fn is_released(&self) -> bool {
        self.link.released.load(Ordering::Acquire)
    }
}

impl fmt::Debug for GpuFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("plane_count", &self.plane_count)
            .field("generation", &self.link.generation)
            .finish_non_exhaustive()
    }
}

impl Drop for GpuFrame {
    fn drop(&mut self) {
        self.link.on_release();
    }
}
