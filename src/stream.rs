// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use crate::gpu::PlaneTexture;
use crate::handoff::GpuFrame;
use crate::types::*;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u64);

/// A frame whose pixels are not addressable as one byte buffer (planes owned by someone
/// else, possibly on another device). It can still copy itself out.
pub trait CopyToBuffer {
    /// Writes the frame as one packed buffer into `dst`, reusing its allocation.
    fn copy_to(&self, dst: &mut Vec<u8>) -> Result<(), GpuPushError>;
}

/// A frame produced by an upstream stage that already lives on the GPU.
pub trait GpuNativeFrame {
    fn plane_at(&self, index: usize) -> Option<PlaneTexture>;
}

pub enum FramePayload {
    Contiguous(Vec<u8>),
    External(Box<dyn CopyToBuffer>),
    GpuNative(Box<dyn GpuNativeFrame>),
}

impl std::fmt::Debug for FramePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FramePayload::Contiguous(data) => write!(f, "Contiguous({} bytes)", data.len()),
            FramePayload::External(_) => f.write_str("External"),
            FramePayload::GpuNative(_) => f.write_str("GpuNative"),
        }
    }
}

#[derive(Debug)]
pub struct InputBuffer {
    pub payload: FramePayload,
    pub props: FrameProps,
}

impl InputBuffer {
    pub fn new(data: Vec<u8>) -> Self {
        Self { payload: FramePayload::Contiguous(data), props: FrameProps::default() }
    }
    pub fn external<T: CopyToBuffer + 'static>(source: T) -> Self {
        Self { payload: FramePayload::External(Box::new(source)), props: FrameProps::default() }
    }
    pub fn gpu_native<T: GpuNativeFrame + 'static>(frame: T) -> Self {
        Self { payload: FramePayload::GpuNative(Box::new(frame)), props: FrameProps::default() }
    }
    pub fn with_timestamp(mut self, timestamp_us: i64) -> Self {
        self.props.timestamp_us = Some(timestamp_us);
        self
    }

    pub fn is_gpu_native(&self) -> bool {
        matches!(self.payload, FramePayload::GpuNative(_))
    }
}

/// Host side of an input stream. Taking a buffer out of the port consumes it.
pub trait InputPort {
    fn next_buffer(&mut self) -> Option<InputBuffer>;
    fn is_eos(&self) -> bool;
}

/// Host side of the mirrored output stream.
pub trait OutputPort {
    fn set_properties(&mut self, props: StreamProperties);
    fn send(&mut self, frame: GpuFrame);
    /// Passes an input buffer through untouched.
    fn forward(&mut self, buffer: InputBuffer);
    fn set_eos(&mut self);
}

#[derive(Default)]
struct MemoryInputInner {
    queue: VecDeque<InputBuffer>,
    eos: bool,
}

/// In-memory input port. Clones share the same queue, so a producer can keep feeding a
/// port that was handed to the registry.
#[derive(Clone, Default)]
pub struct MemoryInput {
    inner: Arc<Mutex<MemoryInputInner>>,
}

impl MemoryInput {
    pub fn new() -> Self { Self::default() }

    pub fn push(&self, buffer: InputBuffer) {
        self.inner.lock().queue.push_back(buffer);
    }
    pub fn set_eos(&self) {
        self.inner.lock().eos = true;
    }
    pub fn pending(&self) -> usize {
        self.inner.lock().queue.len()
    }
}

impl InputPort for MemoryInput {
    fn next_buffer(&mut self) -> Option<InputBuffer> {
        self.inner.lock().queue.pop_front()
    }
    fn is_eos(&self) -> bool {
        let inner = self.inner.lock();
        inner.eos && inner.queue.is_empty()
    }
}

#[derive(Default)]
struct MemoryOutputInner {
    properties: Option<StreamProperties>,
    frames: Vec<GpuFrame>,
    forwarded: Vec<InputBuffer>,
    eos: bool,
}

/// In-memory output port collecting everything the registry emits.
#[derive(Clone, Default)]
pub struct MemoryOutput {
    inner: Arc<Mutex<MemoryOutputInner>>,
}

impl MemoryOutput {
    pub fn new() -> Self { Self::default() }

    pub fn properties(&self) -> Option<StreamProperties> { self.inner.lock().properties.clone() }
    pub fn frame_count(&self) -> usize { self.inner.lock().frames.len() }
    pub fn forwarded_count(&self) -> usize { self.inner.lock().forwarded.len() }
    pub fn is_eos(&self) -> bool { self.inner.lock().eos }

    /// Hands the collected frames to the caller, who becomes responsible for releasing them.
    pub fn take_frames(&self) -> Vec<GpuFrame> {
        std::mem::take(&mut self.inner.lock().frames)
    }
    pub fn take_forwarded(&self) -> Vec<InputBuffer> {
        std::mem::take(&mut self.inner.lock().forwarded)
    }
}

impl OutputPort for MemoryOutput {
    fn set_properties(&mut self, props: StreamProperties) {
        self.inner.lock().properties = Some(props);
    }
    fn send(&mut self, frame: GpuFrame) {
        self.inner.lock().frames.push(frame);
    }
    fn forward(&mut self, buffer: InputBuffer) {
        self.inner.lock().forwarded.push(buffer);
    }
    fn set_eos(&mut self) {
        self.inner.lock().eos = true;
    }
}
