// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use crate::gpu::{ GpuBackend, GpuContext, LazyGpu, TextureId };
use crate::handoff::{ FrameGate, GpuFrame, HandoffState };
use crate::planner::{ plan_format, PlaneDescriptor };
use crate::stream::{ InputPort, OutputPort, StreamId };
use crate::texture_set::TextureSet;
use crate::uploader::FrameUploader;
use crate::types::*;
use std::collections::BTreeMap;

/// Complete input geometry a layout was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub stride: Option<u32>,
    pub chroma_stride: Option<u32>,
}

impl Geometry {
    /// `None` until width, height and format are all known and non-zero.
    pub fn from_properties(props: &StreamProperties) -> Result<Option<Self>, GpuPushError> {
        let (Some(width), Some(height), Some(tag)) = (props.width, props.height, props.pixel_format.as_deref()) else {
            return Ok(None);
        };
        if width == 0 || height == 0 || tag.is_empty() {
            return Ok(None);
        }
        let format = tag.parse::<PixelFormat>()?;
        Ok(Some(Self { width, height, format, stride: props.stride, chroma_stride: props.chroma_stride }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigureOutcome {
    /// Layout (re)built.
    Configured,
    /// Same geometry as the current configuration, nothing touched.
    Unchanged,
    /// Geometry not fully known yet (or metadata-only mode), try again on the next configuration.
    NotReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTick {
    /// A frame is still in flight, the stream was skipped.
    Blocked,
    /// No input available.
    Idle,
    EndOfStream,
    Emitted,
    /// GPU-native input passed through.
    Forwarded,
    /// Input consumed but not emitted (upload failure or unconfigured stream).
    Dropped,
}

#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub outcomes: Vec<(StreamId, StreamTick)>,
}

impl TickReport {
    pub fn count(&self, tick: StreamTick) -> usize {
        self.outcomes.iter().filter(|(_, t)| *t == tick).count()
    }
    pub fn outcome(&self, id: StreamId) -> Option<StreamTick> {
        self.outcomes.iter().find(|(i, _)| *i == id).map(|(_, t)| *t)
    }
    pub fn emitted(&self) -> usize { self.count(StreamTick::Emitted) }
}

struct StreamState {
    input: Box<dyn InputPort>,
    output: Box<dyn OutputPort>,
    geometry: Option<Geometry>,
    /// Geometry accepted while the graphics context could not be created yet.
    pending: Option<Geometry>,
    textures: TextureSet,
    gate: FrameGate,
    uploader: FrameUploader,
}

impl StreamState {
    fn unconfigure<C: GpuContext + ?Sized>(&mut self, gpu: Option<&mut C>) {
        if let Some(gpu) = gpu {
            self.textures.release(gpu);
        }
        self.gate.reset();
        self.geometry = None;
        self.pending = None;
    }
}

/// Active streams and the GPU context they upload into.
pub struct StreamRegistry<C: GpuContext = GpuBackend> {
    options: PushOptions,
    gpu: LazyGpu<C>,
    streams: BTreeMap<StreamId, StreamState>,
    next_id: u64,
}

impl StreamRegistry<GpuBackend> {
    pub fn new(options: PushOptions) -> Self {
        let factory_options = options.clone();
        Self::with_context_factory(options, move || GpuBackend::new(&factory_options))
    }
}

impl<C: GpuContext> StreamRegistry<C> {
    /// `factory` creates the graphics context, once, on the first configuration.
    pub fn with_context_factory<F: FnMut() -> Result<C, GpuPushError> + 'static>(options: PushOptions, factory: F) -> Self {
        Self {
            options,
            gpu: LazyGpu::new(factory),
            streams: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn options(&self) -> &PushOptions { &self.options }

    pub fn add<I: InputPort + 'static, O: OutputPort + 'static>(&mut self, input: I, output: O) -> StreamId {
        let id = StreamId(self.next_id);
        self.next_id += 1;
        self.streams.insert(id, StreamState {
            input: Box::new(input),
            output: Box::new(output),
            geometry: None,
            pending: None,
            textures: TextureSet::new(),
            gate: FrameGate::new(),
            uploader: FrameUploader::new(),
        });
        log::debug!("{}: added stream {id:?}", self.options.label());
        id
    }

    pub fn configure(&mut self, id: StreamId, props: &StreamProperties) -> Result<ConfigureOutcome, GpuPushError> {
        let state = self.streams.get_mut(&id).ok_or(GpuPushError::UnknownStream(id))?;
        state.output.set_properties(props.output_properties());

        if self.options.metadata_only {
            return Ok(ConfigureOutcome::NotReady);
        }
        let gpu = match self.gpu.get_or_init() {
            Ok(gpu) => gpu,
            Err(e) => {
                // Finished by the next tick once the context can be created
                state.pending = Geometry::from_properties(props).ok().flatten();
                log::warn!("{}: graphics context unavailable: {e}", self.options.label());
                return Err(e);
            }
        };
        state.pending = None;

        let geometry = match Geometry::from_properties(props) {
            Ok(Some(geometry)) => geometry,
            Ok(None) => return Ok(ConfigureOutcome::NotReady),
            Err(e) => {
                log::error!("{}: {e}", self.options.label());
                state.unconfigure(Some(gpu));
                return Err(e);
            }
        };
        if state.geometry == Some(geometry) {
            return Ok(ConfigureOutcome::Unchanged);
        }

        Self::apply(gpu, id, state, geometry)?;
        Ok(ConfigureOutcome::Configured)
    }

    /// Builds the plane layout of `geometry` and installs it on the stream. Frames emitted
    /// under the previous layout lose their textures and their release becomes a no-op.
    fn apply(gpu: &mut C, id: StreamId, state: &mut StreamState, geometry: Geometry) -> Result<(), GpuPushError> {
        log::debug!("Configure stream {id:?} {}x{}@{}", geometry.width, geometry.height, geometry.format);
        let planes = match plan_format(geometry.format, geometry.width, geometry.height, geometry.stride, geometry.chroma_stride) {
            Ok(planes) => planes,
            Err(e) => {
                log::error!("Stream {id:?}: {e}");
                state.unconfigure(Some(gpu));
                return Err(e);
            }
        };
        if state.textures.ensure(gpu, &planes) {
            log::trace!("Stream {id:?}: texture set rebuilt for {} planes", planes.len());
        }
        state.gate.reset();
        state.geometry = Some(geometry);
        Ok(())
    }

    /// One scheduling pass over every stream. Never fails: per-frame errors are logged
    /// and the frame is dropped.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        for (&id, state) in self.streams.iter_mut() {
            let outcome = Self::tick_stream(&mut self.gpu, id, state);
            log::trace!("Stream {id:?}: {outcome:?}");
            report.outcomes.push((id, outcome));
        }
        report
    }

    fn tick_stream(gpu: &mut LazyGpu<C>, id: StreamId, state: &mut StreamState) -> StreamTick {
        if state.gate.is_pending() {
            return StreamTick::Blocked;
        }

        let Some(buffer) = state.input.next_buffer() else {
            if state.input.is_eos() {
                state.output.set_eos();
                return StreamTick::EndOfStream;
            }
            return StreamTick::Idle;
        };

        if buffer.is_gpu_native() {
            state.output.forward(buffer);
            return StreamTick::Forwarded;
        }

        if let Some(geometry) = state.pending {
            match gpu.get_or_init() {
                Ok(context) => {
                    state.pending = None;
                    if let Err(e) = Self::apply(context, id, state, geometry) {
                        log::warn!("Stream {id:?}: dropping frame: {e}");
                        return StreamTick::Dropped;
                    }
                }
                Err(e) => {
                    log::warn!("Stream {id:?}: dropping frame, graphics context unavailable: {e}");
                    return StreamTick::Dropped;
                }
            }
        }

        let (Some(geometry), Some(gpu)) = (state.geometry, gpu.get_mut()) else {
            log::warn!("Stream {id:?} is not configured, dropping frame");
            return StreamTick::Dropped;
        };

        if let Err(e) = state.uploader.upload(gpu, &buffer, &state.textures) {
            log::warn!("Stream {id:?}: dropping frame: {e}");
            return StreamTick::Dropped;
        }

        let frame = GpuFrame::emit(&state.gate, state.textures.handles(), geometry.width, geometry.height, geometry.format, buffer.props);
        state.output.send(frame);
        StreamTick::Emitted
    }

    /// Drops a stream. Its textures are destroyed right away, even if a frame is still in
    /// flight; such a frame only returns not-found from then on.
    pub fn remove(&mut self, id: StreamId) -> Result<(), GpuPushError> {
        let mut state = self.streams.remove(&id).ok_or(GpuPushError::UnknownStream(id))?;
        if state.gate.is_pending() {
            log::debug!("Removing stream {id:?} with a frame in flight");
        }
        state.unconfigure(self.gpu.get_mut());
        Ok(())
    }

    pub fn len(&self) -> usize { self.streams.len() }
    pub fn is_empty(&self) -> bool { self.streams.is_empty() }
    pub fn stream_ids(&self) -> impl Iterator<Item = StreamId> + '_ { self.streams.keys().copied() }

    pub fn is_configured(&self, id: StreamId) -> bool {
        self.streams.get(&id).is_some_and(|s| s.geometry.is_some())
    }
    pub fn geometry(&self, id: StreamId) -> Option<Geometry> {
        self.streams.get(&id)?.geometry
    }
    pub fn handoff_state(&self, id: StreamId) -> Option<HandoffState> {
        self.streams.get(&id).map(|s| s.gate.state())
    }
    pub fn is_frame_pending(&self, id: StreamId) -> bool {
        self.handoff_state(id) == Some(HandoffState::Emitted)
    }
    pub fn planes(&self, id: StreamId) -> Option<&[PlaneDescriptor]> {
        self.streams.get(&id).map(|s| s.textures.planes())
    }
    pub fn texture_ids(&self, id: StreamId) -> Option<Vec<Option<TextureId>>> {
        self.streams.get(&id).map(|s| s.textures.texture_ids())
    }

    /// The graphics context, once the first configuration created it.
    pub fn gpu(&self) -> Option<&C> { self.gpu.get() }
    pub fn gpu_mut(&mut self) -> Option<&mut C> { self.gpu.get_mut() }
}

impl<C: GpuContext> Drop for StreamRegistry<C> {
    fn drop(&mut self) {
        let gpu = self.gpu.get_mut();
        if let Some(gpu) = gpu {
            for state in self.streams.values_mut() {
                state.textures.release(gpu);
                state.gate.reset();
            }
        }
    }
}
