// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use gpu_push::*;
use std::cell::Cell;
use std::rc::Rc;

fn headless_registry() -> StreamRegistry<HeadlessGpu> {
    StreamRegistry::with_context_factory(PushOptions::default(), || Ok(HeadlessGpu::new()))
}

fn frame_bytes(format: &str, width: u32, height: u32, fill: u8) -> Vec<u8> {
    vec![fill; total_size(&plan(format, width, height, None, None).unwrap())]
}

fn nv12_stream(registry: &mut StreamRegistry<HeadlessGpu>) -> (StreamId, MemoryInput, MemoryOutput) {
    let input = MemoryInput::new();
    let output = MemoryOutput::new();
    let id = registry.add(input.clone(), output.clone());
    assert_eq!(registry.configure(id, &StreamProperties::new(64, 48, "nv12")).unwrap(), ConfigureOutcome::Configured);
    (id, input, output)
}

#[test]
fn test_emit_blocks_until_release() {
    let mut registry = headless_registry();
    let (id, input, output) = nv12_stream(&mut registry);
    input.push(InputBuffer::new(frame_bytes("nv12", 64, 48, 1)));
    input.push(InputBuffer::new(frame_bytes("nv12", 64, 48, 2)));

    assert_eq!(registry.tick().outcome(id), Some(StreamTick::Emitted));
    assert!(registry.is_frame_pending(id));
    assert_eq!(input.pending(), 1);
    let uploads = registry.gpu().unwrap().upload_count();
    assert_eq!(uploads, 2);

    // While the frame is out, nothing is pulled and nothing is uploaded
    for _ in 0..3 {
        assert_eq!(registry.tick().outcome(id), Some(StreamTick::Blocked));
    }
    assert_eq!(input.pending(), 1);
    assert_eq!(registry.gpu().unwrap().upload_count(), uploads);

    let frames = output.take_frames();
    assert_eq!(frames.len(), 1);
    let frame = &frames[0];
    assert!(frame.is_blocking());
    assert_eq!(frame.plane_count(), 2);
    assert_eq!(frame.format(), PixelFormat::NV12);
    let luma = frame.plane_at(0).unwrap();
    assert_eq!(luma.target, TextureTarget::Texture2D);
    assert_eq!(registry.gpu().unwrap().texture_data(luma.id).unwrap()[0], 1);
    assert_eq!(frame.plane_at(2), None);

    frame.release();
    assert_eq!(registry.handoff_state(id), Some(HandoffState::Idle));
    frame.release();
    assert_eq!(registry.handoff_state(id), Some(HandoffState::Idle));

    assert_eq!(registry.tick().outcome(id), Some(StreamTick::Emitted));
    assert_eq!(input.pending(), 0);
    // Same textures, new content
    let second = output.take_frames();
    assert_eq!(second[0].plane_at(0), Some(luma));
    assert_eq!(registry.gpu().unwrap().texture_data(luma.id).unwrap()[0], 2);
    assert_eq!(registry.gpu().unwrap().created_count(), 2);
}

#[test]
fn test_dropping_frame_releases_it() {
    let mut registry = headless_registry();
    let (id, input, output) = nv12_stream(&mut registry);
    input.push(InputBuffer::new(frame_bytes("nv12", 64, 48, 0)));
    registry.tick();
    assert!(registry.is_frame_pending(id));
    drop(output.take_frames());
    assert!(!registry.is_frame_pending(id));
}

#[test]
fn test_frames_keep_arrival_order_and_props() {
    let mut registry = headless_registry();
    let (_id, input, output) = nv12_stream(&mut registry);
    for ts in [0, 40_000, 80_000] {
        let mut buffer = InputBuffer::new(frame_bytes("nv12", 64, 48, 0)).with_timestamp(ts);
        buffer.props.metadata.insert("seq".into(), ts.to_string());
        input.push(buffer);
    }
    let mut seen = Vec::new();
    for _ in 0..3 {
        registry.tick();
        for frame in output.take_frames() {
            assert_eq!(frame.props().metadata.get("seq"), Some(&frame.timestamp_us().unwrap().to_string()));
            seen.push(frame.timestamp_us().unwrap());
        }
    }
    assert_eq!(seen, vec![0, 40_000, 80_000]);
}

#[test]
fn test_reconfigure_same_geometry_is_noop() {
    let mut registry = headless_registry();
    let (id, input, output) = nv12_stream(&mut registry);
    input.push(InputBuffer::new(frame_bytes("nv12", 64, 48, 0)));
    registry.tick();
    let ids = registry.texture_ids(id).unwrap();
    assert!(ids.iter().all(Option::is_some));

    assert_eq!(registry.configure(id, &StreamProperties::new(64, 48, "nv12")).unwrap(), ConfigureOutcome::Unchanged);
    assert_eq!(registry.texture_ids(id).unwrap(), ids);
    assert!(registry.is_frame_pending(id));
    assert_eq!(registry.gpu().unwrap().destroyed_count(), 0);
    drop(output.take_frames());
}

#[test]
fn test_reconfigure_new_geometry_releases_textures() {
    let mut registry = headless_registry();
    let (id, input, output) = nv12_stream(&mut registry);
    input.push(InputBuffer::new(frame_bytes("nv12", 64, 48, 0)));
    registry.tick();
    let frames = output.take_frames();
    let old: Vec<_> = registry.texture_ids(id).unwrap().into_iter().flatten().collect();

    assert_eq!(registry.configure(id, &StreamProperties::new(128, 96, "nv12")).unwrap(), ConfigureOutcome::Configured);
    let gpu = registry.gpu().unwrap();
    assert_eq!(gpu.destroyed_count(), 2);
    assert_eq!(gpu.live_textures(), 0);
    assert!(old.iter().all(|t| gpu.texture(*t).is_none()));
    // In-flight state is discarded, the old frame no longer resolves planes
    assert!(!registry.is_frame_pending(id));
    assert_eq!(frames[0].plane_at(0), None);
    assert_eq!(registry.planes(id).unwrap()[0].byte_size, 128 * 96);

    input.push(InputBuffer::new(frame_bytes("nv12", 128, 96, 0)));
    assert_eq!(registry.tick().outcome(id), Some(StreamTick::Emitted));
    assert_eq!(registry.gpu().unwrap().live_textures(), 2);
    // The stale frame's release does not free the new one
    drop(frames);
    assert!(registry.is_frame_pending(id));
}

#[test]
fn test_stride_change_detaches_frame_in_flight() {
    let mut registry = headless_registry();
    let input = MemoryInput::new();
    let output = MemoryOutput::new();
    let id = registry.add(input.clone(), output.clone());
    registry.configure(id, &StreamProperties::new(64, 48, "grey")).unwrap();
    input.push(InputBuffer::new(vec![1; 64 * 48]));
    assert_eq!(registry.tick().outcome(id), Some(StreamTick::Emitted));
    let held = output.take_frames();
    let texture = held[0].plane_at(0).unwrap().id;

    let padded = StreamProperties::new(64, 48, "grey").with_strides(Some(80), None);
    assert_eq!(registry.configure(id, &padded).unwrap(), ConfigureOutcome::Configured);
    // Textures are kept but the held frame can no longer reach them
    assert_eq!(registry.gpu().unwrap().destroyed_count(), 0);
    assert_eq!(held[0].plane_at(0), None);
    assert!(!registry.is_frame_pending(id));

    input.push(InputBuffer::new(vec![2; 80 * 48]));
    assert_eq!(registry.tick().outcome(id), Some(StreamTick::Emitted));
    let current = output.take_frames();
    assert_eq!(current[0].plane_at(0).map(|p| p.id), Some(texture));
    assert_eq!(registry.gpu().unwrap().texture_data(texture).unwrap()[0], 2);
    assert_eq!(held[0].plane_at(0), None);

    drop(held);
    assert!(registry.is_frame_pending(id));
    drop(current);
    assert!(!registry.is_frame_pending(id));
}

#[test]
fn test_remove_with_pending_frame() {
    let mut registry = headless_registry();
    let (id, input, output) = nv12_stream(&mut registry);
    input.push(InputBuffer::new(frame_bytes("nv12", 64, 48, 0)));
    registry.tick();
    let frames = output.take_frames();
    assert!(frames[0].plane_at(1).is_some());

    registry.remove(id).unwrap();
    assert_eq!(registry.gpu().unwrap().live_textures(), 0);
    assert_eq!(registry.gpu().unwrap().destroyed_count(), 2);
    assert_eq!(frames[0].plane_at(0), None);
    assert!(registry.is_empty());
    assert!(matches!(registry.remove(id), Err(GpuPushError::UnknownStream(_))));
    // Late release is harmless
    frames[0].release();
}

#[test]
fn test_unsupported_format_leaves_stream_unconfigured() {
    let mut registry = headless_registry();
    let (id, input, output) = nv12_stream(&mut registry);
    input.push(InputBuffer::new(frame_bytes("nv12", 64, 48, 0)));
    registry.tick();
    drop(output.take_frames());

    match registry.configure(id, &StreamProperties::new(64, 48, "uyvy422")) {
        Err(GpuPushError::UnsupportedFormat(tag)) => assert_eq!(tag, "uyvy422"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(!registry.is_configured(id));
    assert!(registry.planes(id).unwrap().is_empty());
    assert_eq!(registry.gpu().unwrap().live_textures(), 0);

    input.push(InputBuffer::new(frame_bytes("nv12", 64, 48, 0)));
    assert_eq!(registry.tick().outcome(id), Some(StreamTick::Dropped));

    assert_eq!(registry.configure(id, &StreamProperties::new(64, 48, "rgba")).unwrap(), ConfigureOutcome::Configured);
    input.push(InputBuffer::new(frame_bytes("rgba", 64, 48, 0)));
    assert_eq!(registry.tick().outcome(id), Some(StreamTick::Emitted));
    assert_eq!(output.take_frames()[0].plane_count(), 1);
}

#[test]
fn test_incomplete_geometry_is_deferred() {
    let mut registry = headless_registry();
    let id = registry.add(MemoryInput::new(), MemoryOutput::new());
    let mut props = StreamProperties::new(64, 48, "nv12");
    props.height = None;
    assert_eq!(registry.configure(id, &props).unwrap(), ConfigureOutcome::NotReady);
    props.height = Some(0);
    assert_eq!(registry.configure(id, &props).unwrap(), ConfigureOutcome::NotReady);
    assert!(!registry.is_configured(id));
    assert!(registry.planes(id).unwrap().is_empty());
}

#[test]
fn test_context_is_created_lazily_once() {
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    let mut registry = StreamRegistry::with_context_factory(PushOptions::default(), move || {
        counter.set(counter.get() + 1);
        Ok(HeadlessGpu::new())
    });
    let a = registry.add(MemoryInput::new(), MemoryOutput::new());
    let b = registry.add(MemoryInput::new(), MemoryOutput::new());
    registry.tick();
    assert_eq!(calls.get(), 0);
    assert!(registry.gpu().is_none());

    registry.configure(a, &StreamProperties::new(32, 16, "rgba")).unwrap();
    registry.configure(b, &StreamProperties::new(32, 16, "grey")).unwrap();
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_metadata_only_never_touches_gpu() {
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    let options = PushOptions { metadata_only: true, ..Default::default() };
    let mut registry = StreamRegistry::with_context_factory(options, move || {
        counter.set(counter.get() + 1);
        Ok(HeadlessGpu::new())
    });
    let id = registry.add(MemoryInput::new(), MemoryOutput::new());
    assert_eq!(registry.configure(id, &StreamProperties::new(32, 16, "rgba")).unwrap(), ConfigureOutcome::NotReady);
    assert_eq!(calls.get(), 0);
}

#[test]
fn test_context_failure_is_reported_and_retried() {
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    let mut registry = StreamRegistry::with_context_factory(PushOptions::default(), move || {
        counter.set(counter.get() + 1);
        if counter.get() == 1 {
            Err(GpuPushError::ResourceAllocationFailure("no device".into()))
        } else {
            Ok(HeadlessGpu::new())
        }
    });
    let id = registry.add(MemoryInput::new(), MemoryOutput::new());
    let props = StreamProperties::new(32, 16, "rgba");
    assert!(matches!(registry.configure(id, &props), Err(GpuPushError::ResourceAllocationFailure(_))));
    assert_eq!(registry.configure(id, &props).unwrap(), ConfigureOutcome::Configured);
}

#[test]
fn test_context_failure_is_retried_by_tick() {
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    let mut registry = StreamRegistry::with_context_factory(PushOptions::default(), move || {
        counter.set(counter.get() + 1);
        if counter.get() <= 2 {
            Err(GpuPushError::ResourceAllocationFailure("no device".into()))
        } else {
            Ok(HeadlessGpu::new())
        }
    });
    let input = MemoryInput::new();
    let output = MemoryOutput::new();
    let id = registry.add(input.clone(), output.clone());
    assert!(matches!(registry.configure(id, &StreamProperties::new(64, 48, "nv12")), Err(GpuPushError::ResourceAllocationFailure(_))));
    assert!(!registry.is_configured(id));

    // Idle ticks don't try to create the context
    assert_eq!(registry.tick().outcome(id), Some(StreamTick::Idle));
    assert_eq!(calls.get(), 1);

    input.push(InputBuffer::new(frame_bytes("nv12", 64, 48, 3)));
    input.push(InputBuffer::new(frame_bytes("nv12", 64, 48, 4)));
    // Still failing: only the current frame is lost
    assert_eq!(registry.tick().outcome(id), Some(StreamTick::Dropped));
    assert_eq!(calls.get(), 2);

    assert_eq!(registry.tick().outcome(id), Some(StreamTick::Emitted));
    assert_eq!(calls.get(), 3);
    assert!(registry.is_configured(id));
    assert_eq!(registry.planes(id).unwrap().len(), 2);
    let frames = output.take_frames();
    let luma = frames[0].plane_at(0).unwrap();
    assert_eq!(registry.gpu().unwrap().texture_data(luma.id).unwrap()[0], 4);
}

#[test]
fn test_unaddressable_geometry_is_rejected() {
    let mut registry = headless_registry();
    let (id, _input, _output) = nv12_stream(&mut registry);
    let huge = StreamProperties::new(u32::MAX, u32::MAX, "rgba");
    assert!(matches!(registry.configure(id, &huge), Err(GpuPushError::GeometryOverflow { .. })));
    assert!(!registry.is_configured(id));
    assert!(registry.planes(id).unwrap().is_empty());
}

#[test]
fn test_allocation_failure_drops_frame_and_retries() {
    let mut registry = StreamRegistry::with_context_factory(PushOptions::default(), || Ok(HeadlessGpu::with_texture_limit(1)));
    let (id, input, output) = nv12_stream(&mut registry);
    input.push(InputBuffer::new(frame_bytes("nv12", 64, 48, 0)));
    input.push(InputBuffer::new(frame_bytes("nv12", 64, 48, 0)));

    assert_eq!(registry.tick().outcome(id), Some(StreamTick::Dropped));
    assert_eq!(registry.handoff_state(id), Some(HandoffState::Idle));
    assert_eq!(output.frame_count(), 0);

    registry.gpu_mut().unwrap().set_texture_limit(None);
    assert_eq!(registry.tick().outcome(id), Some(StreamTick::Emitted));
    assert_eq!(output.frame_count(), 1);
    drop(output.take_frames());
}

#[test]
fn test_short_buffer_is_dropped() {
    let mut registry = headless_registry();
    let (id, input, output) = nv12_stream(&mut registry);
    input.push(InputBuffer::new(vec![0; 100]));
    assert_eq!(registry.tick().outcome(id), Some(StreamTick::Dropped));
    assert!(!registry.is_frame_pending(id));
    assert_eq!(output.frame_count(), 0);
}

struct OnGpu;
impl GpuNativeFrame for OnGpu {
    fn plane_at(&self, index: usize) -> Option<PlaneTexture> {
        (index == 0).then_some(PlaneTexture { id: TextureId(99), target: TextureTarget::Texture2D })
    }
}

#[test]
fn test_gpu_native_frames_are_forwarded() {
    let mut registry = headless_registry();
    let input = MemoryInput::new();
    let output = MemoryOutput::new();
    // Forwarding does not even need a configured stream
    let id = registry.add(input.clone(), output.clone());
    input.push(InputBuffer::gpu_native(OnGpu));

    assert_eq!(registry.tick().outcome(id), Some(StreamTick::Forwarded));
    assert!(!registry.is_frame_pending(id));
    let forwarded = output.take_forwarded();
    assert_eq!(forwarded.len(), 1);
    match &forwarded[0].payload {
        FramePayload::GpuNative(frame) => assert_eq!(frame.plane_at(0).map(|p| p.id), Some(TextureId(99))),
        other => panic!("unexpected {other:?}"),
    }
}

struct SplitPlanes {
    luma: Vec<u8>,
    chroma: Vec<u8>,
}
impl CopyToBuffer for SplitPlanes {
    fn copy_to(&self, dst: &mut Vec<u8>) -> Result<(), GpuPushError> {
        dst.extend_from_slice(&self.luma);
        dst.extend_from_slice(&self.chroma);
        Ok(())
    }
}

#[test]
fn test_external_frames_are_materialized() {
    let mut registry = headless_registry();
    let (id, input, output) = nv12_stream(&mut registry);
    input.push(InputBuffer::external(SplitPlanes { luma: vec![5; 3072], chroma: vec![6; 1536] }));

    assert_eq!(registry.tick().outcome(id), Some(StreamTick::Emitted));
    let frames = output.take_frames();
    let gpu = registry.gpu().unwrap();
    let chroma = frames[0].plane_at(1).unwrap();
    assert_eq!(gpu.checksum(chroma.id), Some(crc32fast::hash(&[6; 1536])));
}

#[test]
fn test_end_of_stream_is_propagated() {
    let mut registry = headless_registry();
    let (id, input, output) = nv12_stream(&mut registry);
    input.push(InputBuffer::new(frame_bytes("nv12", 64, 48, 0)));
    input.set_eos();

    assert_eq!(registry.tick().outcome(id), Some(StreamTick::Emitted));
    assert!(!output.is_eos());
    // Pending frame holds the stream even at end of stream
    assert_eq!(registry.tick().outcome(id), Some(StreamTick::Blocked));
    drop(output.take_frames());
    assert_eq!(registry.tick().outcome(id), Some(StreamTick::EndOfStream));
    assert!(output.is_eos());
}

#[test]
fn test_idle_stream_without_input() {
    let mut registry = headless_registry();
    let (id, _input, output) = nv12_stream(&mut registry);
    assert_eq!(registry.tick().outcome(id), Some(StreamTick::Idle));
    assert!(!output.is_eos());
}

#[test]
fn test_output_properties_have_no_strides() {
    let mut registry = headless_registry();
    let output = MemoryOutput::new();
    let id = registry.add(MemoryInput::new(), output.clone());
    let props = StreamProperties::new(64, 48, "yuv420").with_strides(Some(64), Some(32));
    registry.configure(id, &props).unwrap();
    let out = output.properties().unwrap();
    assert_eq!((out.width, out.height), (Some(64), Some(48)));
    assert_eq!((out.stride, out.chroma_stride), (None, None));
    assert_eq!(registry.planes(id).unwrap().len(), 3);
}

#[test]
fn test_streams_are_independent() {
    let mut registry = headless_registry();
    let (a, input_a, output_a) = nv12_stream(&mut registry);
    let (b, input_b, output_b) = nv12_stream(&mut registry);
    input_a.push(InputBuffer::new(frame_bytes("nv12", 64, 48, 0)));
    input_a.push(InputBuffer::new(frame_bytes("nv12", 64, 48, 0)));
    input_b.push(InputBuffer::new(frame_bytes("nv12", 64, 48, 0)));
    input_b.push(InputBuffer::new(frame_bytes("nv12", 64, 48, 0)));

    assert_eq!(registry.tick().emitted(), 2);
    let ids_a = registry.texture_ids(a).unwrap();
    let ids_b = registry.texture_ids(b).unwrap();
    assert!(ids_a.iter().all(|t| !ids_b.contains(t)));

    // Releasing only stream b lets only stream b go on
    drop(output_b.take_frames());
    let report = registry.tick();
    assert_eq!(report.outcome(a), Some(StreamTick::Blocked));
    assert_eq!(report.outcome(b), Some(StreamTick::Emitted));
    drop(output_a.take_frames());
    drop(output_b.take_frames());
}
