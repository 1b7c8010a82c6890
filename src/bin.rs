// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use gpu_push::*;
use std::io::Write;

fn synthetic_frame(planes: &[PlaneDescriptor], index: usize) -> Vec<u8> {
    let mut data = vec![0u8; total_size(planes)];
    for (i, byte) in data.iter_mut().enumerate() {
        *byte = ((i + index * 7) % 251) as u8;
    }
    data
}

fn main() {
    let _time = std::time::Instant::now();

    let _ = simple_log::new(simple_log::LogConfig::default());

    let mut args = std::env::args().skip(1);
    let format = args.next().unwrap_or_else(|| "nv12".into());
    let width: u32 = args.next().and_then(|v| v.parse().ok()).unwrap_or(1280);
    let height: u32 = args.next().and_then(|v| v.parse().ok()).unwrap_or(720);
    let frame_count: usize = args.next().and_then(|v| v.parse().ok()).unwrap_or(30);

    let planes = match plan(&format, width, height, None, None) {
        Ok(planes) => planes,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    for (i, p) in planes.iter().enumerate() {
        println!("plane {i}: offset {} size {} {}x{} {:?}", p.byte_offset, p.byte_size, p.pixel_width, p.pixel_height, p.texture_format);
    }

    let mut options = PushOptions::default();
    options.custom_options.insert("backend".into(), "headless".into());
    let mut registry = StreamRegistry::new(options);

    let input = MemoryInput::new();
    let output = MemoryOutput::new();
    for i in 0..frame_count {
        input.push(InputBuffer::new(synthetic_frame(&planes, i)).with_timestamp(i as i64 * 40_000));
    }
    input.set_eos();

    let id = registry.add(input.clone(), output.clone());
    if let Err(e) = registry.configure(id, &StreamProperties::new(width, height, &format)) {
        eprintln!("{e}");
        std::process::exit(1);
    }

    let mut emitted = 0;
    loop {
        let report = registry.tick();
        emitted += report.emitted();
        // Play the consumer: sample the planes, then hand the textures back
        for frame in output.take_frames() {
            let textures: Vec<_> = (0..frame.plane_count()).filter_map(|i| frame.plane_at(i)).collect();
            println!("Frame at {:?}: {}x{} {} -> {:?}", frame.timestamp_us(), frame.width(), frame.height(), frame.format(), textures);
            frame.release();
        }
        if report.outcome(id) == Some(StreamTick::EndOfStream) {
            break;
        }
    }

    if let Some(gpu) = registry.gpu().and_then(GpuBackend::as_headless) {
        println!("{emitted} frames, {} textures created, {} uploads", gpu.created_count(), gpu.upload_count());
    }
    println!("Done in {:.3}s ", _time.elapsed().as_millis() as f64 / 1000.0);
    let _ = std::io::stdout().flush();
}
