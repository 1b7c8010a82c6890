// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use crate::gpu::GpuContext;
use crate::staging::StagingPool;
use crate::stream::{ FramePayload, InputBuffer };
use crate::texture_set::TextureSet;
use crate::types::*;

/// Copies input frames into a stream's textures.
#[derive(Debug)]
pub struct FrameUploader {
    staging: StagingPool,
}

impl Default for FrameUploader {
    fn default() -> Self { Self::new() }
}

impl FrameUploader {
    pub fn new() -> Self {
        // A single frame is in flight per stream, so one idle staging buffer is enough.
        Self { staging: StagingPool::new(1) }
    }

    pub fn staging(&self) -> &StagingPool { &self.staging }

    /// Uploads a CPU-resident frame. GPU-native frames have no bytes to read and are
    /// forwarded by the registry instead.
    pub fn upload<C: GpuContext + ?Sized>(&self, gpu: &mut C, buffer: &InputBuffer, textures: &TextureSet) -> Result<(), GpuPushError> {
        match &buffer.payload {
            FramePayload::GpuNative(_) => Err(GpuPushError::Materialize("frame is already GPU-resident".into())),
            FramePayload::Contiguous(data) => upload_planes(gpu, data, textures),
            FramePayload::External(source) => {
                let mut stage = self.staging.get();
                source.copy_to(&mut stage)?;
                upload_planes(gpu, &stage, textures)
            }
        }
    }
}

/// Uploads each plane window of `data` into its texture, allocating textures on first use.
pub fn upload_planes<C: GpuContext + ?Sized>(gpu: &mut C, data: &[u8], textures: &TextureSet) -> Result<(), GpuPushError> {
    let planes = textures.planes();
    if let Some((plane, p)) = planes.iter().enumerate().find(|(_, p)| p.byte_end() > data.len()) {
        return Err(GpuPushError::BufferTooSmall { plane, needed: p.byte_end(), available: data.len() });
    }

    let handles = textures.handles();
    let mut handles = handles.write();
    for (index, (slot, plane)) in handles.iter_mut().zip(planes).enumerate() {
        let id = match *slot {
            Some(id) => id,
            None => {
                let id = gpu.create_texture(plane)?;
                log::trace!("Created texture {id:?} for plane {index} ({}x{} {:?})", plane.pixel_width, plane.pixel_height, plane.texture_format);
                *slot = Some(id);
                id
            }
        };
        gpu.upload_plane(id, plane, &data[plane.byte_offset..plane.byte_end()])?;
    }
    Ok(())
}
