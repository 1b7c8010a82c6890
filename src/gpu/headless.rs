// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use super::*;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct HeadlessTexture {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub data: Vec<u8>,
}

/// Texture store kept in CPU memory. Used when no GPU is wanted (tests, tooling), it
/// mirrors the handle lifecycle of a real device.
#[derive(Debug, Default)]
pub struct HeadlessGpu {
    textures: HashMap<TextureId, HeadlessTexture>,
    next_id: u64,
    texture_limit: Option<usize>,
    created: usize,
    destroyed: usize,
    uploads: usize,
}

impl HeadlessGpu {
    pub fn new() -> Self {
        Self { next_id: 1, ..Default::default() }
    }

    /// Refuses to allocate more than `limit` live textures at once.
    pub fn with_texture_limit(limit: usize) -> Self {
        Self { texture_limit: Some(limit), ..Self::new() }
    }

    pub fn set_texture_limit(&mut self, limit: Option<usize>) {
        self.texture_limit = limit;
    }

    pub fn texture(&self, id: TextureId) -> Option<&HeadlessTexture> { self.textures.get(&id) }
    pub fn texture_data(&self, id: TextureId) -> Option<&[u8]> { self.textures.get(&id).map(|t| t.data.as_slice()) }
    pub fn checksum(&self, id: TextureId) -> Option<u32> { self.texture_data(id).map(crc32fast::hash) }

    pub fn live_textures(&self) -> usize { self.textures.len() }
    pub fn created_count(&self) -> usize { self.created }
    pub fn destroyed_count(&self) -> usize { self.destroyed }
    pub fn upload_count(&self) -> usize { self.uploads }
}

impl GpuContext for HeadlessGpu {
    fn create_texture(&mut self, plane: &PlaneDescriptor) -> Result<TextureId, GpuPushError> {
        if let Some(limit) = self.texture_limit {
            if self.textures.len() >= limit {
                return Err(GpuPushError::ResourceAllocationFailure(format!("texture limit of {limit} reached")));
            }
        }
        let id = TextureId(self.next_id);
        self.next_id += 1;
        self.created += 1;
        self.textures.insert(id, HeadlessTexture {
            width: plane.pixel_width,
            height: plane.pixel_height,
            format: plane.texture_format,
            data: Vec::new(),
        });
        Ok(id)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture).is_some() {
            self.destroyed += 1;
        } else {
            log::warn!("Destroying unknown texture {texture:?}");
        }
    }

    fn upload_plane(&mut self, texture: TextureId, plane: &PlaneDescriptor, data: &[u8]) -> Result<(), GpuPushError> {
        let Some(tex) = self.textures.get_mut(&texture) else {
            return Err(GpuPushError::ResourceAllocationFailure(format!("texture {texture:?} does not exist")));
        };
        tex.width = plane.pixel_width;
        tex.height = plane.pixel_height;
        tex.format = plane.texture_format;
        tex.data.clear();
        tex.data.extend_from_slice(data);
        self.uploads += 1;
        Ok(())
    }
}
