// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use super::*;
use std::collections::HashMap;

pub struct WgpuGpu {
    device: wgpu::Device,
    queue: wgpu::Queue,
    textures: HashMap<TextureId, wgpu::Texture>,
    next_id: u64,
}

fn texture_format(format: TextureFormat) -> Option<wgpu::TextureFormat> {
    match format {
        TextureFormat::Luminance      => Some(wgpu::TextureFormat::R8Unorm),
        TextureFormat::LuminanceAlpha => Some(wgpu::TextureFormat::Rg8Unorm),
        TextureFormat::Rgba           => Some(wgpu::TextureFormat::Rgba8Unorm),
        TextureFormat::Rgb            => None, // no 24-bit texture format in wgpu
    }
}

impl WgpuGpu {
    pub fn new(options: &PushOptions) -> Result<Self, GpuPushError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let power_preference = match options.power_preference() {
            Some("low") | Some("low_power") => wgpu::PowerPreference::LowPower,
            Some("none") => wgpu::PowerPreference::None,
            _ => wgpu::PowerPreference::HighPerformance,
        };

        let adapter = match options.gpu_index() {
            Some(index) => instance.enumerate_adapters(wgpu::Backends::all())
                .into_iter()
                .nth(index)
                .ok_or_else(|| GpuPushError::ResourceAllocationFailure(format!("no GPU adapter at index {index}")))?,
            None => pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                force_fallback_adapter: false,
                compatible_surface: None,
            })).map_err(|e| GpuPushError::ResourceAllocationFailure(e.to_string()))?,
        };
        log::debug!("{}: using adapter {:?}", options.label(), adapter.get_info());

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some(options.label()),
            ..Default::default()
        })).map_err(|e| GpuPushError::ResourceAllocationFailure(e.to_string()))?;

        Ok(Self { device, queue, textures: HashMap::new(), next_id: 1 })
    }

    pub fn device(&self) -> &wgpu::Device { &self.device }
    pub fn queue(&self) -> &wgpu::Queue { &self.queue }
    pub fn texture(&self, id: TextureId) -> Option<&wgpu::Texture> { self.textures.get(&id) }
}

impl GpuContext for WgpuGpu {
    fn create_texture(&mut self, plane: &PlaneDescriptor) -> Result<TextureId, GpuPushError> {
        let format = texture_format(plane.texture_format)
            .ok_or_else(|| GpuPushError::ResourceAllocationFailure(format!("{:?} textures are not supported by wgpu", plane.texture_format)))?;
        if plane.pixel_width == 0 || plane.pixel_height == 0 {
            return Err(GpuPushError::ResourceAllocationFailure("empty texture".into()));
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("gpu_push plane"),
            size: wgpu::Extent3d {
                width: plane.pixel_width,
                height: plane.pixel_height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(GpuPushError::ResourceAllocationFailure(err.to_string()));
        }

        let id = TextureId(self.next_id);
        self.next_id += 1;
        self.textures.insert(id, texture);
        Ok(id)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if let Some(tex) = self.textures.remove(&texture) {
            tex.destroy();
        }
    }

    fn upload_plane(&mut self, texture: TextureId, plane: &PlaneDescriptor, data: &[u8]) -> Result<(), GpuPushError> {
        let Some(tex) = self.textures.get(&texture) else {
            return Err(GpuPushError::ResourceAllocationFailure(format!("texture {texture:?} does not exist")));
        };
        let bytes_per_row = u32::try_from(plane.row_stride)
            .map_err(|_| GpuPushError::ResourceAllocationFailure(format!("row stride {} exceeds the upload limit", plane.row_stride)))?;
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: tex,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(plane.pixel_height),
            },
            wgpu::Extent3d {
                width: plane.pixel_width,
                height: plane.pixel_height,
                depth_or_array_layers: 1,
            },
        );
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(GpuPushError::ResourceAllocationFailure(err.to_string()));
        }
        Ok(())
    }
}
