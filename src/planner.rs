// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use crate::types::*;

/// One plane of a packed input buffer and the texture it is uploaded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneDescriptor {
    pub byte_offset: usize,
    pub byte_size: usize,
    /// Bytes between the starts of two rows of this plane in the input buffer.
    pub row_stride: usize,
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub texture_format: TextureFormat,
}

impl PlaneDescriptor {
    pub fn byte_end(&self) -> usize {
        self.byte_offset + self.byte_size
    }

    /// Same texture shape, regardless of where the plane sits in the buffer.
    pub fn same_texture(&self, other: &PlaneDescriptor) -> bool {
        self.pixel_width == other.pixel_width
            && self.pixel_height == other.pixel_height
            && self.texture_format == other.texture_format
    }
}

/// Packed-buffer footprint of a layout.
pub fn total_size(planes: &[PlaneDescriptor]) -> usize {
    planes.iter().map(PlaneDescriptor::byte_end).max().unwrap_or(0)
}

/// Derives the plane layout of a frame from its pixel format tag.
///
/// `stride` defaults to `width`, `chroma_stride` (planar 4:2:0 only) to `stride / 2`.
pub fn plan(tag: &str, width: u32, height: u32, stride: Option<u32>, chroma_stride: Option<u32>) -> Result<Vec<PlaneDescriptor>, GpuPushError> {
    let format: PixelFormat = tag.parse()?;
    plan_format(format, width, height, stride, chroma_stride)
}

/// Fails with [`GpuPushError::GeometryOverflow`] when a plane would not be addressable.
pub fn plan_format(format: PixelFormat, width: u32, height: u32, stride: Option<u32>, chroma_stride: Option<u32>) -> Result<Vec<PlaneDescriptor>, GpuPushError> {
    let overflow = || GpuPushError::GeometryOverflow { width, height };
    let family = format.family();
    let stride = stride.unwrap_or(width) as usize;
    let rows = height as usize;
    let luma_size = stride.checked_mul(rows).ok_or_else(overflow)?;

    let luma = PlaneDescriptor {
        byte_offset: 0,
        byte_size: luma_size,
        row_stride: stride,
        pixel_width: width,
        pixel_height: height,
        texture_format: family.texture_format(0),
    };

    let planes = match family {
        FormatFamily::SemiPlanar420 => {
            luma_size.checked_add(luma_size / 2).ok_or_else(overflow)?;
            let chroma = PlaneDescriptor {
                byte_offset: luma_size,
                byte_size: luma_size / 2,
                row_stride: stride,
                pixel_width: width / 2,
                pixel_height: height / 2,
                texture_format: family.texture_format(1),
            };
            vec![luma, chroma]
        }
        FormatFamily::Planar420 => {
            let chroma_stride = chroma_stride.map(|s| s as usize).unwrap_or(stride / 2);
            let chroma_size = chroma_stride.checked_mul(rows).ok_or_else(overflow)? / 2;
            let second_offset = luma_size.checked_add(chroma_size).ok_or_else(overflow)?;
            second_offset.checked_add(chroma_size).ok_or_else(overflow)?;
            let first = PlaneDescriptor {
                byte_offset: luma_size,
                byte_size: chroma_size,
                row_stride: chroma_stride,
                pixel_width: width / 2,
                pixel_height: height / 2,
                texture_format: family.texture_format(1),
            };
            let second = PlaneDescriptor {
                byte_offset: second_offset,
                ..first
            };
            vec![luma, first, second]
        }
        FormatFamily::Packed4 | FormatFamily::Packed3 | FormatFamily::LumaAlpha | FormatFamily::Grey => {
            let bpp = family.packed_bytes_per_pixel().unwrap_or(1) as usize;
            vec![PlaneDescriptor {
                byte_size: luma_size.checked_mul(bpp).ok_or_else(overflow)?,
                row_stride: stride.checked_mul(bpp).ok_or_else(overflow)?,
                ..luma
            }]
        }
    };
    Ok(planes)
}
