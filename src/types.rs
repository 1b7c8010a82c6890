// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    NV12, NV21,
    YUV420, YVU420,
    RGBA, ARGB, ABGR, BGRA,
    XRGB, RGBX, XBGR, BGRX,
    RGB, BGR,
    ALGR, GRAL,
    GREY,
}

/// Layout family of a pixel format. Channel order inside a family never changes the layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatFamily {
    SemiPlanar420,
    Planar420,
    Packed4,
    Packed3,
    LumaAlpha,
    Grey,
}

/// Texture format a plane is uploaded as, by channel count (8 bits per channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Luminance,
    LuminanceAlpha,
    Rgb,
    Rgba,
}

impl TextureFormat {
    pub fn channels(&self) -> u32 {
        match self {
            TextureFormat::Luminance      => 1,
            TextureFormat::LuminanceAlpha => 2,
            TextureFormat::Rgb            => 3,
            TextureFormat::Rgba           => 4,
        }
    }
}

impl PixelFormat {
    pub fn family(&self) -> FormatFamily {
        match self {
            PixelFormat::NV12 | PixelFormat::NV21 => FormatFamily::SemiPlanar420,
            PixelFormat::YUV420 | PixelFormat::YVU420 => FormatFamily::Planar420,
            PixelFormat::RGBA | PixelFormat::ARGB | PixelFormat::ABGR | PixelFormat::BGRA |
            PixelFormat::XRGB | PixelFormat::RGBX | PixelFormat::XBGR | PixelFormat::BGRX => FormatFamily::Packed4,
            PixelFormat::RGB | PixelFormat::BGR => FormatFamily::Packed3,
            PixelFormat::ALGR | PixelFormat::GRAL => FormatFamily::LumaAlpha,
            PixelFormat::GREY => FormatFamily::Grey,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            PixelFormat::NV12   => "nv12",
            PixelFormat::NV21   => "nv21",
            PixelFormat::YUV420 => "yuv420",
            PixelFormat::YVU420 => "yvu420",
            PixelFormat::RGBA   => "rgba",
            PixelFormat::ARGB   => "argb",
            PixelFormat::ABGR   => "abgr",
            PixelFormat::BGRA   => "bgra",
            PixelFormat::XRGB   => "xrgb",
            PixelFormat::RGBX   => "rgbx",
            PixelFormat::XBGR   => "xbgr",
            PixelFormat::BGRX   => "bgrx",
            PixelFormat::RGB    => "rgb",
            PixelFormat::BGR    => "bgr",
            PixelFormat::ALGR   => "algr",
            PixelFormat::GRAL   => "gral",
            PixelFormat::GREY   => "grey",
        }
    }
}

impl FormatFamily {
    pub fn plane_count(&self) -> usize {
        match self {
            FormatFamily::SemiPlanar420 => 2,
            FormatFamily::Planar420     => 3,
            _ => 1,
        }
    }

    /// Bytes per pixel of the single plane of a packed family.
    pub fn packed_bytes_per_pixel(&self) -> Option<u32> {
        match self {
            FormatFamily::Packed4   => Some(4),
            FormatFamily::Packed3   => Some(3),
            FormatFamily::LumaAlpha => Some(2),
            FormatFamily::Grey      => Some(1),
            FormatFamily::SemiPlanar420 | FormatFamily::Planar420 => None,
        }
    }

    pub fn texture_format(&self, plane: usize) -> TextureFormat {
        match (self, plane) {
            (FormatFamily::SemiPlanar420, 1) => TextureFormat::LuminanceAlpha,
            (FormatFamily::SemiPlanar420, _) |
            (FormatFamily::Planar420, _)     |
            (FormatFamily::Grey, _)          => TextureFormat::Luminance,
            (FormatFamily::Packed4, _)       => TextureFormat::Rgba,
            (FormatFamily::Packed3, _)       => TextureFormat::Rgb,
            (FormatFamily::LumaAlpha, _)     => TextureFormat::LuminanceAlpha,
        }
    }
}

impl FromStr for PixelFormat {
    type Err = GpuPushError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        Ok(match tag.to_ascii_lowercase().as_str() {
            "nv12" => PixelFormat::NV12,
            "nv21" => PixelFormat::NV21,
            "yuv420" | "yuv420p" | "i420" => PixelFormat::YUV420,
            "yvu420" | "yv12" => PixelFormat::YVU420,
            "rgba" => PixelFormat::RGBA,
            "argb" => PixelFormat::ARGB,
            "abgr" => PixelFormat::ABGR,
            "bgra" => PixelFormat::BGRA,
            "xrgb" => PixelFormat::XRGB,
            "rgbx" => PixelFormat::RGBX,
            "xbgr" => PixelFormat::XBGR,
            "bgrx" => PixelFormat::BGRX,
            "rgb"  => PixelFormat::RGB,
            "bgr"  => PixelFormat::BGR,
            "algr" => PixelFormat::ALGR,
            "gral" => PixelFormat::GRAL,
            "grey" | "gray" | "y8" => PixelFormat::GREY,
            _ => return Err(GpuPushError::UnsupportedFormat(tag.to_string())),
        })
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Geometry and format properties negotiated on a stream. Anything may still be unknown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamProperties {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub pixel_format: Option<String>,
    pub stride: Option<u32>,
    pub chroma_stride: Option<u32>,
    pub extra: HashMap<String, String>,
}

impl StreamProperties {
    pub fn new(width: u32, height: u32, pixel_format: &str) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            pixel_format: Some(pixel_format.to_string()),
            ..Default::default()
        }
    }

    pub fn with_strides(mut self, stride: Option<u32>, chroma_stride: Option<u32>) -> Self {
        self.stride = stride;
        self.chroma_stride = chroma_stride;
        self
    }

    /// Properties for the GPU-resident output side: strides make no sense there.
    pub fn output_properties(&self) -> Self {
        Self {
            stride: None,
            chroma_stride: None,
            ..self.clone()
        }
    }
}

/// Per-frame properties copied from the input buffer onto the emitted frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameProps {
    pub timestamp_us: Option<i64>,
    pub duration_us: Option<i64>,
    pub metadata: HashMap<String, String>,
}

#[derive(Error, Debug)]
pub enum GpuPushError {
    #[error("Unsupported pixel format {0} for GPU upload")]
    UnsupportedFormat(String),
    #[error("GPU resource allocation failed: {0}")]
    ResourceAllocationFailure(String),
    #[error("GPU context is not available")]
    ContextUnavailable,
    #[error("Plane {plane} needs bytes up to {needed} but the buffer holds {available}")]
    BufferTooSmall { plane: usize, needed: usize, available: usize },
    #[error("Unable to copy frame into a contiguous buffer: {0}")]
    Materialize(String),
    #[error("Frame geometry {width}x{height} does not fit in memory")]
    GeometryOverflow { width: u32, height: u32 },
    #[error("Unknown stream {0:?}")]
    UnknownStream(crate::StreamId),
}

pub fn select_custom_option<'a>(options: &'a HashMap<String, String>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| options.get(*key).map(|value| value.as_str()))
}

#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    /// Only metadata is queried (help/doc generation), never touch the GPU.
    pub metadata_only: bool,
    pub label: Option<String>,
    pub custom_options: HashMap<String, String>,
}

impl PushOptions {
    pub fn label(&self) -> &str {
        self.label.as_deref()
            .or_else(|| select_custom_option(&self.custom_options, &["label", "name"]))
            .unwrap_or("gpu_push")
    }

    pub fn gpu_index(&self) -> Option<usize> {
        select_custom_option(&self.custom_options, &["gpu_index", "gpu"]).and_then(|v| v.parse().ok())
    }

    pub fn power_preference(&self) -> Option<&str> {
        select_custom_option(&self.custom_options, &["power_preference", "power"])
    }
}
