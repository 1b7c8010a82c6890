// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

mod headless; pub use headless::*;
#[cfg(feature = "wgpu")] mod wgpu_backend; #[cfg(feature = "wgpu")] pub use wgpu_backend::*;

use crate::planner::PlaneDescriptor;
use crate::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureTarget {
    Texture2D,
}

/// What the plane accessor of an outgoing frame hands to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneTexture {
    pub id: TextureId,
    pub target: TextureTarget,
}

#[enum_dispatch::enum_dispatch(GpuBackend)]
pub trait GpuContext {
    fn create_texture(&mut self, plane: &PlaneDescriptor) -> Result<TextureId, GpuPushError>;
    fn destroy_texture(&mut self, texture: TextureId);
    /// Binds `texture` and replaces its whole content with `data`, laid out as described by `plane`.
    fn upload_plane(&mut self, texture: TextureId, plane: &PlaneDescriptor, data: &[u8]) -> Result<(), GpuPushError>;
}

#[enum_dispatch::enum_dispatch]
pub enum GpuBackend {
    Headless(HeadlessGpu),
    #[cfg(feature = "wgpu")]
    Wgpu(WgpuGpu),
}

impl GpuBackend {
    pub fn new(options: &PushOptions) -> Result<Self, GpuPushError> {
        #[cfg(feature = "wgpu")]
        if select_custom_option(&options.custom_options, &["backend"]) != Some("headless") {
            return Ok(GpuBackend::Wgpu(WgpuGpu::new(options)?));
        }
        log::debug!("{}: using headless GPU backend", options.label());
        Ok(GpuBackend::Headless(HeadlessGpu::new()))
    }

    pub fn as_headless(&self) -> Option<&HeadlessGpu> {
        match self {
            GpuBackend::Headless(h) => Some(h),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }
}

type ContextFactory<C> = Box<dyn FnMut() -> Result<C, GpuPushError>>;

/// One-shot graphics context initializer. Creation is deferred until the first call to
/// [`LazyGpu::get_or_init`]; a failed creation is attempted again on the next call.
pub struct LazyGpu<C> {
    factory: ContextFactory<C>,
    context: Option<C>,
}

impl<C> LazyGpu<C> {
    pub fn new<F: FnMut() -> Result<C, GpuPushError> + 'static>(factory: F) -> Self {
        Self { factory: Box::new(factory), context: None }
    }

    pub fn get_or_init(&mut self) -> Result<&mut C, GpuPushError> {
        if self.context.is_none() {
            let context = (self.factory)()?;
            log::debug!("GPU context created");
            self.context = Some(context);
        }
        self.context.as_mut().ok_or(GpuPushError::ContextUnavailable)
    }

    pub fn get(&self) -> Option<&C> { self.context.as_ref() }
    pub fn get_mut(&mut self) -> Option<&mut C> { self.context.as_mut() }
    pub fn is_initialized(&self) -> bool { self.context.is_some() }
}
