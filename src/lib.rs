// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

mod types;
mod planner;
mod gpu;
mod staging;
mod texture_set;
mod uploader;
mod handoff;
mod stream;
mod registry;
pub use types::*;
pub use planner::*;
pub use gpu::*;
pub use staging::*;
pub use texture_set::*;
pub use uploader::*;
pub use handoff::*;
pub use stream::*;
pub use registry::*;
