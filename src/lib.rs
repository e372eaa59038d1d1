//! Translates reflected shader bindings into a root signature and descriptor heap layout,
//! and pools per-draw copies of those heaps.

mod binding;
mod descriptor;
mod device;
mod host;
mod merge;
mod pipeline;
mod root_signature;

#[cfg(all(windows, feature = "dx12"))]
pub mod dx12;

pub use binding::*;
pub use descriptor::*;
pub use device::*;
pub use host::*;
pub use merge::*;
pub use pipeline::*;
pub use root_signature::*;
