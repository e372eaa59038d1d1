use thiserror::Error;

use crate::{BindingClass, DeviceError, HandleClass, DEFAULT_POOL_CAPACITY};

mod builder;
mod layout;

pub use builder::*;
pub use layout::*;

/// Array size used for unbounded arrays.
pub const DEFAULT_RUNTIME_ARRAY_SIZE: u32 = 2048;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("binding {layout} declared as {existing:?} and {incoming:?}")]
    ConflictingBinding {
        layout: u32,
        existing: BindingClass,
        incoming: BindingClass,
    },

    #[error("push constant blocks disagree in size: {first} and {second} bytes")]
    PushConstantMismatch { first: u32, second: u32 },

    #[error("push constant binding {layout} is {byte_size} bytes")]
    PushConstantTooLarge { layout: u32, byte_size: u64 },

    #[error("{class:?} descriptors of one layout copy exceed u32::MAX at binding {layout}")]
    DescriptorCountOverflow { class: HandleClass, layout: u32 },

    #[error("device error: {0}")]
    Device(#[from] DeviceError),
}

#[derive(Debug, Clone)]
pub struct PipelineLayoutDesc {
    /// Slots per descriptor pool. Layouts with unbounded arrays always use 1.
    pub pool_capacity: u32,
    /// Descriptor count reserved for each unbounded array.
    pub runtime_array_size: u32,
    /// Reserve two vertex shader root constants for base vertex and base instance.
    pub base_vertex_instance: bool,
}

impl Default for PipelineLayoutDesc {
    fn default() -> Self {
        Self {
            pool_capacity: DEFAULT_POOL_CAPACITY,
            runtime_array_size: DEFAULT_RUNTIME_ARRAY_SIZE,
            base_vertex_instance: false,
        }
    }
}
