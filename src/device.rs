use thiserror::Error;

use crate::{HandleClass, RootSignatureDesc};

/// CPU-visible descriptor handle. Descriptors are written through this address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CpuDescriptorHandle(pub usize);

/// GPU-visible descriptor handle, as consumed by descriptor table bindings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuDescriptorHandle(pub u64);

impl CpuDescriptorHandle {
    pub fn offset(self, bytes: u64) -> Self {
        Self(self.0 + bytes as usize)
    }
}
impl GpuDescriptorHandle {
    pub fn offset(self, bytes: u64) -> Self {
        Self(self.0 + bytes)
    }
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("{class:?} heap of {requested} descriptors exceeds the device limit of {limit}")]
    CapacityExceeded {
        class: HandleClass,
        requested: u32,
        limit: u32,
    },

    #[error("root signature costs {cost} DWORDs, the limit is {limit}")]
    RootSignatureTooLarge { cost: u32, limit: u32 },

    #[error("invalid root signature: {0}")]
    InvalidRootSignature(String),

    #[error("out of device memory")]
    OutOfMemory,

    #[cfg(all(windows, feature = "dx12"))]
    #[error("native error: {0}")]
    Native(#[from] windows::core::Error),
}

/// A shader-visible descriptor heap created by a [`DescriptorDevice`].
///
/// Dropping the heap releases the native object.
pub trait DescriptorHeap: Send + Sync + 'static {
    fn class(&self) -> HandleClass;
    fn descriptor_count(&self) -> u32;
    fn cpu_start(&self) -> CpuDescriptorHandle;
    fn gpu_start(&self) -> GpuDescriptorHandle;
}

/// The native object factory pipeline layouts are built against.
///
/// Implementations are expected to be cheap to clone, sharing the underlying device.
pub trait DescriptorDevice: Clone + Send + Sync + 'static {
    type Heap: DescriptorHeap;
    type RootSignature: Send + Sync + 'static;

    /// Size in bytes of one descriptor of the given class.
    fn descriptor_stride(&self, class: HandleClass) -> u32;

    fn create_descriptor_heap(
        &self,
        class: HandleClass,
        descriptor_count: u32,
    ) -> Result<Self::Heap, DeviceError>;

    fn create_root_signature(
        &self,
        desc: &RootSignatureDesc,
    ) -> Result<Self::RootSignature, DeviceError>;
}

pub trait HasDevice<D: DescriptorDevice> {
    fn device(&self) -> &D;
}

/// Descriptor strides of a device, captured once per pipeline layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorStrides {
    pub resource: u32,
    pub sampler: u32,
}

impl DescriptorStrides {
    pub fn of(device: &impl DescriptorDevice) -> Self {
        Self {
            resource: device.descriptor_stride(HandleClass::Resource),
            sampler: device.descriptor_stride(HandleClass::Sampler),
        }
    }
    pub fn get(&self, class: HandleClass) -> u32 {
        match class {
            HandleClass::Resource => self.resource,
            HandleClass::Sampler => self.sampler,
        }
    }
}
