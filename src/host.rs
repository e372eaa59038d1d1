//! Descriptor device backed by host memory.
//!
//! Heaps are plain allocations and GPU handles come from a bump allocated virtual address
//! range. Limits mirror a resource binding tier 2 D3D12 device, so layouts validated here
//! behave the same on native devices.
use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};

use crate::{
    CpuDescriptorHandle, DescriptorDevice, DescriptorHeap, DeviceError, GpuDescriptorHandle,
    HandleClass, RootSignatureDesc, MAX_ROOT_SIGNATURE_COST,
};

const GPU_ADDRESS_BASE: u64 = 1 << 32;
const GPU_ADDRESS_ALIGNMENT: u64 = 64 * 1024;

#[derive(Debug, Clone)]
pub struct HostDeviceDesc {
    pub resource_stride: u32,
    pub sampler_stride: u32,
    pub max_resource_descriptors: u32,
    pub max_sampler_descriptors: u32,
}

impl Default for HostDeviceDesc {
    fn default() -> Self {
        Self {
            resource_stride: 32,
            sampler_stride: 16,
            max_resource_descriptors: 1_000_000,
            max_sampler_descriptors: 2048,
        }
    }
}

#[derive(Clone)]
pub struct HostDevice(Arc<HostDeviceInner>);

struct HostDeviceInner {
    desc: HostDeviceDesc,
    next_gpu_address: AtomicU64,
    live_heaps: AtomicUsize,
    live_root_signatures: AtomicUsize,
}

impl HostDevice {
    pub fn new(desc: HostDeviceDesc) -> Self {
        Self(Arc::new(HostDeviceInner {
            desc,
            next_gpu_address: AtomicU64::new(GPU_ADDRESS_BASE),
            live_heaps: AtomicUsize::new(0),
            live_root_signatures: AtomicUsize::new(0),
        }))
    }
    pub fn desc(&self) -> &HostDeviceDesc {
        &self.0.desc
    }
    /// Number of heaps created by this device that haven't been dropped.
    pub fn live_heaps(&self) -> usize {
        self.0.live_heaps.load(Ordering::Acquire)
    }
    pub fn live_root_signatures(&self) -> usize {
        self.0.live_root_signatures.load(Ordering::Acquire)
    }
    fn max_descriptors(&self, class: HandleClass) -> u32 {
        match class {
            HandleClass::Resource => self.0.desc.max_resource_descriptors,
            HandleClass::Sampler => self.0.desc.max_sampler_descriptors,
        }
    }
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new(HostDeviceDesc::default())
    }
}

pub struct HostDescriptorHeap {
    device: Arc<HostDeviceInner>,
    class: HandleClass,
    descriptor_count: u32,
    memory: Box<[u8]>,
    gpu_start: u64,
}

impl HostDescriptorHeap {
    pub fn as_bytes(&self) -> &[u8] {
        &self.memory
    }
}

impl DescriptorHeap for HostDescriptorHeap {
    fn class(&self) -> HandleClass {
        self.class
    }
    fn descriptor_count(&self) -> u32 {
        self.descriptor_count
    }
    fn cpu_start(&self) -> CpuDescriptorHandle {
        CpuDescriptorHandle(self.memory.as_ptr() as usize)
    }
    fn gpu_start(&self) -> GpuDescriptorHandle {
        GpuDescriptorHandle(self.gpu_start)
    }
}

impl Drop for HostDescriptorHeap {
    fn drop(&mut self) {
        tracing::trace!(class = ?self.class, descriptor_count = self.descriptor_count, "drop descriptor heap");
        self.device.live_heaps.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Validated copy of a root signature description.
pub struct HostRootSignature {
    device: Arc<HostDeviceInner>,
    desc: RootSignatureDesc,
}

impl HostRootSignature {
    pub fn desc(&self) -> &RootSignatureDesc {
        &self.desc
    }
}

impl Drop for HostRootSignature {
    fn drop(&mut self) {
        self.device
            .live_root_signatures
            .fetch_sub(1, Ordering::AcqRel);
    }
}

impl DescriptorDevice for HostDevice {
    type Heap = HostDescriptorHeap;
    type RootSignature = HostRootSignature;

    fn descriptor_stride(&self, class: HandleClass) -> u32 {
        match class {
            HandleClass::Resource => self.0.desc.resource_stride,
            HandleClass::Sampler => self.0.desc.sampler_stride,
        }
    }

    fn create_descriptor_heap(
        &self,
        class: HandleClass,
        descriptor_count: u32,
    ) -> Result<Self::Heap, DeviceError> {
        let limit = self.max_descriptors(class);
        if descriptor_count > limit {
            return Err(DeviceError::CapacityExceeded {
                class,
                requested: descriptor_count,
                limit,
            });
        }
        let size = descriptor_count as u64 * self.descriptor_stride(class) as u64;
        let size = usize::try_from(size).map_err(|_| DeviceError::OutOfMemory)?;
        let gpu_start = self.0.next_gpu_address.fetch_add(
            (size as u64).next_multiple_of(GPU_ADDRESS_ALIGNMENT),
            Ordering::Relaxed,
        );
        self.0.live_heaps.fetch_add(1, Ordering::AcqRel);
        tracing::trace!(?class, descriptor_count, gpu_start, "create descriptor heap");
        Ok(HostDescriptorHeap {
            device: self.0.clone(),
            class,
            descriptor_count,
            memory: vec![0; size].into_boxed_slice(),
            gpu_start,
        })
    }

    fn create_root_signature(
        &self,
        desc: &RootSignatureDesc,
    ) -> Result<Self::RootSignature, DeviceError> {
        let cost = desc.cost();
        if cost > MAX_ROOT_SIGNATURE_COST {
            return Err(DeviceError::RootSignatureTooLarge {
                cost,
                limit: MAX_ROOT_SIGNATURE_COST,
            });
        }
        desc.validate().map_err(DeviceError::InvalidRootSignature)?;
        self.0.live_root_signatures.fetch_add(1, Ordering::AcqRel);
        Ok(HostRootSignature {
            device: self.0.clone(),
            desc: desc.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DescriptorRange, RangeType, RootParameter, ShaderVisibility};

    #[test]
    fn test_heap_limits() {
        let device = HostDevice::default();
        let heap = device
            .create_descriptor_heap(HandleClass::Sampler, 2048)
            .unwrap();
        assert_eq!(heap.as_bytes().len(), 2048 * 16);
        assert_eq!(heap.gpu_start().0 % GPU_ADDRESS_ALIGNMENT, 0);
        assert_eq!(device.live_heaps(), 1);
        assert!(matches!(
            device.create_descriptor_heap(HandleClass::Sampler, 2049),
            Err(DeviceError::CapacityExceeded {
                class: HandleClass::Sampler,
                requested: 2049,
                limit: 2048
            })
        ));
        drop(heap);
        assert_eq!(device.live_heaps(), 0);
    }

    #[test]
    fn test_heaps_do_not_alias() {
        let device = HostDevice::default();
        let a = device
            .create_descriptor_heap(HandleClass::Resource, 10)
            .unwrap();
        let b = device
            .create_descriptor_heap(HandleClass::Resource, 10)
            .unwrap();
        assert!(b.gpu_start().0 >= a.gpu_start().0 + 10 * 32);
        assert_ne!(a.cpu_start(), b.cpu_start());
    }

    #[test]
    fn test_root_signature_validation() {
        let device = HostDevice::default();
        let mixed = RootSignatureDesc {
            parameters: vec![RootParameter::DescriptorTable {
                visibility: ShaderVisibility::All,
                ranges: vec![
                    DescriptorRange {
                        range_type: RangeType::Srv,
                        num_descriptors: 1,
                        base_shader_register: 0,
                        register_space: 0,
                        offset_in_table: crate::DESCRIPTOR_RANGE_OFFSET_APPEND,
                    },
                    DescriptorRange {
                        range_type: RangeType::Sampler,
                        num_descriptors: 1,
                        base_shader_register: 0,
                        register_space: 0,
                        offset_in_table: crate::DESCRIPTOR_RANGE_OFFSET_APPEND,
                    },
                ],
            }],
            allow_input_assembler_input_layout: true,
        };
        assert!(matches!(
            device.create_root_signature(&mixed),
            Err(DeviceError::InvalidRootSignature(_))
        ));

        let too_large = RootSignatureDesc {
            parameters: vec![RootParameter::Constants {
                visibility: ShaderVisibility::All,
                shader_register: 0,
                register_space: 0,
                num_values: 65,
            }],
            allow_input_assembler_input_layout: false,
        };
        assert!(matches!(
            device.create_root_signature(&too_large),
            Err(DeviceError::RootSignatureTooLarge {
                cost: 65,
                limit: 64
            })
        ));
        assert_eq!(device.live_root_signatures(), 0);

        let empty = device
            .create_root_signature(&RootSignatureDesc::default())
            .unwrap();
        assert!(empty.desc().parameters.is_empty());
        assert_eq!(device.live_root_signatures(), 1);
    }
}
