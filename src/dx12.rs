//! Descriptor device on top of an `ID3D12Device`.
use windows::Win32::Graphics::{
    Direct3D::ID3DBlob,
    Direct3D12::{self as d3d12, ID3D12DescriptorHeap, ID3D12Device, ID3D12RootSignature},
};

use crate::{
    CpuDescriptorHandle, DescriptorDevice, DescriptorHeap, DeviceError, GpuDescriptorHandle,
    HandleClass, RangeType, RootParameter, RootSignatureDesc, ShaderVisibility,
};

fn heap_type(class: HandleClass) -> d3d12::D3D12_DESCRIPTOR_HEAP_TYPE {
    match class {
        HandleClass::Resource => d3d12::D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV,
        HandleClass::Sampler => d3d12::D3D12_DESCRIPTOR_HEAP_TYPE_SAMPLER,
    }
}

fn range_type(ty: RangeType) -> d3d12::D3D12_DESCRIPTOR_RANGE_TYPE {
    match ty {
        RangeType::Srv => d3d12::D3D12_DESCRIPTOR_RANGE_TYPE_SRV,
        RangeType::Uav => d3d12::D3D12_DESCRIPTOR_RANGE_TYPE_UAV,
        RangeType::Cbv => d3d12::D3D12_DESCRIPTOR_RANGE_TYPE_CBV,
        RangeType::Sampler => d3d12::D3D12_DESCRIPTOR_RANGE_TYPE_SAMPLER,
    }
}

fn shader_visibility(visibility: ShaderVisibility) -> d3d12::D3D12_SHADER_VISIBILITY {
    match visibility {
        ShaderVisibility::All => d3d12::D3D12_SHADER_VISIBILITY_ALL,
        ShaderVisibility::Vertex => d3d12::D3D12_SHADER_VISIBILITY_VERTEX,
        ShaderVisibility::Hull => d3d12::D3D12_SHADER_VISIBILITY_HULL,
        ShaderVisibility::Domain => d3d12::D3D12_SHADER_VISIBILITY_DOMAIN,
        ShaderVisibility::Geometry => d3d12::D3D12_SHADER_VISIBILITY_GEOMETRY,
        ShaderVisibility::Pixel => d3d12::D3D12_SHADER_VISIBILITY_PIXEL,
        ShaderVisibility::Amplification => d3d12::D3D12_SHADER_VISIBILITY_AMPLIFICATION,
        ShaderVisibility::Mesh => d3d12::D3D12_SHADER_VISIBILITY_MESH,
    }
}

unsafe fn blob_bytes(blob: &ID3DBlob) -> &[u8] {
    std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize())
}

#[derive(Clone)]
pub struct Dx12Device {
    device: ID3D12Device,
    resource_stride: u32,
    sampler_stride: u32,
}

// ID3D12Device is free-threaded.
unsafe impl Send for Dx12Device {}
unsafe impl Sync for Dx12Device {}

impl Dx12Device {
    pub fn new(device: ID3D12Device) -> Self {
        let (resource_stride, sampler_stride) = unsafe {
            (
                device.GetDescriptorHandleIncrementSize(heap_type(HandleClass::Resource)),
                device.GetDescriptorHandleIncrementSize(heap_type(HandleClass::Sampler)),
            )
        };
        Self {
            device,
            resource_stride,
            sampler_stride,
        }
    }
    pub fn raw(&self) -> &ID3D12Device {
        &self.device
    }
}

pub struct Dx12DescriptorHeap {
    heap: ID3D12DescriptorHeap,
    class: HandleClass,
    descriptor_count: u32,
    cpu_start: CpuDescriptorHandle,
    gpu_start: GpuDescriptorHandle,
}

// Heap start handles are immutable, and heaps are only written through handles.
unsafe impl Send for Dx12DescriptorHeap {}
unsafe impl Sync for Dx12DescriptorHeap {}

impl Dx12DescriptorHeap {
    pub fn raw(&self) -> &ID3D12DescriptorHeap {
        &self.heap
    }
}

impl DescriptorHeap for Dx12DescriptorHeap {
    fn class(&self) -> HandleClass {
        self.class
    }
    fn descriptor_count(&self) -> u32 {
        self.descriptor_count
    }
    fn cpu_start(&self) -> CpuDescriptorHandle {
        self.cpu_start
    }
    fn gpu_start(&self) -> GpuDescriptorHandle {
        self.gpu_start
    }
}

pub struct Dx12RootSignature(ID3D12RootSignature);

unsafe impl Send for Dx12RootSignature {}
unsafe impl Sync for Dx12RootSignature {}

impl Dx12RootSignature {
    pub fn raw(&self) -> &ID3D12RootSignature {
        &self.0
    }
}

impl DescriptorDevice for Dx12Device {
    type Heap = Dx12DescriptorHeap;
    type RootSignature = Dx12RootSignature;

    fn descriptor_stride(&self, class: HandleClass) -> u32 {
        match class {
            HandleClass::Resource => self.resource_stride,
            HandleClass::Sampler => self.sampler_stride,
        }
    }

    fn create_descriptor_heap(
        &self,
        class: HandleClass,
        descriptor_count: u32,
    ) -> Result<Self::Heap, DeviceError> {
        let desc = d3d12::D3D12_DESCRIPTOR_HEAP_DESC {
            Type: heap_type(class),
            NumDescriptors: descriptor_count,
            Flags: d3d12::D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE,
            NodeMask: 0,
        };
        let heap: ID3D12DescriptorHeap = unsafe { self.device.CreateDescriptorHeap(&desc)? };
        let (cpu_start, gpu_start) = unsafe {
            (
                heap.GetCPUDescriptorHandleForHeapStart(),
                heap.GetGPUDescriptorHandleForHeapStart(),
            )
        };
        Ok(Dx12DescriptorHeap {
            heap,
            class,
            descriptor_count,
            cpu_start: CpuDescriptorHandle(cpu_start.ptr),
            gpu_start: GpuDescriptorHandle(gpu_start.ptr),
        })
    }

    fn create_root_signature(
        &self,
        desc: &RootSignatureDesc,
    ) -> Result<Self::RootSignature, DeviceError> {
        // All ranges are collected before any parameter points into them.
        let ranges: Vec<Vec<d3d12::D3D12_DESCRIPTOR_RANGE>> = desc
            .parameters
            .iter()
            .map(|parameter| match parameter {
                RootParameter::DescriptorTable { ranges, .. } => ranges
                    .iter()
                    .map(|range| d3d12::D3D12_DESCRIPTOR_RANGE {
                        RangeType: range_type(range.range_type),
                        NumDescriptors: range.num_descriptors,
                        BaseShaderRegister: range.base_shader_register,
                        RegisterSpace: range.register_space,
                        OffsetInDescriptorsFromTableStart: range.offset_in_table,
                    })
                    .collect(),
                RootParameter::Constants { .. } => Vec::new(),
            })
            .collect();

        let parameters: Vec<d3d12::D3D12_ROOT_PARAMETER> = desc
            .parameters
            .iter()
            .zip(ranges.iter())
            .map(|(parameter, ranges)| match parameter {
                RootParameter::DescriptorTable { visibility, .. } => d3d12::D3D12_ROOT_PARAMETER {
                    ParameterType: d3d12::D3D12_ROOT_PARAMETER_TYPE_DESCRIPTOR_TABLE,
                    Anonymous: d3d12::D3D12_ROOT_PARAMETER_0 {
                        DescriptorTable: d3d12::D3D12_ROOT_DESCRIPTOR_TABLE {
                            NumDescriptorRanges: ranges.len() as u32,
                            pDescriptorRanges: ranges.as_ptr(),
                        },
                    },
                    ShaderVisibility: shader_visibility(*visibility),
                },
                RootParameter::Constants {
                    visibility,
                    shader_register,
                    register_space,
                    num_values,
                } => d3d12::D3D12_ROOT_PARAMETER {
                    ParameterType: d3d12::D3D12_ROOT_PARAMETER_TYPE_32BIT_CONSTANTS,
                    Anonymous: d3d12::D3D12_ROOT_PARAMETER_0 {
                        Constants: d3d12::D3D12_ROOT_CONSTANTS {
                            ShaderRegister: *shader_register,
                            RegisterSpace: *register_space,
                            Num32BitValues: *num_values,
                        },
                    },
                    ShaderVisibility: shader_visibility(*visibility),
                },
            })
            .collect();

        let mut flags = d3d12::D3D12_ROOT_SIGNATURE_FLAG_NONE;
        if desc.allow_input_assembler_input_layout {
            flags |= d3d12::D3D12_ROOT_SIGNATURE_FLAG_ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT;
        }
        let native_desc = d3d12::D3D12_ROOT_SIGNATURE_DESC {
            NumParameters: parameters.len() as u32,
            pParameters: parameters.as_ptr(),
            NumStaticSamplers: 0,
            pStaticSamplers: std::ptr::null(),
            Flags: flags,
        };

        let mut blob: Option<ID3DBlob> = None;
        let mut error: Option<ID3DBlob> = None;
        let serialized = unsafe {
            d3d12::D3D12SerializeRootSignature(
                &native_desc,
                d3d12::D3D_ROOT_SIGNATURE_VERSION_1_0,
                &mut blob,
                Some(&mut error),
            )
        };
        if let Err(err) = serialized {
            let message = error
                .as_ref()
                .map(|error| String::from_utf8_lossy(unsafe { blob_bytes(error) }).into_owned())
                .unwrap_or_else(|| err.message().to_string());
            tracing::error!(%message, "failed to serialize root signature");
            return Err(DeviceError::InvalidRootSignature(message));
        }
        let Some(blob) = blob else {
            return Err(DeviceError::InvalidRootSignature(
                "serializer returned no blob".into(),
            ));
        };
        let signature: ID3D12RootSignature =
            unsafe { self.device.CreateRootSignature(0, blob_bytes(&blob))? };
        Ok(Dx12RootSignature(signature))
    }
}
