use arrayvec::ArrayVec;
use itertools::Itertools;

use super::{LayoutError, PipelineLayoutDesc};
use crate::{
    DescriptorRange, DescriptorStrides, HandleClass, HeapDescriptor, MergedLayout, RangeType,
    RootParameter, RootSignatureDesc, ShaderVisibility, BASE_VERTEX_INSTANCE_REGISTER,
    DESCRIPTOR_RANGE_OFFSET_APPEND, MAX_HEAPS, PUSH_CONSTANT_REGISTER,
};

/// Where the descriptors of one binding live within a pool allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingLocation {
    /// Index into the layout's heaps.
    pub heap: usize,
    /// Offset from the allocation's base handle in that heap.
    pub byte_offset: u64,
    pub class: HandleClass,
    pub range_type: RangeType,
    pub descriptor_count: u32,
}

/// A descriptor table root parameter and the heap region it points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorTable {
    pub root_index: u32,
    pub heap: usize,
    /// Offset of the first descriptor of the table from the allocation's base handle.
    pub byte_offset: u64,
    pub visibility: ShaderVisibility,
}

struct RangeRequest {
    layout: u32,
    visibility: ShaderVisibility,
    range: DescriptorRange,
}

impl RangeRequest {
    fn key(&self) -> (ShaderVisibility, HandleClass) {
        (self.visibility, self.range.handle_class())
    }
}

/// The native binding model of a pipeline: heaps, root parameters and the location of
/// every binding. Computed once per pipeline layout and immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct BindingLayout {
    heaps: ArrayVec<HeapDescriptor, MAX_HEAPS>,
    parameters: Vec<RootParameter>,
    tables: Vec<DescriptorTable>,
    /// Indexed by layout index.
    locations: Vec<ArrayVec<BindingLocation, 2>>,
    push_constant_index: Option<u32>,
    base_vertex_instance_index: Option<u32>,
}

impl BindingLayout {
    pub fn build(
        merged: &MergedLayout,
        desc: &PipelineLayoutDesc,
        strides: DescriptorStrides,
    ) -> Result<Self, LayoutError> {
        let mut requests: Vec<RangeRequest> = merged
            .bindings()
            .iter()
            .filter(|binding| binding.is_active())
            .flat_map(|binding| {
                let visibility = ShaderVisibility::from_stages(binding.stage);
                let num_descriptors = binding.descriptor_count(desc.runtime_array_size);
                binding
                    .class
                    .ranges()
                    .iter()
                    .map(move |&range_type| RangeRequest {
                        layout: binding.layout,
                        visibility,
                        range: DescriptorRange {
                            range_type,
                            num_descriptors,
                            base_shader_register: binding.layout,
                            register_space: 0,
                            offset_in_table: DESCRIPTOR_RANGE_OFFSET_APPEND,
                        },
                    })
            })
            .collect();
        // Stable, so ranges sharing a table keep binding order.
        requests.sort_by_key(RangeRequest::key);

        let mut heaps: ArrayVec<HeapDescriptor, MAX_HEAPS> = ArrayVec::new();
        let mut parameters = Vec::new();
        let mut tables = Vec::new();
        let mut locations: Vec<ArrayVec<BindingLocation, 2>> =
            vec![ArrayVec::new(); merged.max_layout().map_or(0, |layout| layout as usize + 1)];

        // Offsets are counted in descriptors here and converted to bytes below.
        let groups = requests.iter().group_by(|request| request.key());
        for ((visibility, class), group) in &groups {
            let heap = match heaps.iter().position(|heap| heap.class == class) {
                Some(heap) => heap,
                None => {
                    heaps.push(HeapDescriptor {
                        class,
                        descriptor_count: 0,
                    });
                    heaps.len() - 1
                }
            };
            tables.push(DescriptorTable {
                root_index: parameters.len() as u32,
                heap,
                byte_offset: heaps[heap].descriptor_count as u64,
                visibility,
            });
            let mut ranges = Vec::new();
            for request in group {
                let heap_desc = &mut heaps[heap];
                let offset = heap_desc.descriptor_count;
                heap_desc.descriptor_count = offset
                    .checked_add(request.range.num_descriptors)
                    .ok_or(LayoutError::DescriptorCountOverflow {
                        class,
                        layout: request.layout,
                    })?;
                locations[request.layout as usize].push(BindingLocation {
                    heap,
                    byte_offset: offset as u64,
                    class,
                    range_type: request.range.range_type,
                    descriptor_count: request.range.num_descriptors,
                });
                ranges.push(request.range);
            }
            parameters.push(RootParameter::DescriptorTable { visibility, ranges });
        }

        for binding in locations.iter_mut() {
            for location in binding.iter_mut() {
                location.byte_offset *= strides.get(location.class) as u64;
            }
            binding.sort_by_key(|location| location.class);
        }
        for table in tables.iter_mut() {
            table.byte_offset *= strides.get(heaps[table.heap].class) as u64;
        }

        let mut push_constant_index = None;
        if let Some(block) = merged.push_constants() {
            push_constant_index = Some(parameters.len() as u32);
            parameters.push(RootParameter::Constants {
                visibility: ShaderVisibility::from_stages(block.stage),
                shader_register: PUSH_CONSTANT_REGISTER,
                register_space: 0,
                num_values: block.num_values(),
            });
        }
        let mut base_vertex_instance_index = None;
        if desc.base_vertex_instance {
            base_vertex_instance_index = Some(parameters.len() as u32);
            parameters.push(RootParameter::Constants {
                visibility: ShaderVisibility::Vertex,
                shader_register: BASE_VERTEX_INSTANCE_REGISTER,
                register_space: 0,
                num_values: 2,
            });
        }

        tracing::debug!(
            bindings = merged.len(),
            tables = tables.len(),
            parameters = parameters.len(),
            heaps = ?heaps,
            "built binding layout"
        );
        Ok(Self {
            heaps,
            parameters,
            tables,
            locations,
            push_constant_index,
            base_vertex_instance_index,
        })
    }

    /// Heaps required by one copy of the layout, in heap index order.
    pub fn heaps(&self) -> &[HeapDescriptor] {
        &self.heaps
    }
    pub fn heap_index(&self, class: HandleClass) -> Option<usize> {
        self.heaps.iter().position(|heap| heap.class == class)
    }
    pub fn root_parameters(&self) -> &[RootParameter] {
        &self.parameters
    }
    pub fn tables(&self) -> &[DescriptorTable] {
        &self.tables
    }
    /// Root parameter index of the push constant block.
    pub fn push_constant_index(&self) -> Option<u32> {
        self.push_constant_index
    }
    /// Root parameter index of the base vertex / base instance constants.
    pub fn base_vertex_instance_index(&self) -> Option<u32> {
        self.base_vertex_instance_index
    }

    /// Locations of the descriptors of a binding. Empty for unused or unknown layout indices,
    /// two entries for combined texture samplers with the resource location first.
    pub fn resolve(&self, layout: u32) -> &[BindingLocation] {
        self.locations
            .get(layout as usize)
            .map(|locations| locations.as_slice())
            .unwrap_or_default()
    }

    pub fn root_signature_desc(&self) -> RootSignatureDesc {
        RootSignatureDesc {
            parameters: self.parameters.clone(),
            allow_input_assembler_input_layout: true,
        }
    }
}
