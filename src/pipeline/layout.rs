use std::{ops::Deref, sync::Arc};

use smallvec::{smallvec, SmallVec};

use super::{BindingLayout, BindingLocation, LayoutError, PipelineLayoutDesc};
use crate::{
    merge, CpuDescriptorHandle, DescriptorDevice, DescriptorPools, DescriptorStrides,
    GpuDescriptorHandle, HasDevice, MergedLayout, PoolAllocation, PoolStats, StageBindings,
};

/// A pipeline's root signature together with the descriptor pools its draws allocate from.
///
/// The binding layout is immutable after construction and can be read from any thread.
/// [`PipelineLayout::acquire`] and [`PipelineLayout::release`] only take a short spin lock.
pub struct PipelineLayout<D: DescriptorDevice> {
    device: D,
    merged: MergedLayout,
    layout: BindingLayout,
    strides: DescriptorStrides,
    pools: DescriptorPools<D::Heap>,
    root_signature: D::RootSignature,
}

impl<D: DescriptorDevice> PipelineLayout<D> {
    pub fn new(
        device: D,
        merged: MergedLayout,
        desc: &PipelineLayoutDesc,
    ) -> Result<Self, LayoutError> {
        let strides = DescriptorStrides::of(&device);
        let layout = BindingLayout::build(&merged, desc, strides)?;
        let root_signature = device
            .create_root_signature(&layout.root_signature_desc())
            .inspect_err(|err| tracing::error!(%err, "failed to create root signature"))?;

        // One copy per pool for unbounded layouts.
        let pool_capacity = if merged.is_runtime_sized() {
            1
        } else {
            desc.pool_capacity
        };
        let pools = DescriptorPools::new(layout.heaps(), strides, pool_capacity);
        Ok(Self {
            device,
            merged,
            layout,
            strides,
            pools,
            root_signature,
        })
    }

    /// Merge the reflected bindings of all stages and build a layout for them.
    pub fn from_stages(
        device: D,
        stages: &[StageBindings],
        desc: &PipelineLayoutDesc,
    ) -> Result<Self, LayoutError> {
        let merged = merge(stages)?;
        Self::new(device, merged, desc)
    }

    /// Number of entries in the merged binding table.
    pub fn descriptor_count(&self) -> usize {
        self.merged.len()
    }
    pub fn merged(&self) -> &MergedLayout {
        &self.merged
    }
    pub fn root_signature(&self) -> &D::RootSignature {
        &self.root_signature
    }
    pub fn strides(&self) -> DescriptorStrides {
        self.strides
    }
    pub fn pool_capacity(&self) -> u32 {
        self.pools.capacity()
    }
    pub fn pool_stats(&self) -> PoolStats {
        self.pools.stats()
    }

    /// Reserve one copy of the layout's descriptor heaps. Creates a new pool when all
    /// existing ones are full.
    pub fn acquire(&self) -> Result<PoolAllocation, LayoutError> {
        Ok(self.pools.acquire(&self.device)?)
    }

    /// Return an allocation to its pool. The GPU must be done reading from it, and each
    /// allocation must be released exactly once.
    pub fn release(&self, allocation: PoolAllocation) {
        self.pools.release(&allocation)
    }

    /// The heaps `allocation` lives in, indexed like [`BindingLayout::heaps`]. Set these on
    /// the command list before binding any of the allocation's tables.
    pub fn pool_heaps(&self, allocation: &PoolAllocation) -> Option<Arc<[D::Heap]>> {
        self.pools.heaps(allocation)
    }

    /// Where to write element `element` of the binding at `location` within `allocation`.
    pub fn descriptor_handle(
        &self,
        allocation: &PoolAllocation,
        location: &BindingLocation,
        element: u32,
    ) -> CpuDescriptorHandle {
        debug_assert!(element < location.descriptor_count);
        let stride = self.strides.get(location.class) as u64;
        allocation
            .cpu(location.heap)
            .offset(location.byte_offset + element as u64 * stride)
    }

    /// The handle to bind for descriptor table `table` of `allocation`.
    pub fn table_handle(&self, allocation: &PoolAllocation, table: usize) -> GpuDescriptorHandle {
        let table = &self.layout.tables()[table];
        debug_assert!(self.layout.root_parameters()[table.root_index as usize].is_table());
        allocation.gpu(table.heap).offset(table.byte_offset)
    }
}

impl<D: DescriptorDevice> Deref for PipelineLayout<D> {
    type Target = BindingLayout;

    fn deref(&self) -> &Self::Target {
        &self.layout
    }
}

impl<D: DescriptorDevice> HasDevice<D> for PipelineLayout<D> {
    fn device(&self) -> &D {
        &self.device
    }
}

impl<D: DescriptorDevice> Drop for PipelineLayout<D> {
    fn drop(&mut self) {
        let stats = self.pools.stats();
        if stats.in_use != 0 {
            tracing::warn!(
                in_use = stats.in_use,
                "pipeline layout dropped with descriptor slots in use"
            );
        }
        tracing::debug!(pools = stats.pools, "drop pipeline layout");
    }
}

/// Pack a push constant block into 32 bit root constants, zero padding the last word.
pub fn pack_constants<T: bytemuck::Pod>(data: &T) -> SmallVec<[u32; 16]> {
    let bytes = bytemuck::bytes_of(data);
    let mut words: SmallVec<[u32; 16]> = smallvec![0; bytes.len().div_ceil(4)];
    bytemuck::cast_slice_mut::<u32, u8>(&mut words)[..bytes.len()].copy_from_slice(bytes);
    words
}
