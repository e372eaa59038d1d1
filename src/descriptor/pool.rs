// Descriptor pools are created per pipeline layout. Each pool holds `capacity` back-to-back
// copies of the layout's heaps, and one copy is handed out per acquire.
// Pools are only freed together with the layout.
use std::sync::Arc;

use arrayvec::ArrayVec;
use smallvec::{smallvec, SmallVec};

use super::{HeapDescriptor, MAX_HEAPS};
use crate::{
    CpuDescriptorHandle, DescriptorDevice, DescriptorHeap, DescriptorStrides, DeviceError,
    GpuDescriptorHandle,
};

/// One copy of a pipeline layout's descriptor heaps, owned by the caller until released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolAllocation {
    pool: u32,
    slot: u32,
    heap_count: u8,
    cpu: [CpuDescriptorHandle; MAX_HEAPS],
    gpu: [GpuDescriptorHandle; MAX_HEAPS],
}

impl PoolAllocation {
    pub fn pool(&self) -> u32 {
        self.pool
    }
    pub fn slot(&self) -> u32 {
        self.slot
    }
    /// Base CPU handle of this allocation in each heap of the layout.
    pub fn cpu_handles(&self) -> &[CpuDescriptorHandle] {
        &self.cpu[..self.heap_count as usize]
    }
    /// Base GPU handle of this allocation in each heap of the layout.
    pub fn gpu_handles(&self) -> &[GpuDescriptorHandle] {
        &self.gpu[..self.heap_count as usize]
    }
    pub fn cpu(&self, heap: usize) -> CpuDescriptorHandle {
        self.cpu_handles()[heap]
    }
    pub fn gpu(&self, heap: usize) -> GpuDescriptorHandle {
        self.gpu_handles()[heap]
    }
}

/// Occupancy of the slots of one pool.
struct SlotMask {
    words: SmallVec<[u64; 2]>,
    capacity: u32,
    in_use: u32,
}

impl SlotMask {
    fn new(capacity: u32) -> Self {
        Self {
            words: smallvec![0; capacity.div_ceil(64) as usize],
            capacity,
            in_use: 0,
        }
    }
    fn is_full(&self) -> bool {
        self.in_use == self.capacity
    }
    /// Marks the lowest free slot as in use.
    fn acquire(&mut self) -> Option<u32> {
        if self.is_full() {
            return None;
        }
        for (i, word) in self.words.iter_mut().enumerate() {
            if *word == u64::MAX {
                continue;
            }
            let bit = (!*word).trailing_zeros();
            let slot = i as u32 * 64 + bit;
            if slot >= self.capacity {
                return None;
            }
            *word |= 1 << bit;
            self.in_use += 1;
            return Some(slot);
        }
        None
    }
    /// Returns false if the slot wasn't in use.
    fn release(&mut self, slot: u32) -> bool {
        if slot >= self.capacity {
            return false;
        }
        let word = &mut self.words[(slot / 64) as usize];
        let mask = 1u64 << (slot % 64);
        if *word & mask == 0 {
            return false;
        }
        *word &= !mask;
        self.in_use -= 1;
        true
    }
}

struct DescriptorPool<H> {
    /// Shared with callers binding the pool's heaps on a command list.
    heaps: Arc<[H]>,
    slots: SlotMask,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub pools: u32,
    pub slots: u32,
    pub in_use: u32,
}

/// The growable list of descriptor pools of one pipeline layout.
pub struct DescriptorPools<H> {
    layout: ArrayVec<HeapDescriptor, MAX_HEAPS>,
    /// Bytes taken by one slot in each heap.
    slot_sizes: ArrayVec<u64, MAX_HEAPS>,
    capacity: u32,
    pools: spin::Mutex<Vec<DescriptorPool<H>>>,
}

impl<H: DescriptorHeap> DescriptorPools<H> {
    pub fn new(layout: &[HeapDescriptor], strides: DescriptorStrides, capacity: u32) -> Self {
        let layout: ArrayVec<HeapDescriptor, MAX_HEAPS> = layout.iter().copied().collect();
        let slot_sizes = layout
            .iter()
            .map(|heap| heap.descriptor_count as u64 * strides.get(heap.class) as u64)
            .collect();
        Self {
            layout,
            slot_sizes,
            capacity: capacity.max(1),
            pools: spin::Mutex::new(Vec::new()),
        }
    }

    /// Slots per pool.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn acquire<D: DescriptorDevice<Heap = H>>(
        &self,
        device: &D,
    ) -> Result<PoolAllocation, DeviceError> {
        let mut pools = self.pools.lock();
        let index = match pools.iter().position(|pool| !pool.slots.is_full()) {
            Some(index) => index,
            None => {
                // Heap creation happens under the lock. It only runs when every pool is full.
                let pool = self.create_pool(device, pools.len())?;
                pools.push(pool);
                pools.len() - 1
            }
        };
        let pool = &mut pools[index];
        let Some(slot) = pool.slots.acquire() else {
            unreachable!("descriptor pool {index} was selected with no free slot");
        };

        let mut allocation = PoolAllocation {
            pool: index as u32,
            slot,
            heap_count: pool.heaps.len() as u8,
            cpu: Default::default(),
            gpu: Default::default(),
        };
        for (i, heap) in pool.heaps.iter().enumerate() {
            let offset = slot as u64 * self.slot_sizes[i];
            allocation.cpu[i] = heap.cpu_start().offset(offset);
            allocation.gpu[i] = heap.gpu_start().offset(offset);
        }
        drop(pools);
        tracing::trace!(pool = index, slot, "acquired descriptor slot");
        Ok(allocation)
    }

    fn create_pool<D: DescriptorDevice<Heap = H>>(
        &self,
        device: &D,
        index: usize,
    ) -> Result<DescriptorPool<H>, DeviceError> {
        tracing::debug!(
            pool = index,
            capacity = self.capacity,
            heaps = self.layout.len(),
            "creating descriptor pool"
        );
        // Heaps created before a failure are dropped with `heaps`.
        let mut heaps: ArrayVec<H, MAX_HEAPS> = ArrayVec::new();
        for desc in self.layout.iter() {
            let descriptor_count = desc.descriptor_count.saturating_mul(self.capacity);
            let heap = device
                .create_descriptor_heap(desc.class, descriptor_count)
                .inspect_err(|err| {
                    tracing::error!(pool = index, class = ?desc.class, descriptor_count, %err, "failed to create descriptor heap");
                })?;
            debug_assert_eq!(heap.class(), desc.class);
            debug_assert!(heap.descriptor_count() >= descriptor_count);
            heaps.push(heap);
        }
        Ok(DescriptorPool {
            heaps: heaps.into_iter().collect(),
            slots: SlotMask::new(self.capacity),
        })
    }

    /// Heaps of the pool `allocation` was taken from, in heap index order. These are the
    /// heaps to set on a command list before binding the allocation's tables.
    pub fn heaps(&self, allocation: &PoolAllocation) -> Option<Arc<[H]>> {
        let pools = self.pools.lock();
        pools
            .get(allocation.pool as usize)
            .map(|pool| pool.heaps.clone())
    }

    pub fn release(&self, allocation: &PoolAllocation) {
        let mut pools = self.pools.lock();
        let released = pools
            .get_mut(allocation.pool as usize)
            .is_some_and(|pool| pool.slots.release(allocation.slot));
        drop(pools);
        debug_assert!(
            released,
            "descriptor slot {}:{} was not in use",
            allocation.pool, allocation.slot
        );
        tracing::trace!(
            pool = allocation.pool,
            slot = allocation.slot,
            "released descriptor slot"
        );
    }

    pub fn stats(&self) -> PoolStats {
        let pools = self.pools.lock();
        PoolStats {
            pools: pools.len() as u32,
            slots: pools.len() as u32 * self.capacity,
            in_use: pools.iter().map(|pool| pool.slots.in_use).sum(),
        }
    }
}
