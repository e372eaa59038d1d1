mod pool;

pub use pool::*;

use crate::HandleClass;

/// One heap per handle class at most.
pub const MAX_HEAPS: usize = HandleClass::ALL.len();

/// Number of layout copies held by each descriptor pool of a bounded layout.
pub const DEFAULT_POOL_CAPACITY: u32 = 128;

/// A descriptor heap region required by one copy of a pipeline layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapDescriptor {
    pub class: HandleClass,
    pub descriptor_count: u32,
}
