use std::collections::{btree_map::Entry, BTreeMap};

use crate::{Binding, BindingClass, LayoutError, PushConstantBlock, StageBindings, WHOLE_SIZE};

/// Bindings of all stages of a pipeline, unique per layout index.
#[derive(Debug, Clone, Default)]
pub struct MergedLayout {
    bindings: Vec<Binding>,
    push_constants: PushConstantBlock,
    runtime_sized: bool,
}

impl MergedLayout {
    /// Sorted by layout index.
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }
    pub fn len(&self) -> usize {
        self.bindings.len()
    }
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
    pub fn push_constants(&self) -> Option<&PushConstantBlock> {
        if self.push_constants.byte_size == 0 {
            None
        } else {
            Some(&self.push_constants)
        }
    }
    /// Whether any binding is an unbounded array.
    pub fn is_runtime_sized(&self) -> bool {
        self.runtime_sized
    }
    pub fn max_layout(&self) -> Option<u32> {
        self.bindings.last().map(|b| b.layout)
    }
    pub fn get(&self, layout: u32) -> Option<&Binding> {
        self.bindings
            .binary_search_by_key(&layout, |b| b.layout)
            .ok()
            .map(|i| &self.bindings[i])
    }

    /// Zero sized storage buffers bind the whole buffer.
    fn normalize_storage_buffers(&mut self) {
        for binding in self.bindings.iter_mut() {
            if binding.class.is_storage_buffer() && binding.byte_size == 0 {
                binding.byte_size = WHOLE_SIZE;
            }
        }
    }
}

fn merge_push_constants(
    merged: &mut PushConstantBlock,
    block: PushConstantBlock,
) -> Result<(), LayoutError> {
    // Blocks no stage reads are dropped.
    if block.stage.is_empty() {
        return Ok(());
    }
    if merged.byte_size != 0 && block.byte_size != 0 && merged.byte_size != block.byte_size {
        return Err(LayoutError::PushConstantMismatch {
            first: merged.byte_size,
            second: block.byte_size,
        });
    }
    merged.byte_size = merged.byte_size.max(block.byte_size);
    merged.stage |= block.stage;
    Ok(())
}

/// Combine the reflected bindings of every stage of a pipeline.
///
/// Bindings sharing a layout index must agree on their class. Their stage masks are
/// unioned, and array and byte sizes take the larger of the two.
pub fn merge<'a>(
    stages: impl IntoIterator<Item = &'a StageBindings>,
) -> Result<MergedLayout, LayoutError> {
    let mut bindings: BTreeMap<u32, Binding> = BTreeMap::new();
    let mut push_constants = PushConstantBlock::default();

    for stage in stages {
        if let Some(block) = stage.push_constants {
            merge_push_constants(&mut push_constants, block)?;
        }
        for binding in stage.bindings.iter() {
            if binding.class == BindingClass::PushConstant {
                if !binding.is_active() {
                    continue;
                }
                let byte_size = u32::try_from(binding.byte_size).map_err(|_| {
                    LayoutError::PushConstantTooLarge {
                        layout: binding.layout,
                        byte_size: binding.byte_size,
                    }
                })?;
                merge_push_constants(
                    &mut push_constants,
                    PushConstantBlock {
                        byte_size,
                        stage: binding.stage,
                    },
                )?;
                continue;
            }
            match bindings.entry(binding.layout) {
                Entry::Vacant(entry) => {
                    entry.insert(*binding);
                }
                Entry::Occupied(mut entry) => {
                    let existing = entry.get_mut();
                    if existing.class != binding.class {
                        return Err(LayoutError::ConflictingBinding {
                            layout: binding.layout,
                            existing: existing.class,
                            incoming: binding.class,
                        });
                    }
                    existing.stage |= binding.stage;
                    existing.array_size = existing.array_size.max(binding.array_size);
                    existing.byte_size = existing.byte_size.max(binding.byte_size);
                    existing.runtime_sized |= binding.runtime_sized;
                }
            }
        }
    }

    let bindings: Vec<Binding> = bindings.into_values().collect();
    let runtime_sized = bindings.iter().any(|b| b.runtime_sized);
    let mut merged = MergedLayout {
        bindings,
        push_constants,
        runtime_sized,
    };
    merged.normalize_storage_buffers();
    Ok(merged)
}

impl TryFrom<&[StageBindings]> for MergedLayout {
    type Error = LayoutError;
    fn try_from(stages: &[StageBindings]) -> Result<Self, Self::Error> {
        merge(stages)
    }
}
