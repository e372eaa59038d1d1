use crate::{HandleClass, RangeType, ShaderVisibility};

/// Register the push constant block is bound to.
pub const PUSH_CONSTANT_REGISTER: u32 = 256;
/// Register of the two base vertex / base instance root constants.
pub const BASE_VERTEX_INSTANCE_REGISTER: u32 = 257;
/// Place the range right after the previous one in its table.
pub const DESCRIPTOR_RANGE_OFFSET_APPEND: u32 = u32::MAX;
/// Maximum size of a root signature, in DWORDs.
pub const MAX_ROOT_SIGNATURE_COST: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorRange {
    pub range_type: RangeType,
    pub num_descriptors: u32,
    pub base_shader_register: u32,
    pub register_space: u32,
    pub offset_in_table: u32,
}

impl DescriptorRange {
    pub fn handle_class(&self) -> HandleClass {
        self.range_type.handle_class()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootParameter {
    DescriptorTable {
        visibility: ShaderVisibility,
        ranges: Vec<DescriptorRange>,
    },
    Constants {
        visibility: ShaderVisibility,
        shader_register: u32,
        register_space: u32,
        num_values: u32,
    },
}

impl RootParameter {
    pub fn visibility(&self) -> ShaderVisibility {
        match self {
            Self::DescriptorTable { visibility, .. } | Self::Constants { visibility, .. } => {
                *visibility
            }
        }
    }
    /// Space taken in the root signature, in DWORDs.
    pub fn cost(&self) -> u32 {
        match self {
            Self::DescriptorTable { .. } => 1,
            Self::Constants { num_values, .. } => *num_values,
        }
    }
    pub fn is_table(&self) -> bool {
        matches!(self, Self::DescriptorTable { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootSignatureDesc {
    pub parameters: Vec<RootParameter>,
    pub allow_input_assembler_input_layout: bool,
}

impl RootSignatureDesc {
    pub fn cost(&self) -> u32 {
        self.parameters.iter().map(RootParameter::cost).sum()
    }

    /// Checks the constraints every native implementation enforces: tables are non-empty
    /// and never mix sampler and non-sampler ranges, constants hold at least one value.
    pub fn validate(&self) -> Result<(), String> {
        for (index, parameter) in self.parameters.iter().enumerate() {
            match parameter {
                RootParameter::DescriptorTable { ranges, .. } => {
                    let Some(first) = ranges.first() else {
                        return Err(format!("descriptor table {index} has no ranges"));
                    };
                    if ranges
                        .iter()
                        .any(|r| r.handle_class() != first.handle_class())
                    {
                        return Err(format!(
                            "descriptor table {index} mixes sampler and resource ranges"
                        ));
                    }
                }
                RootParameter::Constants { num_values, .. } => {
                    if *num_values == 0 {
                        return Err(format!("root constants {index} hold no values"));
                    }
                }
            }
        }
        Ok(())
    }
}
