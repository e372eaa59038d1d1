use ash::vk;

/// Byte size recorded for storage buffers that are bound in full.
pub const WHOLE_SIZE: u64 = vk::WHOLE_SIZE;

/// Resource class of a shader binding, as reported by reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingClass {
    UniformBuffer,
    /// Combined texture and sampler. Occupies a slot in both heaps.
    Texture,
    /// Sampled image without a sampler.
    Image,
    Sampler,
    StorageBuffer,
    StorageBufferRw,
    StorageImage,
    StorageImageRw,
    AccelerationStructure,
    PushConstant,
}

impl BindingClass {
    /// Descriptor ranges a binding of this class expands into, resource range first.
    pub const fn ranges(self) -> &'static [RangeType] {
        match self {
            Self::UniformBuffer => &[RangeType::Cbv],
            Self::Texture => &[RangeType::Srv, RangeType::Sampler],
            Self::Image | Self::StorageBuffer | Self::StorageImage | Self::AccelerationStructure => {
                &[RangeType::Srv]
            }
            Self::StorageBufferRw | Self::StorageImageRw => &[RangeType::Uav],
            Self::Sampler => &[RangeType::Sampler],
            Self::PushConstant => &[],
        }
    }
    pub const fn is_storage_buffer(self) -> bool {
        matches!(self, Self::StorageBuffer | Self::StorageBufferRw)
    }
}

/// Kind of descriptor heap a descriptor lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HandleClass {
    /// Constant buffer, shader resource and unordered access views.
    Resource = 0,
    Sampler = 1,
}

impl HandleClass {
    pub const ALL: [HandleClass; 2] = [HandleClass::Resource, HandleClass::Sampler];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RangeType {
    Srv = 0,
    Uav = 1,
    Cbv = 2,
    Sampler = 3,
}

impl RangeType {
    pub const fn handle_class(self) -> HandleClass {
        match self {
            Self::Sampler => HandleClass::Sampler,
            Self::Srv | Self::Uav | Self::Cbv => HandleClass::Resource,
        }
    }
}

/// Shader stages a root parameter is visible to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderVisibility {
    All = 0,
    Vertex = 1,
    Hull = 2,
    Domain = 3,
    Geometry = 4,
    Pixel = 5,
    Amplification = 6,
    Mesh = 7,
}

impl ShaderVisibility {
    /// Single graphics stages get a dedicated visibility. Compute, empty and
    /// multi-stage masks are visible to all stages.
    pub fn from_stages(stages: vk::ShaderStageFlags) -> Self {
        match stages {
            vk::ShaderStageFlags::VERTEX => Self::Vertex,
            vk::ShaderStageFlags::TESSELLATION_CONTROL => Self::Hull,
            vk::ShaderStageFlags::TESSELLATION_EVALUATION => Self::Domain,
            vk::ShaderStageFlags::GEOMETRY => Self::Geometry,
            vk::ShaderStageFlags::FRAGMENT => Self::Pixel,
            vk::ShaderStageFlags::TASK_EXT => Self::Amplification,
            vk::ShaderStageFlags::MESH_EXT => Self::Mesh,
            _ => Self::All,
        }
    }
}

/// One shader-visible resource slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub class: BindingClass,
    /// Stages that access the binding. Empty for declared but unused slots.
    pub stage: vk::ShaderStageFlags,
    /// Register / binding slot.
    pub layout: u32,
    pub array_size: u32,
    /// Size of the bound range for buffers. Zero for storage buffers means the whole buffer.
    pub byte_size: u64,
    /// Unbounded array, sized by the pipeline layout's runtime array size.
    pub runtime_sized: bool,
}

impl Binding {
    pub fn new(class: BindingClass, stage: vk::ShaderStageFlags, layout: u32) -> Self {
        Self {
            class,
            stage,
            layout,
            array_size: 1,
            byte_size: 0,
            runtime_sized: false,
        }
    }
    pub fn with_array_size(mut self, array_size: u32) -> Self {
        self.array_size = array_size;
        self
    }
    pub fn with_byte_size(mut self, byte_size: u64) -> Self {
        self.byte_size = byte_size;
        self
    }
    pub fn runtime_sized(mut self) -> Self {
        self.runtime_sized = true;
        self
    }
    pub fn is_active(&self) -> bool {
        !self.stage.is_empty()
    }
    /// Number of descriptors this binding occupies per range.
    pub fn descriptor_count(&self, runtime_array_size: u32) -> u32 {
        if self.runtime_sized {
            runtime_array_size
        } else {
            self.array_size
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushConstantBlock {
    pub byte_size: u32,
    pub stage: vk::ShaderStageFlags,
}

impl PushConstantBlock {
    /// Number of 32 bit root constants needed to hold the block.
    pub fn num_values(&self) -> u32 {
        self.byte_size.div_ceil(4)
    }
}

/// Reflection output of one shader stage.
#[derive(Debug, Clone, Default)]
pub struct StageBindings {
    pub bindings: Vec<Binding>,
    pub push_constants: Option<PushConstantBlock>,
}

impl StageBindings {
    pub fn new(bindings: impl IntoIterator<Item = Binding>) -> Self {
        Self {
            bindings: bindings.into_iter().collect(),
            push_constants: None,
        }
    }
    pub fn with_push_constants(mut self, byte_size: u32, stage: vk::ShaderStageFlags) -> Self {
        self.push_constants = Some(PushConstantBlock { byte_size, stage });
        self
    }
}
