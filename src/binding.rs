//! Descriptor-binding resource types. Grounded in `glue.rs`'s `MixturePart`/
//! `get_descriptor_type` (the teacher's own resource-type -> HAL descriptor
//! type mapping), generalized into the closed `ResourceType` enum spec §4.6
//! drives both the descriptor-set-layout cache key and the transition-list
//! usage mapping with.

use crate::compat::ToHalType;
use crate::state::Usage;

/// A single binding slot in a Task's ordered resource-type list. The
/// sequence of these (in order) is the descriptor-set-layout cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    UniformBuffer,
    StorageBuffer,
    SampledImage,
    DepthSampledImage,
    StorageImage,
}

impl ResourceType {
    /// Resource-type -> usage mapping for descriptor bindings (spec §4.6):
    /// `uniform-buffer -> bufferUniform`, `storage-buffer -> bufferStorage`,
    /// `sampled-image -> imageSampled` (or `imageDepthSampled` for a depth
    /// view), `storage-image -> imageStorage`.
    pub fn usage(self) -> Usage {
        match self {
            ResourceType::UniformBuffer => Usage::BufferUniform,
            ResourceType::StorageBuffer => Usage::BufferStorage,
            ResourceType::SampledImage => Usage::ImageSampled,
            ResourceType::DepthSampledImage => Usage::ImageDepthSampled,
            ResourceType::StorageImage => Usage::ImageStorage,
        }
    }

    pub(crate) fn descriptor_type(self) -> gfx_hal::pso::DescriptorType {
        use gfx_hal::pso::{BufferDescriptorFormat, BufferDescriptorType, DescriptorType, ImageDescriptorType};
        match self {
            ResourceType::UniformBuffer => DescriptorType::Buffer {
                ty: BufferDescriptorType::Uniform,
                format: BufferDescriptorFormat::Structured { dynamic_offset: false },
            },
            ResourceType::StorageBuffer => DescriptorType::Buffer {
                ty: BufferDescriptorType::Storage { read_only: false },
                format: BufferDescriptorFormat::Structured { dynamic_offset: false },
            },
            ResourceType::SampledImage | ResourceType::DepthSampledImage => DescriptorType::Image {
                ty: ImageDescriptorType::Sampled { with_sampler: true },
            },
            ResourceType::StorageImage => DescriptorType::Image {
                ty: ImageDescriptorType::Storage { read_only: false },
            },
        }
    }

    pub(crate) fn stage_flags(self) -> gfx_hal::pso::ShaderStageFlags {
        gfx_hal::pso::ShaderStageFlags::ALL
    }
}

impl ToHalType for (usize, ResourceType) {
    type Target = gfx_hal::pso::DescriptorSetLayoutBinding;

    fn convert(self) -> Self::Target {
        let (binding, ty) = self;
        gfx_hal::pso::DescriptorSetLayoutBinding {
            binding: binding as u32,
            ty: ty.descriptor_type(),
            count: 1,
            stage_flags: ty.stage_flags(),
            immutable_samplers: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampled_vs_depth_sampled_pick_distinct_usages() {
        assert_ne!(ResourceType::SampledImage.usage(), ResourceType::DepthSampledImage.usage());
    }
}
