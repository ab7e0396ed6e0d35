//! Compiled pipeline objects (spec §4.5): [`ComputeTask`] wraps a compute
//! pipeline plus its descriptor-set layout; [`GraphicsTask`] additionally
//! borrows (by `Arc`) the [`crate::render_pass::RenderPass`] it was built
//! against, so the type system keeps the pass alive for as long as any task
//! targets it — the spec's "destroying the pass while a Task exists is
//! undefined; the type system must enforce this" is satisfied by ordinary
//! reference counting rather than a borrow-checker lifetime, matching how
//! every other shared resource in this crate is owned (spec §3).

pub mod compute;
pub mod graphics;

pub use compute::{ComputeTask, ComputeTaskConfig};
pub use graphics::{
    GraphicsTask, GraphicsTaskConfig, IndexType, Topology, VertexAttribute, VertexFormat, VertexInput, VertexInputRate,
};

use crate::binding::ResourceType;
use crate::resource::{BufferView, DepthImageView, ImageView};

/// A single resource-view bound to a task's descriptor set, tagged by the
/// [`ResourceType`] slot it fills. The sequence of these (in order) must
/// match the task's `rsc_tys` both in count and in kind (spec §4.6).
pub enum ResourceBinding<B: gfx_hal::Backend> {
    UniformBuffer(BufferView<B>),
    StorageBuffer(BufferView<B>),
    SampledImage(ImageView<B>),
    DepthSampledImage(DepthImageView<B>),
    StorageImage(ImageView<B>),
}

impl<B: gfx_hal::Backend> ResourceBinding<B> {
    pub(crate) fn ty(&self) -> ResourceType {
        match self {
            ResourceBinding::UniformBuffer(_) => ResourceType::UniformBuffer,
            ResourceBinding::StorageBuffer(_) => ResourceType::StorageBuffer,
            ResourceBinding::SampledImage(_) => ResourceType::SampledImage,
            ResourceBinding::DepthSampledImage(_) => ResourceType::DepthSampledImage,
            ResourceBinding::StorageImage(_) => ResourceType::StorageImage,
        }
    }
}
