//! A portable GPU hardware abstraction layer, built on `gfx-hal` over Vulkan.
//!
//! [`Context`] owns the device, its submission-class queues, and the caches
//! (samplers, descriptor-set layouts) and pool managers every resource and
//! task is built from. Resources ([`resource::Buffer`], [`resource::Image`],
//! [`resource::DepthImage`]) and tasks ([`task::ComputeTask`],
//! [`task::GraphicsTask`]) are created against a `Context` and recorded into
//! an [`invocation::Invocation`] tree, which [`recorder::record`] turns into
//! a submitted [`Transaction`] — inserting whatever pipeline barriers the
//! tree's resource-state transitions require along the way.
//!
//! Grounded throughout in the `render` crate's `gfx` module: this crate keeps
//! that module's device/queue/allocator idioms and generalizes its one
//! hand-written render graph into the explicit invocation tree the
//! specification this crate implements calls for.

pub mod allocator;
pub mod binding;
pub mod compat;
pub mod context;
pub mod error;
pub mod format;
pub mod handle;
pub mod invocation;
pub mod pool;
pub mod recorder;
pub mod render_pass;
pub mod resource;
pub mod shader;
pub mod state;
pub mod swapchain;
pub mod task;

pub use context::{Context, ContextBuilder, ContextConfig, InstanceConfig, Shared, SubmitClass, SurfaceConfig};
pub use error::{Error, Label, Result};
pub use invocation::{
    AttachmentView, CompositeChild, CompositeInvocation, ComputeInvocation, DrawCall, GraphicsInvocation, Invocation,
    PresentInvocation, RenderPassInvocation, Transition, TransitionTarget, TransferEndpoint, TransferInvocation,
};
pub use recorder::{bake, record, Baked, Transaction};
pub use render_pass::{AttachmentAccess, AttachmentConfig, AttachmentKind, RenderPass, RenderPassConfig};
pub use resource::{
    Buffer, BufferConfig, BufferUsage, BufferView, DepthImage, DepthImageConfig, DepthImageUsage, DepthImageView, HostAccess,
    Image, ImageConfig, ImageUsage, ImageView, MappedBuffer, Sampler, SamplerKey,
};
pub use shader::{ShaderCompiler, ShaderSource, ShaderStage};
pub use swapchain::{AcquiredFrame, Swapchain, SwapchainConfig};
pub use task::{
    ComputeTask, ComputeTaskConfig, GraphicsTask, GraphicsTaskConfig, IndexType, ResourceBinding, Topology, VertexAttribute,
    VertexFormat, VertexInput, VertexInputRate,
};
