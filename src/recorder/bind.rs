//! Descriptor-set content writes. The `Context`'s descriptor-set pool (see
//! `context::descriptor`) only hands out raw, uninitialized sets; this module
//! writes a `ComputeInvocation`/`GraphicsInvocation`'s resolved
//! `ResourceBinding` list into one, matching the binding order its Task's
//! `rsc_tys` declared. No equivalent exists in the teacher (its descriptor
//! writes are one-off, done directly in `pipeline.rs` at setup time); this is
//! authored from spec §4.6's "bindings bound in Task's declared rsc_tys
//! order" rule plus the ordinary `write_descriptor_sets` device call every
//! gfx-hal backend exposes.

use gfx_hal::device::Device;
use gfx_hal::pso::{Descriptor, DescriptorSetWrite};
use gfx_hal::Backend;

use crate::context::Context;
use crate::resource::sampler::SamplerKey;
use crate::task::ResourceBinding;

fn sampler_key(is_depth: bool) -> SamplerKey {
    if is_depth {
        SamplerKey::NearestLessCompare
    } else {
        SamplerKey::LinearNone
    }
}

/// Writes `bindings` into `set`, one binding per slot in declaration order.
/// `bindings` has already been validated against the task's `rsc_tys` at
/// invocation-construction time (see `invocation::check_bindings`), so no
/// further type checking happens here.
pub(crate) fn write<B: Backend>(context: &Context<B>, set: &mut B::DescriptorSet, bindings: &[ResourceBinding<B>]) {
    let device = context.device();
    for (i, binding) in bindings.iter().enumerate() {
        let descriptor = match binding {
            ResourceBinding::UniformBuffer(view) | ResourceBinding::StorageBuffer(view) => Descriptor::Buffer(
                view.buffer.raw(),
                gfx_hal::buffer::SubRange {
                    offset: view.offset,
                    size: Some(view.size),
                },
            ),
            ResourceBinding::SampledImage(view) => {
                let key = view.sampler.unwrap_or_else(|| sampler_key(false));
                Descriptor::CombinedImageSampler(view.raw(), gfx_hal::image::Layout::ShaderReadOnlyOptimal, context.sampler(key).raw())
            }
            ResourceBinding::DepthSampledImage(view) => {
                let key = sampler_key(true);
                Descriptor::CombinedImageSampler(view.raw(), gfx_hal::image::Layout::DepthStencilReadOnlyOptimal, context.sampler(key).raw())
            }
            ResourceBinding::StorageImage(view) => Descriptor::Image(view.raw(), gfx_hal::image::Layout::General),
        };
        unsafe {
            device.write_descriptor_set(DescriptorSetWrite {
                set: &mut *set,
                binding: i as u32,
                array_offset: 0,
                descriptors: std::iter::once(descriptor),
            });
        }
    }
}
