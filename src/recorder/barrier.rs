//! Barrier emission (spec §4.7): resolves an invocation's [`Transition`] list
//! against each resource's current dynamic state, emitting a
//! `pipeline_barrier` only where the destination state actually differs from
//! the resource's current one, and updating the resource's tracked state
//! either way. The teacher has no equivalent (its single render pass in
//! `graph/mod.rs` never tracks synchronization state), so this is authored
//! directly from the `(stage, access[, layout])` tables in `state.rs`.

use std::ops::Range;

use gfx_hal::command::CommandBuffer as _;
use gfx_hal::memory::{Barrier, Dependencies};
use gfx_hal::Backend;

use crate::compat::ToHalType;
use crate::invocation::{Transition, TransitionTarget};
use crate::state::{buffer_destination, image_destination, ImageState, PipelineStage};

fn stage_range(src: PipelineStage, dst: PipelineStage) -> Range<gfx_hal::pso::PipelineStage> {
    src.convert()..dst.convert()
}

fn emit_image_barrier<B: Backend>(command: &mut B::CommandBuffer, cur: ImageState, dest: ImageState, target: &B::Image, aspects: gfx_hal::format::Aspects) {
    let barrier = Barrier::Image {
        states: (cur.access.convert(), cur.layout.convert())..(dest.access.convert(), dest.layout.convert()),
        target,
        families: None,
        range: gfx_hal::image::SubresourceRange {
            aspects,
            level_start: 0,
            level_count: None,
            layer_start: 0,
            layer_count: None,
        },
    };
    unsafe {
        command.pipeline_barrier(stage_range(cur.stage, dest.stage), Dependencies::empty(), std::iter::once(barrier));
    }
}

/// Resolves `transition`'s usage to a destination state, compares it against
/// the targeted resource's current state, and emits a barrier + updates the
/// tracked state if they differ. A no-op if the resource is already in the
/// requested state.
///
/// [`TransitionTarget::Swapchain`] is bookkeeping-only: `SwapchainImage` only
/// implements `Borrow<B::ImageView>`, not `Borrow<B::Image>`, so a real image
/// barrier has no handle to target. The presentation engine performs the
/// actual layout transition implicitly during `queue.present()`; real-world
/// gfx-hal code (e.g. the `quad` example) never issues a manual barrier for a
/// swapchain image either, instead declaring the render pass attachment's
/// final layout as `Present` directly.
pub(crate) fn emit<B: Backend>(command: &mut B::CommandBuffer, transition: &Transition<'_, B>) {
    match &transition.target {
        TransitionTarget::Buffer(view) => {
            let dest = buffer_destination(transition.usage);
            let cur = view.buffer.state();
            if cur == dest {
                return;
            }
            let barrier = Barrier::Buffer {
                states: cur.access.convert()..dest.access.convert(),
                target: view.buffer.raw(),
                families: None,
                range: gfx_hal::buffer::SubRange {
                    offset: view.offset,
                    size: Some(view.size),
                },
            };
            unsafe {
                command.pipeline_barrier(stage_range(cur.stage, dest.stage), Dependencies::empty(), std::iter::once(barrier));
            }
            view.buffer.set_state(dest);
        }
        TransitionTarget::Image(view) => {
            let dest = image_destination(transition.usage);
            let cur = view.image.state();
            if cur == dest {
                return;
            }
            emit_image_barrier::<B>(command, cur, dest, view.image.raw(), gfx_hal::format::Aspects::COLOR);
            view.image.set_state(dest);
        }
        TransitionTarget::DepthImage(view) => {
            let dest = image_destination(transition.usage);
            let cur = view.image.state();
            if cur == dest {
                return;
            }
            emit_image_barrier::<B>(command, cur, dest, view.image.raw(), view.image.aspects());
            view.image.set_state(dest);
        }
        TransitionTarget::Swapchain(swapchain) => {
            let dest = image_destination(transition.usage);
            if swapchain.current_state() != dest {
                swapchain.set_current_state(dest);
            }
        }
    }
}

/// Emits barriers for every transition an invocation requires, in list order.
pub(crate) fn emit_all<B: Backend>(command: &mut B::CommandBuffer, transitions: &[Transition<'_, B>]) {
    for transition in transitions {
        emit(command, transition);
    }
}
