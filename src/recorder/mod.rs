//! The recorder (spec §4.7): walks an invocation tree, opening and closing
//! command-buffer records as the walk crosses submission-class boundaries,
//! emitting barriers and device commands per node, and handing back a
//! [`Transaction`] once every record has been submitted. The teacher has no
//! equivalent — `graph/mod.rs` records exactly one fixed pass per frame — so
//! the chaining/bake algorithms below are authored directly from spec.md
//! §4.7 rather than adapted from existing code; the per-variant command
//! emission (copy/dispatch/draw/render-pass) follows `command.rs`'s
//! `GfxCommand` one-call-per-HAL-call style.

mod barrier;
mod bind;
pub(crate) mod timing;
mod transaction;

pub(crate) use timing::Timings;
pub use transaction::Transaction;

use std::iter;
use std::sync::Arc;

use gfx_hal::command::{
    BufferCopy, BufferImageCopy, CommandBuffer as _, CommandBufferFlags, CommandBufferInheritanceInfo, ImageCopy, Level, SubpassContents,
};
use gfx_hal::device::Device;
use gfx_hal::image::{Extent, Offset, SubresourceLayers};
use gfx_hal::pool::CommandPool as _;
use gfx_hal::queue::{CommandQueue as _, Submission};
use gfx_hal::Backend;
use log::warn;

use crate::compat::ToHalType;
use crate::context::{CommandPoolItem, Context, SubmitClass};
use crate::error::{Error, Label, Result};
use crate::invocation::{
    AttachmentView, CompositeChild, CompositeInvocation, ComputeInvocation, DrawCall, GraphicsInvocation, Invocation, PresentInvocation,
    RenderPassInvocation, TransferEndpoint, TransferInvocation,
};
use crate::pool::PoolItem;
use crate::render_pass::{AttachmentViewKey, FramebufferKey};
use crate::task::ResourceBinding;
use transaction::{PresentRecord, SubmitRecord};

/// Something a [`Transaction`] must keep alive until its GPU work has
/// retired: a leased descriptor set, a leased framebuffer, or a baked
/// subtree's own leases (transitively). Dropping a `Lease` returns the
/// underlying item to its pool, which is only safe once the fence guarding
/// the work that used it has signaled — [`Transaction::wait`] is the only
/// place that drops these.
pub(crate) enum Lease<B: Backend> {
    DescriptorSet(crate::context::DescriptorSetItem<B>),
    Framebuffer(PoolItem<FramebufferKey, crate::handle::Handle<B::Framebuffer, crate::context::Shared<B>>>),
    Baked(Baked<B>),
}

struct BakedInner<B: Backend> {
    label: Label,
    class: SubmitClass,
    pool: CommandPoolItem<B>,
    command: B::CommandBuffer,
    leases: Vec<Lease<B>>,
}

/// A secondary-level recording of a single invocation (spec §4.7's "bake"),
/// replayed with `execute_commands` wherever it appears as a
/// [`CompositeChild::Baked`]. `Arc`-backed so the same baked subtree can be
/// embedded in any number of invocation trees and survive as long as any of
/// them does; the secondary command buffer and everything it leased are only
/// released once the last reference drops.
pub struct Baked<B: Backend>(Arc<BakedInner<B>>);

impl<B: Backend> Clone for Baked<B> {
    fn clone(&self) -> Self {
        Baked(self.0.clone())
    }
}

impl<B: Backend> Baked<B> {
    pub fn label(&self) -> &str {
        &self.0.label
    }

    pub(crate) fn submit_class(&self) -> SubmitClass {
        self.0.class
    }

    pub(crate) fn raw(&self) -> &B::CommandBuffer {
        &self.0.command
    }
}

/// One open, not-yet-submitted command buffer mid-walk, plus the pool it was
/// allocated from and the semaphore (if any) it must wait on before
/// executing — the semaphore the record that preceded it in the chain
/// signaled.
struct OpenRecord<B: Backend> {
    class: SubmitClass,
    pool: CommandPoolItem<B>,
    command: B::CommandBuffer,
    wait_semaphore: Option<B::Semaphore>,
}

/// Mutable walk state threaded through one invocation tree's recording.
/// Produces a [`Transaction`] (primary-level walk, `record`) or a [`Baked`]
/// (secondary-level walk, `bake`).
struct Recording<B: Backend> {
    context: Arc<Context<B>>,
    default_class: SubmitClass,
    open: Option<OpenRecord<B>>,
    records: Vec<SubmitRecord<B>>,
    leases: Vec<Lease<B>>,
    timings: Option<Timings<B>>,
}

/// The submission class `Recording::ensure_class` should use for a
/// `requested` class: `requested` itself unless it's `Any`, in which case the
/// currently open back record's class (if one is open) or the walk's
/// default class. Factored out so the real resolution rule is directly
/// unit-testable without a live device.
fn resolve_class(requested: SubmitClass, open: Option<SubmitClass>, default: SubmitClass) -> SubmitClass {
    if requested == SubmitClass::Any {
        open.unwrap_or(default)
    } else {
        requested
    }
}

impl<B: Backend> Recording<B> {
    fn new(context: Arc<Context<B>>) -> Self {
        let default_class = context.default_class;
        Self {
            context,
            default_class,
            open: None,
            records: Vec::new(),
            leases: Vec::new(),
            timings: None,
        }
    }

    fn command_mut(&mut self) -> &mut B::CommandBuffer {
        &mut self.open.as_mut().expect("[recorder] no open command record").command
    }

    /// Resolves `requested` against the current back record (for `Any`),
    /// then ensures the back record's class matches, sealing and submitting
    /// the previous one (chained by a freshly created semaphore) if it
    /// doesn't, per spec.md §4.7's command-buffer selection rule.
    fn ensure_class(&mut self, requested: SubmitClass, label: &Label) -> Result<()> {
        let class = resolve_class(requested, self.open.as_ref().map(|o| o.class), self.default_class);
        if !self.context.supports(class) {
            return Err(Error::UnsupportedSubmitClass { label: label.clone(), class });
        }
        if let Some(open) = &self.open {
            if open.class == class {
                return Ok(());
            }
        }

        let wait = match self.open.take() {
            Some(mut open) => {
                unsafe { open.command.finish() };
                let device = self.context.device();
                let signal = unsafe { device.create_semaphore().map_err(|e| Error::gpu(label.clone(), e))? };
                let fence = unsafe { device.create_fence(false).map_err(|e| Error::gpu(label.clone(), e))? };
                let prev_class = open.class;
                let prev_wait = open.wait_semaphore.take();
                let command = &open.command;
                self.context
                    .with_queue(prev_class, |queue| unsafe {
                        let submission = Submission {
                            command_buffers: iter::once(command),
                            wait_semaphores: prev_wait.as_ref().map(|s| (s, gfx_hal::pso::PipelineStage::TOP_OF_PIPE)),
                            signal_semaphores: iter::once(&signal),
                        };
                        queue.submit(submission, Some(&fence));
                    })
                    .ok_or_else(|| Error::UnsupportedSubmitClass { label: label.clone(), class: prev_class })?;
                self.records.push(SubmitRecord {
                    class: prev_class,
                    pool: open.pool,
                    fence,
                    wait_semaphore: prev_wait,
                    signal_semaphore: None,
                });
                Some(signal)
            }
            None => None,
        };

        let pool = self.context.acquire_command_pool(class)?;
        self.open_new(class, pool, wait)
    }

    fn open_new(&mut self, class: SubmitClass, mut pool: CommandPoolItem<B>, wait_semaphore: Option<B::Semaphore>) -> Result<()> {
        let mut command = unsafe { pool.get_mut().get_mut().allocate_one(Level::Primary) };
        unsafe { command.begin_primary(CommandBufferFlags::ONE_TIME_SUBMIT) };
        self.open = Some(OpenRecord { class, pool, command, wait_semaphore });
        Ok(())
    }

    /// Seals whatever record is still open at the end of a (non-`Present`)
    /// walk: ends and submits it with a fence, signaling nothing further.
    fn finish(&mut self) -> Result<()> {
        if let Some(mut open) = self.open.take() {
            unsafe { open.command.finish() };
            let device = self.context.device();
            let fence = unsafe { device.create_fence(false).map_err(|e| Error::gpu("recorder", e))? };
            let class = open.class;
            let wait_semaphore = open.wait_semaphore.take();
            let command = &open.command;
            self.context
                .with_queue(class, |queue| unsafe {
                    let submission = Submission {
                        command_buffers: iter::once(command),
                        wait_semaphores: wait_semaphore.as_ref().map(|s| (s, gfx_hal::pso::PipelineStage::TOP_OF_PIPE)),
                        signal_semaphores: None,
                    };
                    queue.submit(submission, Some(&fence));
                })
                .ok_or_else(|| Error::UnsupportedSubmitClass { label: "recorder".into(), class })?;
            self.records.push(SubmitRecord {
                class,
                pool: open.pool,
                fence,
                wait_semaphore,
                signal_semaphore: None,
            });
        }
        Ok(())
    }

    /// Ends the secondary-level open record without submitting it — a baked
    /// command buffer is never submitted on its own, only replayed later via
    /// `execute_commands`.
    fn finish_secondary(mut self) -> Result<(CommandPoolItem<B>, B::CommandBuffer, Vec<Lease<B>>)> {
        let mut open = self.open.take().expect("[recorder] bake produced no open record");
        unsafe { open.command.finish() };
        Ok((open.pool, open.command, self.leases))
    }

    fn command_identity(&self) -> usize {
        self.open.as_ref().map(|o| &o.command as *const B::CommandBuffer as usize).unwrap_or(0)
    }

    /// Starts a timing span for `label` if `is_timed`, lazily minting this
    /// walk's query pool on first use. Returns `None` (and, for a genuinely
    /// timed node, warns) whenever timing can't happen — device lacks
    /// timestamp support, or the query pool is exhausted.
    fn begin_timing(&mut self, label: &Label, is_timed: bool) -> Option<(u32, usize)> {
        if !is_timed {
            return None;
        }
        if !self.context.supports_timestamp_queries() {
            warn!("[recorder] '{}' requested timing but this device has no timestamp support", label);
            return None;
        }
        if self.timings.is_none() {
            self.timings = Some(Timings::new(&self.context));
        }
        let open = self.open.as_mut().expect("[recorder] begin_timing with no open record");
        let identity = &open.command as *const B::CommandBuffer as usize;
        let slot = self.timings.as_mut().unwrap().begin(label, &mut open.command)?;
        Some((slot, identity))
    }

    /// Closes a timing span started by [`Recording::begin_timing`], warning
    /// (per spec.md §4.7 step 7) if it ended up writing the end timestamp
    /// into a different command buffer than the start one did.
    fn end_timing(&mut self, info: Option<(u32, usize)>) {
        if let Some((slot, identity)) = info {
            let open = self.open.as_mut().expect("[recorder] end_timing with no open record");
            let current = &open.command as *const B::CommandBuffer as usize;
            if current != identity {
                warn!("[recorder] a timed node's start and end timestamps landed in different command buffers");
            }
            self.timings.as_ref().unwrap().end(slot, &mut open.command);
        }
    }

    fn record_invocation(&mut self, invocation: &Invocation<B>) -> Result<()> {
        match invocation {
            Invocation::Transfer(i) => self.record_transfer(i),
            Invocation::Compute(i) => self.record_compute(i),
            Invocation::Graphics(i) => Err(Error::invalid_config(i.label.clone(), "a graphics invocation must be recorded as a RenderPass child, not standalone")),
            Invocation::RenderPass(i) => self.record_render_pass(i),
            Invocation::Composite(i) => self.record_composite(i),
            Invocation::Present(_) => unreachable!("[recorder] Present is handled by record() before a Recording is ever created"),
        }
    }

    fn record_transfer(&mut self, inv: &TransferInvocation<B>) -> Result<()> {
        self.ensure_class(inv.submit_class(), &inv.label)?;
        {
            let command = self.command_mut();
            barrier::emit_all::<B>(command, &inv.transitions());
        }
        let slot = self.begin_timing(&inv.label, inv.is_timed);
        {
            let command = self.command_mut();
            emit_transfer::<B>(command, &inv.src, &inv.dst, inv.size);
        }
        self.end_timing(slot);
        Ok(())
    }

    fn record_compute(&mut self, inv: &ComputeInvocation<B>) -> Result<()> {
        self.ensure_class(inv.submit_class(), &inv.label)?;
        {
            let command = self.command_mut();
            barrier::emit_all::<B>(command, &inv.transitions());
        }
        let slot = self.begin_timing(&inv.label, inv.is_timed);

        let mut set = self.context.acquire_descriptor_set(inv.task.rsc_tys());
        bind::write(&self.context, set.get_mut(), &inv.bindings);
        {
            let (x, y, z) = inv.workgroup_count;
            let command = self.command_mut();
            unsafe {
                command.bind_compute_pipeline(inv.task.pipeline());
                command.bind_compute_descriptor_sets(inv.task.layout(), 0, iter::once(set.get()), iter::empty());
                command.dispatch([x, y, z]);
            }
        }
        self.end_timing(slot);
        self.leases.push(Lease::DescriptorSet(set));
        Ok(())
    }

    /// Emits a child draw's descriptor/vertex/index binds and the draw call
    /// itself. Called only from inside an active render-pass instance; the
    /// child's barriers were already emitted ahead of `begin_render_pass` by
    /// [`Recording::record_render_pass`], since barriers are illegal inside
    /// one.
    fn record_graphics_child(&mut self, inv: &GraphicsInvocation<B>) -> Result<()> {
        let slot = self.begin_timing(&inv.label, inv.is_timed);

        let mut set = self.context.acquire_descriptor_set(inv.task.rsc_tys());
        bind::write(&self.context, set.get_mut(), &inv.bindings);
        {
            let command = self.command_mut();
            unsafe {
                command.bind_graphics_pipeline(inv.task.pipeline());
                command.bind_graphics_descriptor_sets(inv.task.layout(), 0, iter::once(set.get()), iter::empty());
                for (binding, view) in inv.vertex_buffers.iter().enumerate() {
                    command.bind_vertex_buffers(
                        binding as u32,
                        iter::once((view.buffer.raw(), gfx_hal::buffer::SubRange { offset: view.offset, size: Some(view.size) })),
                    );
                }
                match &inv.draw {
                    DrawCall::Indexed { indices, index_type, index_count } => {
                        command.bind_index_buffer(
                            indices.buffer.raw(),
                            gfx_hal::buffer::SubRange { offset: indices.offset, size: Some(indices.size) },
                            index_type.convert(),
                        );
                        command.draw_indexed(0..*index_count, 0, 0..inv.instance_count);
                    }
                    DrawCall::Vertices { vertex_count } => {
                        command.draw(0..*vertex_count, 0..inv.instance_count);
                    }
                }
            }
        }
        self.end_timing(slot);
        self.leases.push(Lease::DescriptorSet(set));
        Ok(())
    }

    fn record_render_pass(&mut self, inv: &RenderPassInvocation<B>) -> Result<()> {
        self.ensure_class(inv.submit_class(), &inv.label)?;

        for attachment in &inv.attachments {
            if let AttachmentView::Swapchain(swapchain) = attachment {
                swapchain.ensure_acquired()?;
            }
        }

        {
            let command = self.command_mut();
            barrier::emit_all::<B>(command, &inv.transitions());
            // Barriers for every child's bindings/vertex/index buffers must
            // land before the render pass opens — pipeline barriers are not
            // legal inside one.
            for child in &inv.children {
                barrier::emit_all::<B>(command, &child.transitions());
            }
        }

        let slot = self.begin_timing(&inv.label, inv.is_timed);

        let view_key: AttachmentViewKey = inv.attachments.iter().map(attachment_identity::<B>).collect();
        let raw_views: Vec<&B::ImageView> = inv.attachments.iter().map(attachment_raw_view::<B>).collect();
        let framebuffer = inv.render_pass.acquire_framebuffer(view_key, raw_views);
        let (width, height) = inv.render_pass.dimensions();
        let render_area = gfx_hal::pso::Rect { x: 0, y: 0, w: width as i16, h: height as i16 };
        let clear_values: Vec<gfx_hal::command::ClearValue> = inv.render_pass.clear_values().iter().map(|c| c.convert()).collect();

        {
            let command = self.command_mut();
            unsafe {
                command.begin_render_pass(inv.render_pass.raw(), framebuffer.get().get(), render_area, clear_values, SubpassContents::Inline);
            }
        }

        for child in &inv.children {
            self.record_graphics_child(child)?;
        }

        {
            let command = self.command_mut();
            unsafe { command.end_render_pass() };
        }

        self.end_timing(slot);
        self.leases.push(Lease::Framebuffer(framebuffer));
        Ok(())
    }

    fn record_composite(&mut self, inv: &CompositeInvocation<B>) -> Result<()> {
        let slot = self.begin_timing(&inv.label, inv.is_timed);
        for child in &inv.children {
            self.record_composite_child(child)?;
        }
        self.end_timing(slot);
        Ok(())
    }

    fn record_composite_child(&mut self, child: &CompositeChild<B>) -> Result<()> {
        match child {
            CompositeChild::Transfer(i) => self.record_transfer(i),
            CompositeChild::Compute(i) => self.record_compute(i),
            CompositeChild::RenderPass(i) => self.record_render_pass(i),
            CompositeChild::Composite(i) => self.record_composite(i),
            CompositeChild::Baked(baked) => self.record_baked(baked),
        }
    }

    fn record_baked(&mut self, baked: &Baked<B>) -> Result<()> {
        self.ensure_class(baked.submit_class(), &Label::from(baked.label().to_string()))?;
        let command = self.command_mut();
        unsafe { command.execute_commands(iter::once(baked.raw())) };
        self.leases.push(Lease::Baked(baked.clone()));
        Ok(())
    }

    fn into_transaction(self) -> Transaction<B> {
        Transaction::new(self.context, self.records, self.timings.into_iter().collect(), self.leases)
    }
}

fn attachment_raw_view<B: Backend>(view: &AttachmentView<B>) -> &B::ImageView {
    match view {
        AttachmentView::Color(v) => v.raw(),
        AttachmentView::Depth(v) => v.raw(),
        AttachmentView::Swapchain(sc) => sc.current_raw_view(),
    }
}

fn attachment_identity<B: Backend>(view: &AttachmentView<B>) -> usize {
    attachment_raw_view::<B>(view) as *const B::ImageView as usize
}

/// Dispatches a transfer to the matching HAL copy call based on which kind
/// of view each endpoint is. A zero-size transfer is a no-op (warned, not
/// an error) per spec.md §8's boundary behavior.
fn emit_transfer<B: Backend>(command: &mut B::CommandBuffer, src: &TransferEndpoint<B>, dst: &TransferEndpoint<B>, size: u64) {
    if size == 0 {
        warn!("[recorder] ignoring zero-size transfer");
        return;
    }
    let aspects = gfx_hal::format::Aspects::COLOR;
    let layers = SubresourceLayers { aspects, level: 0, layers: 0..1 };
    let origin = Offset { x: 0, y: 0, z: 0 };

    match (src, dst) {
        (TransferEndpoint::Buffer(s), TransferEndpoint::Buffer(d)) => unsafe {
            command.copy_buffer(s.buffer.raw(), d.buffer.raw(), iter::once(BufferCopy { src: s.offset, dst: d.offset, size }));
        },
        (TransferEndpoint::Buffer(s), TransferEndpoint::Image(d)) => unsafe {
            command.copy_buffer_to_image(
                s.buffer.raw(),
                d.image.raw(),
                gfx_hal::image::Layout::TransferDstOptimal,
                iter::once(BufferImageCopy {
                    buffer_offset: s.offset,
                    buffer_width: 0,
                    buffer_height: 0,
                    image_layers: layers,
                    image_offset: origin,
                    image_extent: Extent { width: d.image.width(), height: d.image.height(), depth: d.image.depth().max(1) },
                }),
            );
        },
        (TransferEndpoint::Image(s), TransferEndpoint::Buffer(d)) => unsafe {
            command.copy_image_to_buffer(
                s.image.raw(),
                gfx_hal::image::Layout::TransferSrcOptimal,
                d.buffer.raw(),
                iter::once(BufferImageCopy {
                    buffer_offset: d.offset,
                    buffer_width: 0,
                    buffer_height: 0,
                    image_layers: layers,
                    image_offset: origin,
                    image_extent: Extent { width: s.image.width(), height: s.image.height(), depth: s.image.depth().max(1) },
                }),
            );
        },
        (TransferEndpoint::Image(s), TransferEndpoint::Image(d)) => unsafe {
            command.copy_image(
                s.image.raw(),
                gfx_hal::image::Layout::TransferSrcOptimal,
                d.image.raw(),
                gfx_hal::image::Layout::TransferDstOptimal,
                iter::once(ImageCopy {
                    src_subresource: layers.clone(),
                    src_offset: origin,
                    dst_subresource: layers,
                    dst_offset: origin,
                    extent: Extent { width: s.image.width(), height: s.image.height(), depth: s.image.depth().max(1) },
                }),
            );
        },
    }
}

/// Present is the one invocation kind that can only ever be the root of a
/// tree (`CompositeChild` has no `Present` variant), so it never shares a
/// `Recording`'s open-record/semaphore-chain state with any other node —
/// it is handled entirely outside that machinery, reusing
/// `Swapchain::allocate_command_buffer`/`Swapchain::present` exactly as
/// their doc comments describe (spec.md §4.7 step 1). Returns a frozen
/// `Transaction` tracking the present-submit fence and the next-acquire
/// fence the swapchain produced, so `Transaction::wait`/`is_done` have real
/// completion signals to check instead of a transaction with no records.
fn record_present<B: Backend>(context: &Arc<Context<B>>, inv: &PresentInvocation<B>) -> Result<Transaction<B>> {
    inv.swapchain.ensure_acquired()?;

    let mut command = inv.swapchain.allocate_command_buffer();
    unsafe { command.begin_primary(CommandBufferFlags::ONE_TIME_SUBMIT) };
    barrier::emit_all::<B>(&mut command, &inv.transitions());
    unsafe { command.finish() };

    let (frame, _state) = inv.swapchain.take_current();
    let submit_frame_idx = frame.frame_idx;
    context
        .with_queue(inv.submit_class(), |queue| inv.swapchain.present(frame, command, queue))
        .ok_or_else(|| Error::UnsupportedSubmitClass { label: inv.label.clone(), class: inv.submit_class() })?;

    // "acquire the next image" (spec.md §4.7 step 1) so the swapchain's
    // current-frame dyn-detail is ready for whatever render pass attaches to
    // it next.
    inv.swapchain.ensure_acquired()?;
    let acquire_frame_idx = inv.swapchain.current_frame_idx();

    Ok(Transaction::new_present(
        context.clone(),
        PresentRecord {
            swapchain: inv.swapchain.clone(),
            submit_frame_idx,
            acquire_frame_idx,
        },
    ))
}

/// Records `invocation` at primary level, submitting every command buffer
/// the walk had to open, and returns the resulting [`Transaction`].
pub fn record<B: Backend>(context: &Arc<Context<B>>, invocation: Invocation<B>) -> Result<Transaction<B>> {
    if let Invocation::Present(present) = &invocation {
        return record_present(context, present);
    }
    let mut recording = Recording::new(context.clone());
    recording.record_invocation(&invocation)?;
    recording.finish()?;
    Ok(recording.into_transaction())
}

/// Validates the bake-ability rule spec.md §4.7 states literally: no render
/// pass anywhere in the subtree, and — for a Composite — every child shares
/// one concrete submission class. Returns that class on success.
fn check_bakeable<B: Backend>(invocation: &Invocation<B>) -> Result<SubmitClass> {
    match invocation {
        Invocation::Present(i) => Err(Error::invalid_config(i.label.clone(), "a present invocation cannot be baked")),
        Invocation::RenderPass(i) => Err(Error::invalid_config(i.label.clone(), "a render pass cannot be baked")),
        Invocation::Graphics(i) => Err(Error::invalid_config(i.label.clone(), "a standalone graphics invocation cannot be baked")),
        Invocation::Transfer(i) => Ok(i.submit_class()),
        Invocation::Compute(i) => Ok(i.submit_class()),
        Invocation::Composite(i) => check_bakeable_composite(i),
    }
}

fn check_bakeable_composite<B: Backend>(composite: &CompositeInvocation<B>) -> Result<SubmitClass> {
    let class = composite.submit_class();
    if class == SubmitClass::Any {
        return Err(Error::invalid_config(
            composite.label.clone(),
            "a composite with no concrete submission class cannot be baked",
        ));
    }
    for child in &composite.children {
        match child {
            CompositeChild::RenderPass(i) => {
                return Err(Error::invalid_config(i.label.clone(), "a composite containing a render pass cannot be baked"))
            }
            CompositeChild::Baked(_) => {
                return Err(Error::invalid_config(composite.label.clone(), "a composite containing a baked subtree cannot be baked again"))
            }
            CompositeChild::Composite(nested) => {
                check_bakeable_composite(nested)?;
            }
            CompositeChild::Transfer(_) | CompositeChild::Compute(_) => {}
        }
    }
    Ok(class)
}

/// Records `invocation` at secondary level into a reusable command buffer
/// (spec.md §4.7's "bake"), rejecting it first if it doesn't satisfy
/// [`check_bakeable`].
pub fn bake<B: Backend>(context: &Arc<Context<B>>, invocation: Invocation<B>) -> Result<Baked<B>> {
    let class = check_bakeable(&invocation)?;
    let label: Label = invocation.label().to_string().into();

    let mut pool = context.acquire_command_pool(class)?;
    let mut command = unsafe { pool.get_mut().get_mut().allocate_one(Level::Secondary) };
    unsafe {
        command.begin_secondary(
            CommandBufferFlags::empty(),
            CommandBufferInheritanceInfo {
                subpass: None,
                framebuffer: None,
                occlusion_query_enable: false,
                occlusion_query_flags: gfx_hal::query::ControlFlags::empty(),
                pipeline_statistics: gfx_hal::query::PipelineStatistic::empty(),
            },
        );
    }

    let mut recording = Recording::new(context.clone());
    recording.open = Some(OpenRecord { class, pool, command, wait_semaphore: None });
    recording.record_invocation(&invocation)?;
    let (pool, command, leases) = recording.finish_secondary()?;

    Ok(Baked(Arc::new(BakedInner { label, class, pool, command, leases })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_class_reuses_back_record_when_one_is_open() {
        assert_eq!(
            resolve_class(SubmitClass::Any, Some(SubmitClass::Compute), SubmitClass::Graphics),
            SubmitClass::Compute
        );
    }

    #[test]
    fn any_class_falls_back_to_default_when_chain_is_empty() {
        assert_eq!(resolve_class(SubmitClass::Any, None, SubmitClass::Graphics), SubmitClass::Graphics);
    }

    #[test]
    fn concrete_class_is_used_verbatim_even_with_a_different_record_open() {
        assert_eq!(
            resolve_class(SubmitClass::Transfer, Some(SubmitClass::Compute), SubmitClass::Graphics),
            SubmitClass::Transfer
        );
    }
}
