//! The result of [`super::record`]: one [`SubmitRecord`] per command buffer
//! the recorder had to open (a transaction spans more than one only when an
//! invocation tree switches submission class mid-walk, spec §4.7), chained by
//! per-record semaphores and each guarded by its own fence. Grounded in
//! `swapper.rs`'s fence-per-frame idiom, generalized from one fixed fence to
//! a variable-length chain.

use std::collections::HashMap;
use std::sync::Arc;

use gfx_hal::device::{Device, WaitFor};
use gfx_hal::pool::CommandPool as _;
use gfx_hal::Backend;
use log::warn;

use super::{Lease, Timings};
use crate::context::{CommandPoolItem, Context, SubmitClass};
use crate::error::{Error, Label, Result};
use crate::swapchain::Swapchain;

const WAIT_TIMEOUT_NS: u64 = 5_000_000_000;

/// One submitted command buffer: the pool it was allocated from (held so the
/// pool isn't recycled out from under an in-flight buffer), its fence, and
/// whether it has already been observed signaled.
pub(crate) struct SubmitRecord<B: Backend> {
    pub(crate) class: SubmitClass,
    pub(crate) pool: CommandPoolItem<B>,
    pub(crate) fence: B::Fence,
    pub(crate) wait_semaphore: Option<B::Semaphore>,
    pub(crate) signal_semaphore: Option<B::Semaphore>,
}

/// The two fences a recorded `Present` invocation produces (spec.md §4.7
/// step 1: "submit with a fresh fence ... acquire the next image with
/// another fresh fence ... return both fences") — tracked by delegating to
/// the `Swapchain`'s own frame-in-flight fences rather than owning them,
/// since those fences are recycled internally by `Swapchain::acquire` and
/// must never be destroyed by a `Transaction`.
pub(crate) struct PresentRecord<B: Backend> {
    pub(crate) swapchain: Arc<Swapchain<B>>,
    pub(crate) submit_frame_idx: usize,
    pub(crate) acquire_frame_idx: usize,
}

/// A recorded, submitted invocation tree. Dropping a `Transaction` without
/// calling [`Transaction::wait`] first blocks in `Drop` instead — command
/// pools and descriptor sets it leased must not be recycled while the GPU
/// might still be reading them.
pub struct Transaction<B: Backend> {
    context: Arc<Context<B>>,
    records: Vec<SubmitRecord<B>>,
    /// Pool items (descriptor sets, framebuffers, baked subtrees) this
    /// transaction's recording leased; released only from `wait`, once every
    /// record's fence is confirmed signaled — see [`Lease`]'s own doc comment
    /// for why this can't happen any earlier.
    leases: Vec<Lease<B>>,
    /// Per-record timestamp-query accumulators, resolved into `results` by
    /// `wait` and dropped immediately after (releasing their query pool
    /// leases in turn).
    timings: Vec<Timings<B>>,
    /// Set only for the `Transaction` returned by recording a `Present`
    /// invocation, which has no `SubmitRecord`s of its own (see
    /// [`Transaction::new_present`]).
    present: Option<PresentRecord<B>>,
    results: HashMap<Label, u64>,
    waited: bool,
}

impl<B: Backend> Transaction<B> {
    pub(crate) fn new(context: Arc<Context<B>>, records: Vec<SubmitRecord<B>>, timings: Vec<Timings<B>>, leases: Vec<Lease<B>>) -> Self {
        Self {
            context,
            records,
            leases,
            timings,
            present: None,
            results: HashMap::new(),
            waited: false,
        }
    }

    /// A frozen `Transaction` for a recorded `Present` invocation, tracking
    /// the present-submit and next-acquire fences the swapchain itself owns
    /// (spec.md §4.7 step 1).
    pub(crate) fn new_present(context: Arc<Context<B>>, present: PresentRecord<B>) -> Self {
        Self {
            context,
            records: Vec::new(),
            leases: Vec::new(),
            timings: Vec::new(),
            present: Some(present),
            results: HashMap::new(),
            waited: false,
        }
    }

    /// Non-blocking completion check: every record's fence signaled, and —
    /// for a `Present` transaction — both the present-submit and
    /// next-acquire fences.
    pub fn is_done(&self) -> bool {
        let device = self.context.device();
        let records_done = self.records.iter().all(|r| unsafe { device.get_fence_status(&r.fence) }.unwrap_or(false));
        let present_done = self
            .present
            .as_ref()
            .map_or(true, |p| p.swapchain.frame_fence_signaled(p.submit_frame_idx) && p.swapchain.frame_fence_signaled(p.acquire_frame_idx));
        records_done && present_done
    }

    /// Blocks until every record's fence is signaled (retrying on timeout
    /// rather than giving up, per spec §7's "fence waits are retried
    /// internally until success"), then resets each record's command pool
    /// (all buffers allocated from it become recyclable again), resolves any
    /// GPU timing queries, and releases every leased pool item — all per
    /// spec §4.7. For a `Present` transaction, also waits on the
    /// present-submit and next-acquire fences the swapchain owns.
    pub fn wait(&mut self) -> Result<()> {
        if self.waited {
            return Ok(());
        }
        let device = self.context.device();
        let fences: Vec<&B::Fence> = self.records.iter().map(|r| &r.fence).collect();
        if !fences.is_empty() {
            loop {
                match unsafe { device.wait_for_fences(fences.iter().copied(), WaitFor::All, WAIT_TIMEOUT_NS) } {
                    Ok(true) => break,
                    Ok(false) => continue,
                    Err(e) => return Err(Error::gpu("transaction", e)),
                }
            }
        }
        if let Some(present) = &self.present {
            present.swapchain.wait_frame_fence(present.submit_frame_idx)?;
            present.swapchain.wait_frame_fence(present.acquire_frame_idx)?;
        }
        for record in self.records.iter_mut() {
            unsafe { record.pool.get_mut().get_mut().reset(false) };
        }
        for timing in self.timings.drain(..) {
            self.results.extend(timing.resolve(device));
        }
        // Safe to recycle now: the fences above confirm the GPU work that
        // used these descriptor sets / framebuffers / baked buffers has
        // retired.
        self.leases.clear();
        self.present = None;
        self.waited = true;
        Ok(())
    }

    /// Time, in microseconds, the invocation labeled `label` took, if it was
    /// recorded with `is_timed` and the device supports timestamp queries and
    /// `wait` has resolved it. Returns `0` otherwise — spec §7 downgrades
    /// `TimingUnsupported` to a warning rather than an error, and has
    /// `get_time_us` simply report `0` in that case.
    pub fn get_time_us(&self, label: &str) -> u64 {
        self.results.get(label).copied().unwrap_or(0)
    }
}

impl<B: Backend> Drop for Transaction<B> {
    fn drop(&mut self) {
        if !self.waited {
            warn!("[Transaction] dropped without Transaction::wait; blocking in Drop to avoid recycling in-flight resources");
            let _ = self.wait();
        }
        let device = self.context.device();
        for record in self.records.drain(..) {
            unsafe { device.destroy_fence(record.fence) };
            if let Some(sem) = record.wait_semaphore {
                unsafe { device.destroy_semaphore(sem) };
            }
            if let Some(sem) = record.signal_semaphore {
                unsafe { device.destroy_semaphore(sem) };
            }
        }
    }
}
