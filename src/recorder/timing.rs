//! Optional per-invocation GPU timestamp queries (spec §4.6's `is_timed`
//! flag). A record's query pool is minted lazily, sized to a fixed capacity;
//! running past that capacity degrades to "not timed" for the overflow node
//! with a warning rather than failing the transaction, since timing is
//! diagnostic, not load-bearing. No equivalent exists in the teacher; this is
//! authored directly from the query/timestamp calls every gfx-hal backend
//! exposes (`create_query_pool`, `write_timestamp`, `get_query_pool_results`).

use std::sync::atomic::{AtomicU32, Ordering};

use gfx_hal::command::CommandBuffer;
use gfx_hal::device::Device;
use gfx_hal::query;
use gfx_hal::Backend;
use log::warn;

use crate::context::{Context, QueryPoolItem};
use crate::error::Label;

/// Two timestamps (start, end) per timed node; a query pool holds this many
/// pairs before a record must degrade further nodes to untimed.
const MAX_TIMED_NODES_PER_RECORD: u32 = 32;
pub(crate) const QUERY_POOL_SIZE: u32 = MAX_TIMED_NODES_PER_RECORD * 2;

/// Per-record accumulator of timestamp queries. One `Timings` lives as long
/// as the [`super::Recording`] that owns it; its pool is released back to the
/// context's pool manager on drop like any other leased `PoolItem`.
pub(crate) struct Timings<B: Backend> {
    pool: QueryPoolItem<B>,
    next: AtomicU32,
    entries: Vec<(Label, u32)>,
    period_ns: f32,
}

impl<B: Backend> Timings<B> {
    pub(crate) fn new(context: &std::sync::Arc<Context<B>>) -> Self {
        let pool = context.acquire_query_pool();
        Self {
            pool,
            next: AtomicU32::new(0),
            entries: Vec::new(),
            period_ns: context.timestamp_period(),
        }
    }

    /// Reserves the next (start, end) query pair for `label`, writing the
    /// start timestamp into `command`. Returns `None` once the pool's fixed
    /// capacity is exhausted, in which case the caller should skip `end` too
    /// and treat the node as untimed.
    pub(crate) fn begin(&mut self, label: &Label, command: &mut B::CommandBuffer) -> Option<u32> {
        let slot = self.next.fetch_add(2, Ordering::SeqCst);
        if slot + 1 >= QUERY_POOL_SIZE {
            warn!("[Timings] query pool exhausted, '{}' will not be timed", label);
            return None;
        }
        self.entries.push((label.clone(), slot));
        unsafe {
            command.write_timestamp(gfx_hal::pso::PipelineStage::TOP_OF_PIPE, query::Query { pool: self.pool.get().get(), id: slot });
        }
        Some(slot)
    }

    /// Writes the end timestamp for the pair `begin` returned.
    pub(crate) fn end(&self, slot: u32, command: &mut B::CommandBuffer) {
        unsafe {
            command.write_timestamp(gfx_hal::pso::PipelineStage::BOTTOM_OF_PIPE, query::Query { pool: self.pool.get().get(), id: slot + 1 });
        }
    }

    /// Resolves every recorded pair into microseconds, once the owning
    /// transaction's fences are known signaled. Returns `(label, time_us)`
    /// pairs in recording order; a pair whose readback isn't available yet
    /// (the device returned `NotReady`) is dropped with a warning rather than
    /// failing the whole resolution.
    pub(crate) fn resolve(&self, device: &B::Device) -> Vec<(Label, u64)> {
        let mut out = Vec::with_capacity(self.entries.len());
        for (label, slot) in &self.entries {
            let mut data = [0u8; 16];
            let result = unsafe {
                device.get_query_pool_results(
                    self.pool.get().get(),
                    *slot..*slot + 2,
                    &mut data,
                    8,
                    query::ResultFlags::WAIT | query::ResultFlags::BITS_64,
                )
            };
            match result {
                Ok(true) => {
                    let start = u64::from_ne_bytes(data[0..8].try_into().unwrap());
                    let end = u64::from_ne_bytes(data[8..16].try_into().unwrap());
                    let ns = (end.saturating_sub(start)) as f32 * self.period_ns;
                    out.push((label.clone(), (ns / 1000.0) as u64));
                }
                Ok(false) => warn!("[Timings] query results for '{}' not ready, dropping", label),
                Err(e) => warn!("[Timings] failed to read query results for '{}': {:?}", label, e),
            }
        }
        out
    }
}
