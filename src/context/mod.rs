//! The `Context`: device + queues-per-class + sampler cache +
//! descriptor-set-layout cache + pool managers + allocator handle (spec
//! §4.4). Grounded in `context.rs`'s `GfxContext<B>`/`Queues<B>`, generalized
//! from its two hard-coded queues (graphics, compute) to the five-class
//! selection rule and from its single descriptor-set `Pool<B>` to the four
//! pool-manager instantiations of §4.2.

mod builder;
mod descriptor;
mod queues;

pub use builder::{ContextBuilder, ContextConfig, InstanceConfig, SurfaceConfig};
pub use queues::SubmitClass;

use std::collections::HashMap;
use std::sync::Arc;

use gfx_hal::device::Device;
use gfx_hal::Backend;
use parking_lot::Mutex;

use crate::allocator::GpuAllocator;
use crate::binding::ResourceType;
use crate::error::{Error, Label, Result};
use crate::handle::{Destroy, Handle};
use crate::pool::PoolManager;
use crate::resource::sampler::{Sampler, SamplerKey};
use descriptor::DescriptorPoolLanes;
use queues::Queues;

/// The pieces of a `Context` that individual resources (`Buffer`, `Image`,
/// ...) need to hold onto in order to destroy themselves and to map/bind
/// memory. Kept separate from `Context` itself so a `Buffer`/`Image` doesn't
/// drag the whole Context (queues, caches, pools) along for the ride.
pub struct Shared<B: Backend> {
    pub(crate) device: Arc<B::Device>,
    pub(crate) allocator: Arc<dyn GpuAllocator<B>>,
}

impl<B: Backend> std::fmt::Debug for Shared<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared").finish()
    }
}

struct DescriptorLayoutEntry<B: Backend> {
    handle: Handle<B::DescriptorSetLayout, Shared<B>>,
}

impl<B: Backend> Destroy<B::DescriptorSetLayout> for Shared<B> {
    fn destroy(&self, value: B::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(value) };
    }
}

impl<B: Backend> Destroy<B::CommandPool> for Shared<B> {
    fn destroy(&self, value: B::CommandPool) {
        unsafe { self.device.destroy_command_pool(value) };
    }
}

impl<B: Backend> Destroy<B::QueryPool> for Shared<B> {
    fn destroy(&self, value: B::QueryPool) {
        unsafe { self.device.destroy_query_pool(value) };
    }
}

impl<B: Backend> Destroy<B::Framebuffer> for Shared<B> {
    fn destroy(&self, value: B::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(value) };
    }
}

/// A command pool leased from the `SubmitClass`-keyed pool, reset (all
/// buffers recyclable) each time it's (re)acquired per spec §4.2.
pub(crate) type CommandPoolItem<B> = crate::pool::PoolItem<SubmitClass, Handle<<B as Backend>::CommandPool, Shared<B>>>;

/// A descriptor set leased from the resource-type-sequence-keyed pool.
pub(crate) type DescriptorSetItem<B> = crate::pool::PoolItem<Vec<ResourceType>, <B as Backend>::DescriptorSet>;

/// Framebuffers are keyed by (render-pass id, attachment-view ids); the
/// render-pass/recorder modules own the concrete key type, so this alias is
/// generic over it.
pub(crate) type FramebufferPool<B, K> = PoolManager<K, Handle<<B as Backend>::Framebuffer, Shared<B>>>;

/// A timestamp query pool leased from the unit-keyed pool (spec §4.2: one
/// bucket, every lease the same size).
pub(crate) type QueryPoolItem<B> = crate::pool::PoolItem<(), Handle<<B as Backend>::QueryPool, Shared<B>>>;

/// Device + queues-per-class + caches + pool managers + allocator handle.
pub struct Context<B: Backend> {
    pub(crate) shared: Arc<Shared<B>>,
    pub(crate) adapter: Arc<gfx_hal::adapter::Adapter<B>>,
    pub(crate) queues: Queues<B>,
    pub(crate) default_class: SubmitClass,

    pub(crate) command_pools: Arc<PoolManager<SubmitClass, Handle<B::CommandPool, Shared<B>>>>,
    pub(crate) query_pools: Arc<PoolManager<(), Handle<B::QueryPool, Shared<B>>>>,

    descriptor_layouts: Mutex<HashMap<Vec<ResourceType>, DescriptorLayoutEntry<B>>>,
    descriptor_lanes: DescriptorPoolLanes<B>,
    pub(crate) descriptor_sets: Arc<PoolManager<Vec<ResourceType>, B::DescriptorSet>>,

    samplers: HashMap<SamplerKey, Sampler<B>>,

    /// Stored opaquely per spec §4.4 — surface creation from this value is
    /// per-platform glue this crate does not implement.
    surface: SurfaceConfig,
}

impl<B: Backend> Context<B> {
    pub fn label(&self) -> &'static str {
        "context"
    }

    pub fn supports(&self, class: SubmitClass) -> bool {
        self.queues.supports(class)
    }

    pub fn sampler(&self, key: SamplerKey) -> &Sampler<B> {
        self.samplers.get(&key).expect("[Context] sampler cache missing a required key")
    }

    pub fn allocator(&self) -> &Arc<dyn GpuAllocator<B>> {
        &self.shared.allocator
    }

    /// The opaque surface handle this `Context` was constructed with.
    pub fn surface(&self) -> &SurfaceConfig {
        &self.surface
    }

    pub(crate) fn shared(&self) -> &Arc<Shared<B>> {
        &self.shared
    }

    pub(crate) fn device(&self) -> &Arc<B::Device> {
        &self.shared.device
    }

    /// Ensures the descriptor-set layout for `tys` is cached, creating it on
    /// first use. The cache is append-only per spec §5: once created, a
    /// layout lives until the Context is dropped.
    pub(crate) fn ensure_descriptor_layout(&self, tys: &[ResourceType], label: &Label) -> Result<()> {
        use crate::compat::ToHalType;

        if self.descriptor_layouts.lock().contains_key(tys) {
            return Ok(());
        }
        let bindings: Vec<gfx_hal::pso::DescriptorSetLayoutBinding> =
            tys.iter().enumerate().map(|(i, ty)| (i, *ty).convert()).collect();
        let raw = unsafe {
            self.shared
                .device
                .create_descriptor_set_layout(bindings.as_slice(), &[])
                .map_err(|e| Error::gpu(label.clone(), e))?
        };
        self.descriptor_layouts.lock().insert(
            tys.to_vec(),
            DescriptorLayoutEntry {
                handle: Handle::new(raw, self.shared.clone()),
            },
        );
        Ok(())
    }

    pub(crate) fn with_descriptor_layout<R>(&self, tys: &[ResourceType], f: impl FnOnce(&B::DescriptorSetLayout) -> R) -> Option<R> {
        self.descriptor_layouts.lock().get(tys).map(|entry| f(entry.handle.get()))
    }

    /// Leases a descriptor set keyed by `tys`, minting (and growing the
    /// backing descriptor pool) as needed. Requires the layout for `tys` to
    /// already be cached.
    pub(crate) fn acquire_descriptor_set(self: &Arc<Self>, tys: &[ResourceType]) -> DescriptorSetItem<B> {
        let key = tys.to_vec();
        let layouts = self.descriptor_layouts.lock();
        let layout = &layouts.get(tys).expect("[Context] descriptor layout not cached").handle;
        let set = self.descriptor_sets.acquire(key.clone(), || self.descriptor_lanes.allocate_set(tys, layout.get()));
        drop(layouts);
        set
    }

    /// Leases a command pool for `class`, resetting it (per spec §4.2) when
    /// newly minted never happens implicitly — the recorder resets pools
    /// explicitly after a transaction's fences are signaled (§4.7).
    pub(crate) fn acquire_command_pool(self: &Arc<Self>, class: SubmitClass) -> Result<CommandPoolItem<B>> {
        let family = self
            .queues
            .family_of(class)
            .ok_or_else(|| Error::UnsupportedSubmitClass {
                label: "command-pool".into(),
                class,
            })?;
        let shared = self.shared.clone();
        Ok(self.command_pools.acquire(class, move || {
            let raw = unsafe {
                shared
                    .device
                    .create_command_pool(family, gfx_hal::pool::CommandPoolCreateFlags::RESET_INDIVIDUAL)
                    .expect("[Context] failed to create command pool")
            };
            Handle::new(raw, shared.clone())
        }))
    }

    /// Leases a timestamp query pool from the single unit-keyed bucket.
    pub(crate) fn acquire_query_pool(self: &Arc<Self>) -> QueryPoolItem<B> {
        let shared = self.shared.clone();
        self.query_pools.acquire((), move || {
            let raw = unsafe {
                shared
                    .device
                    .create_query_pool(gfx_hal::query::Type::Timestamp, crate::recorder::timing::QUERY_POOL_SIZE)
                    .expect("[Context] failed to create timestamp query pool")
            };
            Handle::new(raw, shared.clone())
        })
    }

    /// Nanoseconds per timestamp tick, for converting raw query results into
    /// wall-clock durations (spec §4.6).
    pub(crate) fn timestamp_period(&self) -> f32 {
        self.adapter.physical_device.properties().limits.timestamp_period
    }

    /// Whether this device can time commands at all; a device that can't
    /// degrades every `is_timed` node to untimed-with-warning rather than
    /// failing the recording (spec §4.6/§7).
    pub(crate) fn supports_timestamp_queries(&self) -> bool {
        self.adapter.physical_device.properties().limits.timestamp_compute_and_graphics
    }

    /// Runs `f` against the first queue available for `class`, returning
    /// `None` if the class has no queue family (mirrors
    /// [`Context::acquire_command_pool`]'s availability check).
    pub(crate) fn with_queue<R>(&self, class: SubmitClass, f: impl FnOnce(&mut B::CommandQueue) -> R) -> Option<R> {
        self.queues.with_queue(class, f)
    }
}

impl<B: Backend> Drop for Context<B> {
    fn drop(&mut self) {
        let _ = self.shared.device.wait_idle();
    }
}

impl<B: Backend> std::fmt::Debug for Context<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").finish()
    }
}
