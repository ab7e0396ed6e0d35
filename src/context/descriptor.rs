//! Descriptor-set allocation lanes, ported from `pool.rs`'s `Lane`/`Pool`
//! almost verbatim: one growable `B::DescriptorPool` per distinct layout key,
//! sized in increments of `DEFAULT_POOL_SIZE`. Keyed directly by the
//! resource-type sequence (`Vec<ResourceType>`) instead of a synthetic
//! `usize` layout id, since the sequence is already `Eq + Hash + Clone`.
//!
//! This is the "mint" source behind the Context's descriptor-set
//! `PoolManager`: minted sets are never freed back to the driver on
//! `PoolItem` drop, only pushed back onto the `PoolManager`'s free list, per
//! spec §4.2's "none (rewritten on bind)" reset policy.

use std::collections::HashMap;
use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use gfx_hal::device::Device;
use gfx_hal::pso::{DescriptorPool, DescriptorPoolCreateFlags, DescriptorRangeDesc};
use parking_lot::RwLock;

use crate::binding::ResourceType;

struct Lane<B: gfx_hal::Backend> {
    handle: ManuallyDrop<B::DescriptorPool>,
    allocation_count: AtomicUsize,
}

pub(crate) struct DescriptorPoolLanes<B: gfx_hal::Backend> {
    device: Arc<B::Device>,
    lanes: RwLock<HashMap<Vec<ResourceType>, Lane<B>>>,
}

impl<B: gfx_hal::Backend> DescriptorPoolLanes<B> {
    const DEFAULT_POOL_SIZE: usize = 32;

    pub(crate) fn new(device: Arc<B::Device>) -> Self {
        Self {
            device,
            lanes: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn allocate_set(&self, key: &[ResourceType], layout: &B::DescriptorSetLayout) -> B::DescriptorSet {
        let mut lanes = self.lanes.write();
        match lanes.get_mut(key) {
            Some(lane) => {
                if lane.allocation_count.load(Ordering::Relaxed) >= Self::DEFAULT_POOL_SIZE {
                    panic!("[DescriptorPoolLanes] lane for {:?} is full", key);
                }
                let set = unsafe {
                    lane.handle
                        .allocate_set(layout)
                        .expect("[DescriptorPoolLanes] failed to allocate set")
                };
                lane.allocation_count.fetch_add(1, Ordering::SeqCst);
                set
            }
            None => {
                let mut ranges: Vec<DescriptorRangeDesc> = Vec::new();
                for ty in key {
                    let dty = ty.descriptor_type();
                    match ranges.iter_mut().find(|r| r.ty == dty) {
                        Some(r) => r.count += Self::DEFAULT_POOL_SIZE,
                        None => ranges.push(DescriptorRangeDesc {
                            ty: dty,
                            count: Self::DEFAULT_POOL_SIZE,
                        }),
                    }
                }

                let mut pool = unsafe {
                    self.device
                        .create_descriptor_pool(Self::DEFAULT_POOL_SIZE, ranges.as_slice(), DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
                        .expect("[DescriptorPoolLanes] failed to create descriptor pool")
                };

                let set = unsafe {
                    pool.allocate_set(layout)
                        .expect("[DescriptorPoolLanes] failed to allocate initial set")
                };

                lanes.insert(
                    key.to_vec(),
                    Lane {
                        handle: ManuallyDrop::new(pool),
                        allocation_count: AtomicUsize::new(1),
                    },
                );
                set
            }
        }
    }
}

impl<B: gfx_hal::Backend> Drop for DescriptorPoolLanes<B> {
    fn drop(&mut self) {
        for (_key, mut lane) in self.lanes.get_mut().drain() {
            unsafe {
                let pool = ManuallyDrop::take(&mut lane.handle);
                self.device.destroy_descriptor_pool(pool);
            }
        }
    }
}
