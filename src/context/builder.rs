//! `Context` construction: instance/adapter/device creation, per-class queue
//! selection, and assembly of the caches and pool managers `Context` owns.
//! Grounded in `context_builder.rs::GfxBuilder::build`, generalized from its
//! hard-coded two-family (graphics, compute) open to the five-class
//! selection rule of spec §4.4, and switched from a scoring heuristic
//! (`DiscreteGpu` bonus) to the exact priority rule the spec mandates — see
//! DESIGN.md for why the heuristic is superseded rather than reused.

use std::collections::HashMap;
use std::sync::Arc;

use gfx_hal::adapter::{Adapter, PhysicalDevice};
use gfx_hal::device::Device as _;
use gfx_hal::queue::QueueFamily;
use gfx_hal::{Backend, Instance};
use log::{debug, info};
use parking_lot::Mutex;

use crate::allocator::{GpuAllocator, Heapy};
use crate::error::{Error, Label, Result};
use crate::pool::PoolManager;
use crate::resource::sampler::{Sampler, SamplerKey};
use crate::handle::Handle;

use super::descriptor::DescriptorPoolLanes;
use super::queues::{select_family, Queues, SubmitClass};
use super::{Context, Shared};

/// Opaque surface create-info; stored per spec §4.4 ("surface variants:
/// windows, android, metal, or none").
#[derive(Debug, Clone)]
pub enum SurfaceConfig {
    Windows { hwnd: *mut std::ffi::c_void, hinstance: *mut std::ffi::c_void },
    Android { a_native_window: *mut std::ffi::c_void },
    Metal { ca_metal_layer: *mut std::ffi::c_void },
    None,
}

// Raw platform handles aren't Send/Sync by default; the builder only reads
// them once, synchronously, to build a surface.
unsafe impl Send for SurfaceConfig {}
unsafe impl Sync for SurfaceConfig {}

#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub label: Label,
    pub device_index: usize,
    pub surface: SurfaceConfig,
}

/// Backend instance creation, separate from [`ContextConfig`] since it
/// precedes device/adapter selection entirely (spec §6).
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    pub label: Label,
    pub app_name: String,
    /// Requests validation/debug layers where the backend and Vulkan loader
    /// support enabling them out-of-band (e.g. `VK_INSTANCE_LAYERS`); this
    /// crate cannot itself force a layer the loader hasn't been configured
    /// to expose, so `debug` otherwise only raises adapter-enumeration log
    /// verbosity.
    pub debug: bool,
}

const ALL_CLASSES: [SubmitClass; 5] = [
    SubmitClass::Any,
    SubmitClass::Graphics,
    SubmitClass::Compute,
    SubmitClass::Transfer,
    SubmitClass::Present,
];

pub struct ContextBuilder<B: Backend> {
    instance: B::Instance,
    debug: bool,
}

impl<B: Backend> ContextBuilder<B> {
    pub fn new(config: &InstanceConfig) -> Result<Self> {
        let instance = B::Instance::create(&config.app_name, 1).map_err(|_| {
            Error::invalid_config(config.label.clone(), "backend instance creation is unsupported on this platform")
        })?;
        if config.debug {
            debug!(
                "[ContextBuilder] instance '{}' created with debug logging requested; \
                 enable validation layers via the backend's usual mechanism (e.g. VK_INSTANCE_LAYERS)",
                config.app_name
            );
        }
        Ok(Self { instance, debug: config.debug })
    }

    pub fn build(self, config: ContextConfig) -> Result<Arc<Context<B>>> {
        let adapters = self.instance.enumerate_adapters();
        debug!("[ContextBuilder] found {} adapter(s)", adapters.len());
        for adapter in &adapters {
            debug!("[ContextBuilder] adapter: {:?}", adapter.info);
            if self.debug {
                debug!("[ContextBuilder] adapter limits: {:?}", adapter.physical_device.properties().limits);
            }
        }

        let adapter = adapters
            .into_iter()
            .nth(config.device_index)
            .ok_or_else(|| Error::invalid_config(config.label.clone(), "no adapter at the requested device_index"))?;
        info!("[ContextBuilder] selected adapter: {:?}", adapter.info);

        let families = &adapter.queue_families;
        let mut family_of_class: HashMap<SubmitClass, usize> = HashMap::new();
        for &class in &ALL_CLASSES {
            if let Some(index) = select_family(families, class) {
                family_of_class.insert(class, index);
            }
        }
        if family_of_class.get(&SubmitClass::Any).is_none() {
            return Err(Error::UnsupportedSubmitClass {
                label: config.label.clone(),
                class: SubmitClass::Any,
            });
        }

        let mut open_indices: Vec<usize> = family_of_class.values().copied().collect();
        open_indices.sort_unstable();
        open_indices.dedup();
        let open_requests: Vec<(&B::QueueFamily, &[f32])> = open_indices.iter().map(|&i| (&families[i], &[1.0_f32][..])).collect();

        let mut gpu = unsafe {
            adapter
                .physical_device
                .open(&open_requests, gfx_hal::Features::empty())
                .map_err(|e| Error::gpu(config.label.clone(), e))?
        };

        let device = Arc::new(gpu.device);

        // One opened queue per distinct family; classes selecting the same
        // family share it via the `Arc<Mutex<_>>` clone below.
        let mut queue_of_family = HashMap::new();
        for &family_index in family_of_class.values() {
            let family_id = families[family_index].id();
            if queue_of_family.contains_key(&family_id) {
                continue;
            }
            let group = gpu
                .queue_groups
                .iter_mut()
                .find(|g| g.family == family_id)
                .expect("[ContextBuilder] opened queue group missing for a selected family");
            let queue = group.queues.pop().expect("[ContextBuilder] opened family has no queues");
            queue_of_family.insert(family_id, Arc::new(Mutex::new(queue)));
        }

        let mut by_class = HashMap::new();
        for (&class, &family_index) in &family_of_class {
            let family_id = families[family_index].id();
            by_class.insert(class, (queue_of_family[&family_id].clone(), family_id));
        }

        let queues = Queues::new(by_class);
        let default_class = SubmitClass::Any;

        let allocator: Arc<dyn GpuAllocator<B>> = Arc::new(Heapy::<B>::new(device.clone(), &adapter.physical_device));
        let shared = Arc::new(Shared { device: device.clone(), allocator });

        let mut samplers = HashMap::new();
        for key in SamplerKey::ALL {
            let desc = key.info();
            let raw = unsafe {
                device
                    .create_sampler(&desc)
                    .map_err(|e| Error::gpu(config.label.clone(), e))?
            };
            samplers.insert(
                key,
                Sampler {
                    handle: Handle::new(raw, shared.clone()),
                },
            );
        }

        let descriptor_lanes = DescriptorPoolLanes::new(device.clone());
        let surface = config.surface;

        Ok(Arc::new(Context {
            shared,
            adapter: Arc::new(adapter),
            queues,
            default_class,
            command_pools: Arc::new(PoolManager::new()),
            query_pools: Arc::new(PoolManager::new()),
            descriptor_layouts: Mutex::new(HashMap::new()),
            descriptor_lanes,
            descriptor_sets: Arc::new(PoolManager::new()),
            samplers,
            surface,
        }))
    }
}
