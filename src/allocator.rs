//! Device memory allocator: consumed as a trait per spec.md §1 ("a
//! general-purpose device memory allocator... consumed as a trait with
//! `create_buffer`, `create_image`, `map`, `unmap`"). [`Heapy`] is the
//! crate's own reference implementation, extracted from the teacher's
//! `heapy.rs`/`memory_page.rs` bump-allocator-over-pages so a caller may
//! substitute a different allocator (e.g. `gpu-allocator`) without touching
//! the rest of the HAL.

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::mem::ManuallyDrop;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use gfx_hal::adapter::PhysicalDevice;
use gfx_hal::device::Device;
use gfx_hal::memory::{Properties, Requirements};
use gfx_hal::{Backend, MemoryTypeId};
use generational_arena::{Arena, Index};
use parking_lot::RwLock;
use thiserror::Error;

/// Host-access ↔ allocation-hint mapping from spec.md §4.3:
/// `none -> GPU-only`, `read -> GPU->CPU`, `write -> CPU->GPU`,
/// `read|write -> CPU-only`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryType {
    DeviceLocal,
    HostVisible,
}

#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("no memory page has room for an allocation of this size")]
    OutOfMemory,
}

/// An opaque index into the allocator's bookkeeping; identifies a live
/// allocation without exposing its page/offset structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationIndex {
    memory_type: MemoryType,
    page: Index,
    offset: u64,
    size: u64,
}

/// Device memory allocator trait. A `Buffer`/`Image` created through a
/// `Context` is bound to memory obtained through whatever implements this.
pub trait GpuAllocator<B: Backend>: Send + Sync {
    fn alloc(&self, size: u64, memory_type: MemoryType, requirements: Option<Requirements>) -> AllocationIndex;
    fn deallocate(&self, at: AllocationIndex);
    /// Safety: `at` must name a `HostVisible` allocation.
    unsafe fn map_write(&self, at: &AllocationIndex, data: &[u8]);
    /// Safety: `at` must name a `HostVisible` allocation; `out` must be at
    /// least `at`'s allocation size.
    unsafe fn map_read(&self, at: &AllocationIndex, out: &mut [u8]);
    fn bind_buffer(&self, at: &AllocationIndex, buffer: &mut B::Buffer);
    fn bind_image(&self, at: &AllocationIndex, image: &mut B::Image);
}

struct PageInfo {
    id: MemoryTypeId,
}

struct MemoryPage<B: Backend> {
    memory: ManuallyDrop<B::Memory>,
    allocations: Allocations,
}

impl<B: Backend> MemoryPage<B> {
    fn new(device: &Arc<B::Device>, memory_id: MemoryTypeId, size: u64) -> Self {
        let memory = unsafe {
            device
                .allocate_memory(memory_id, size)
                .unwrap_or_else(|e| panic!("[Heapy] failed to allocate memory page ({:?}): {:?}", memory_id, e))
        };
        Self {
            memory: ManuallyDrop::new(memory),
            allocations: Allocations::new(size),
        }
    }

    fn free(&mut self, device: &Arc<B::Device>) {
        unsafe {
            let memory = ManuallyDrop::take(&mut self.memory);
            device.free_memory(memory);
        }
    }
}

#[derive(Debug, Clone)]
struct Allocation {
    offset: u64,
    size: u64,
}

impl From<&Allocation> for Range<u64> {
    fn from(a: &Allocation) -> Self {
        a.offset..a.offset + a.size
    }
}
impl PartialEq for Allocation {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset
    }
}
impl Eq for Allocation {}
impl PartialOrd for Allocation {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        self.offset.partial_cmp(&other.offset)
    }
}
impl Ord for Allocation {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.offset.cmp(&other.offset)
    }
}

/// Tracks a bump-allocated free list within one `MemoryPage`.
struct Allocations {
    size: u64,
    allocations: Vec<Allocation>,
}

impl Allocations {
    fn new(size: u64) -> Self {
        Self { size, allocations: Vec::new() }
    }

    fn is_compatible(first: Range<u64>, second: Range<u64>) -> bool {
        first.end <= second.start || second.end <= first.start
    }

    fn try_alloc(&mut self, size: u64) -> Result<u64, AllocationError> {
        let mut head = 0u64;
        for a in self.allocations.iter() {
            if !Self::is_compatible(head..head + size, a.into()) {
                head = a.offset + a.size;
            }
        }
        if head + size <= self.size {
            let allocation = Allocation { offset: head, size };
            let pos = self.allocations.binary_search(&allocation).err().unwrap();
            self.allocations.insert(pos, allocation);
            Ok(head)
        } else {
            Err(AllocationError::OutOfMemory)
        }
    }

    fn dealloc(&mut self, at_offset: u64) {
        if let Some(pos) = self.allocations.iter().position(|a| a.offset == at_offset) {
            self.allocations.remove(pos);
        } else {
            panic!("[Heapy] (dealloc) invalid offset {}", at_offset);
        }
    }
}

const BLOCK_SIZE: u64 = 20;

/// Reference `GpuAllocator` implementation: one growable page per
/// `MemoryType`, bump-allocating within each page and coalescing nothing on
/// free (matches the teacher's `Heapy`/`MemoryPage`/`Allocations` exactly).
pub struct Heapy<B: Backend> {
    device: Arc<B::Device>,
    pages: RwLock<HashMap<MemoryType, (PageInfo, Arena<MemoryPage<B>>)>>,
    min_alignment: AtomicU64,
}

impl<B: Backend> Heapy<B> {
    pub fn new(device: Arc<B::Device>, physical_device: &B::PhysicalDevice) -> Self {
        let mut pages = HashMap::with_capacity(2);
        pages.insert(
            MemoryType::DeviceLocal,
            (Self::page_info(physical_device, Properties::DEVICE_LOCAL), Arena::new()),
        );
        pages.insert(
            MemoryType::HostVisible,
            (
                Self::page_info(physical_device, Properties::CPU_VISIBLE | Properties::COHERENT),
                Arena::new(),
            ),
        );
        let min_alignment = physical_device.limits().buffer_image_granularity;
        Self {
            device,
            pages: RwLock::new(pages),
            min_alignment: min_alignment.into(),
        }
    }

    fn page_info(device: &B::PhysicalDevice, props: Properties) -> PageInfo {
        let memory_properties = device.memory_properties();
        let (id, _heap_index) = memory_properties
            .memory_types
            .iter()
            .enumerate()
            .find(|(_, ty)| ty.properties.contains(props))
            .map(|(id, ty)| (MemoryTypeId(id), ty.heap_index))
            .unwrap_or_else(|| panic!("[Heapy] no memory type satisfies {:?}", props));
        PageInfo { id }
    }

    fn round_up(value: u64, multiple_of: u64) -> u64 {
        (value + multiple_of - 1) & !(multiple_of - 1)
    }
}

impl<B: Backend> GpuAllocator<B> for Heapy<B> {
    fn alloc(&self, size: u64, memory_type: MemoryType, requirements: Option<Requirements>) -> AllocationIndex {
        let alignment = self.min_alignment.load(Ordering::Acquire);
        let size = Self::round_up(size, alignment.max(1));

        let mut pages = self.pages.write();
        let (page_info, arena) = pages.get_mut(&memory_type).expect("[Heapy] memory type uninitialized");

        if let Some(req) = requirements {
            assert_ne!(
                req.type_mask & (1u32 << page_info.id.0),
                0,
                "[Heapy] requirements for allocation could not be met"
            );
        }

        let mut found = None;
        for (idx, page) in arena.iter_mut() {
            if let Ok(offset) = page.allocations.try_alloc(size) {
                found = Some((idx, offset));
                break;
            }
        }
        let (page, offset) = match found {
            Some(x) => x,
            None => {
                let mut page = MemoryPage::<B>::new(&self.device, page_info.id, BLOCK_SIZE.saturating_mul(alignment.max(1)).max(size));
                let offset = page.allocations.try_alloc(size).expect("[Heapy] fresh page too small");
                (arena.insert(page), offset)
            }
        };

        AllocationIndex { memory_type, page, offset, size }
    }

    fn deallocate(&self, at: AllocationIndex) {
        let mut pages = self.pages.write();
        let (_, arena) = pages.get_mut(&at.memory_type).expect("[Heapy] invalid memory type");
        let page = arena.get_mut(at.page).expect("[Heapy] (deallocate) invalid index");
        page.allocations.dealloc(at.offset);
    }

    unsafe fn map_write(&self, at: &AllocationIndex, data: &[u8]) {
        assert_eq!(at.memory_type, MemoryType::HostVisible, "[Heapy] (write) tried to map un-mappable memory");
        assert!(data.len() as u64 <= at.size, "[Heapy] (write) data larger than allocation");
        let pages = self.pages.read();
        let (_, arena) = pages.get(&at.memory_type).unwrap();
        let page = arena.get(at.page).expect("[Heapy] (write) invalid index");
        use gfx_hal::memory::Segment;
        let dst = self
            .device
            .map_memory(&page.memory, Segment { offset: at.offset, size: Some(at.size) })
            .expect("[Heapy] (write) map_memory failed");
        std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        self.device.unmap_memory(&page.memory);
    }

    unsafe fn map_read(&self, at: &AllocationIndex, out: &mut [u8]) {
        assert_eq!(at.memory_type, MemoryType::HostVisible, "[Heapy] (read) tried to map un-mappable memory");
        let pages = self.pages.read();
        let (_, arena) = pages.get(&at.memory_type).unwrap();
        let page = arena.get(at.page).expect("[Heapy] (read) invalid index");
        use gfx_hal::memory::Segment;
        let src = self
            .device
            .map_memory(&page.memory, Segment { offset: at.offset, size: Some(at.size) })
            .expect("[Heapy] (read) map_memory failed");
        let len = out.len().min(at.size as usize);
        std::ptr::copy_nonoverlapping(src, out.as_mut_ptr(), len);
        self.device.unmap_memory(&page.memory);
    }

    fn bind_buffer(&self, at: &AllocationIndex, buffer: &mut B::Buffer) {
        let pages = self.pages.read();
        let (_, arena) = pages.get(&at.memory_type).unwrap();
        let page = arena.get(at.page).expect("[Heapy] (bind_buffer) invalid index");
        unsafe {
            self.device
                .bind_buffer_memory(&page.memory, at.offset, buffer)
                .expect("[Heapy] (bind_buffer) failed");
        }
    }

    fn bind_image(&self, at: &AllocationIndex, image: &mut B::Image) {
        let pages = self.pages.read();
        let (_, arena) = pages.get(&at.memory_type).unwrap();
        let page = arena.get(at.page).expect("[Heapy] (bind_image) invalid index");
        unsafe {
            self.device
                .bind_image_memory(&page.memory, at.offset, image)
                .expect("[Heapy] (bind_image) failed");
        }
    }
}

impl<B: Backend> Drop for Heapy<B> {
    fn drop(&mut self) {
        let mut pages = self.pages.write();
        for (_k, (_info, mut arena)) in pages.drain() {
            for (_idx, mut page) in arena.drain() {
                page.free(&self.device);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_up_to_alignment() {
        assert_eq!(Heapy::<gfx_backend_vulkan::Backend>::round_up(15, 8), 16);
        assert_eq!(Heapy::<gfx_backend_vulkan::Backend>::round_up(0, 8), 0);
        assert_eq!(Heapy::<gfx_backend_vulkan::Backend>::round_up(9, 8), 16);
    }

    #[test]
    fn allocations_reuse_freed_space() {
        let mut a = Allocations::new(24);
        let _first = a.try_alloc(4).unwrap();
        let second = a.try_alloc(8).unwrap();
        let _third = a.try_alloc(4).unwrap();
        a.dealloc(second);
        let _fourth = a.try_alloc(8).unwrap();
        assert_eq!(a.allocations.len(), 3);
    }
}
