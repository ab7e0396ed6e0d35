//! Buffer resource: immutable config plus mutable dynamic state. Grounded in
//! `resource/buffer.rs`'s `BufferDescriptor`/`Buffer<C: GpuContext>` shape,
//! generalized from a context-generic handle wrapper into a self-owning type
//! that carries its own device/allocator reference (see `context::Shared`)
//! and its full spec §3 field set (host-access bitset, dynamic `(stage,
//! access)` pair, `map_read`/`map_write`/`map_read_write` guards, plus the
//! `read_buf_mem`/`write_buf_mem` convenience wrappers carried over from
//! upstream `graphi-t`).

use std::sync::Arc;

use bitflags::bitflags;
use bytemuck::Pod;
use gfx_hal::device::Device;
use log::warn;
use parking_lot::Mutex;

use crate::allocator::AllocationIndex;
use crate::compat::ToHalType;
use crate::context::{Context, Shared};
use crate::error::{Error, Label, Result};
use crate::handle::Handle;
use crate::state::BufferState;

bitflags! {
    /// Mirrors spec §3's buffer usage bitset
    /// `{transferSrc, transferDst, uniform, storage, vertex, index}`.
    pub struct BufferUsage: u32 {
        const TRANSFER_SRC = 0b0000_0001;
        const TRANSFER_DST = 0b0000_0010;
        const UNIFORM      = 0b0000_0100;
        const STORAGE      = 0b0000_1000;
        const VERTEX       = 0b0001_0000;
        const INDEX        = 0b0010_0000;
    }
}

impl ToHalType for BufferUsage {
    type Target = gfx_hal::buffer::Usage;

    fn convert(self) -> Self::Target {
        use gfx_hal::buffer::Usage as H;
        let mut out = H::empty();
        if self.contains(BufferUsage::TRANSFER_SRC) {
            out |= H::TRANSFER_SRC;
        }
        if self.contains(BufferUsage::TRANSFER_DST) {
            out |= H::TRANSFER_DST;
        }
        if self.contains(BufferUsage::UNIFORM) {
            out |= H::UNIFORM;
        }
        if self.contains(BufferUsage::STORAGE) {
            out |= H::STORAGE;
        }
        if self.contains(BufferUsage::VERTEX) {
            out |= H::VERTEX;
        }
        if self.contains(BufferUsage::INDEX) {
            out |= H::INDEX;
        }
        out
    }
}

bitflags! {
    /// Buffer host-access bitset; see spec §4.3 for the allocation-hint
    /// mapping this drives (`none->GPU-only`, `read->GPU->CPU`,
    /// `write->CPU->GPU`, `read|write->CPU-only`).
    pub struct HostAccess: u32 {
        const READ  = 0b01;
        const WRITE = 0b10;
    }
}

impl HostAccess {
    /// The allocator only distinguishes device-local from host-visible
    /// memory; any host access at all routes a buffer into the host-visible
    /// pool, which is coherent in both directions on every backend this
    /// crate targets.
    pub(crate) fn memory_type(self) -> crate::allocator::MemoryType {
        if self.is_empty() {
            crate::allocator::MemoryType::DeviceLocal
        } else {
            crate::allocator::MemoryType::HostVisible
        }
    }
}

#[derive(Debug, Clone)]
pub struct BufferConfig {
    pub label: Label,
    pub size: u64,
    pub host_access: HostAccess,
    pub usage: BufferUsage,
}

impl BufferConfig {
    /// Host-write + transferSrc: a staging buffer fed by the CPU once and
    /// copied from thereafter.
    pub fn streaming(label: impl Into<Label>, size: u64) -> Self {
        Self {
            label: label.into(),
            size,
            host_access: HostAccess::WRITE,
            usage: BufferUsage::TRANSFER_SRC,
        }
    }

    /// Host-read + transferDst: a readback buffer, the copy target of a
    /// device-local resource.
    pub fn read_back(label: impl Into<Label>, size: u64) -> Self {
        Self {
            label: label.into(),
            size,
            host_access: HostAccess::READ,
            usage: BufferUsage::TRANSFER_DST,
        }
    }

    /// transferDst + uniform: a device-local uniform buffer, populated via a
    /// staging copy.
    pub fn uniform(label: impl Into<Label>, size: u64) -> Self {
        Self {
            label: label.into(),
            size,
            host_access: HostAccess::empty(),
            usage: BufferUsage::TRANSFER_DST | BufferUsage::UNIFORM,
        }
    }

    /// transferSrc + transferDst + storage: a device-local storage buffer
    /// that can both receive and source copies.
    pub fn storage(label: impl Into<Label>, size: u64) -> Self {
        Self {
            label: label.into(),
            size,
            host_access: HostAccess::empty(),
            usage: BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST | BufferUsage::STORAGE,
        }
    }

    /// transferDst + vertex.
    pub fn vertex(label: impl Into<Label>, size: u64) -> Self {
        Self {
            label: label.into(),
            size,
            host_access: HostAccess::empty(),
            usage: BufferUsage::TRANSFER_DST | BufferUsage::VERTEX,
        }
    }

    /// transferDst + index.
    pub fn index(label: impl Into<Label>, size: u64) -> Self {
        Self {
            label: label.into(),
            size,
            host_access: HostAccess::empty(),
            usage: BufferUsage::TRANSFER_DST | BufferUsage::INDEX,
        }
    }
}

/// Whether `have` contains every bit `required` asks for; factored out of
/// `Buffer::check_host_access` so it can be unit-tested without a live
/// device.
fn host_access_check(have: HostAccess, required: HostAccess, label: &Label) -> Result<()> {
    if !have.contains(required) {
        return Err(Error::invalid_config(
            label.clone(),
            format!("buffer has host_access {:?}, {:?} required", have, required),
        ));
    }
    Ok(())
}

/// A live buffer: immutable config plus the mutable `(stage, access)`
/// dynamic state the recorder updates as barriers are emitted.
pub struct Buffer<B: gfx_hal::Backend> {
    pub(crate) shared: Arc<Shared<B>>,
    pub(crate) handle: Handle<B::Buffer, Shared<B>>,
    pub(crate) memory: AllocationIndex,
    pub(crate) label: Label,
    pub(crate) size: u64,
    pub(crate) host_access: HostAccess,
    pub(crate) usage: BufferUsage,
    pub(crate) state: Mutex<BufferState>,
}

impl<B: gfx_hal::Backend> Buffer<B> {
    /// Creates a buffer, allocates memory for it through the context's
    /// allocator, and binds it, per spec §4.3 ("creation always allocates and
    /// binds backing memory; sub-allocation/aliasing is out of scope").
    pub fn new(context: &Arc<Context<B>>, config: BufferConfig) -> Result<Arc<Self>> {
        let shared = context.shared().clone();
        let mut raw = unsafe {
            shared
                .device
                .create_buffer(config.size, config.usage.convert(), gfx_hal::memory::SparseFlags::empty())
                .map_err(|e| Error::gpu(config.label.clone(), e))?
        };
        let requirements = unsafe { shared.device.get_buffer_requirements(&raw) };
        let memory = shared
            .allocator
            .alloc(requirements.size, config.host_access.memory_type(), Some(requirements));
        shared.allocator.bind_buffer(&memory, &mut raw);

        Ok(Arc::new(Self {
            shared: shared.clone(),
            handle: Handle::new(raw, shared),
            memory,
            label: config.label,
            size: config.size,
            host_access: config.host_access,
            usage: config.usage,
            state: Mutex::new(BufferState::HOST_INITIAL),
        }))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    pub fn host_access(&self) -> HostAccess {
        self.host_access
    }

    pub(crate) fn raw(&self) -> &B::Buffer {
        self.handle.get()
    }

    pub(crate) fn state(&self) -> BufferState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, new: BufferState) {
        *self.state.lock() = new;
    }

    /// A borrowed view over `offset..offset+size` of this buffer.
    pub fn view(self: &Arc<Self>, offset: u64, size: u64) -> BufferView<B> {
        BufferView {
            buffer: self.clone(),
            offset,
            size,
        }
    }

    fn check_map_size(&self, requested: u64) -> Result<bool> {
        if requested == 0 {
            warn!("[Buffer:{}] ignoring zero-sized map", self.label);
            return Ok(false);
        }
        if requested > self.size {
            return Err(Error::BufferTooSmall {
                label: self.label.clone(),
                needed: requested,
                available: self.size,
            });
        }
        Ok(true)
    }

    fn check_host_access(&self, required: HostAccess) -> Result<()> {
        host_access_check(self.host_access, required, &self.label)
    }

    /// Maps the whole buffer for a host write of `data`. No-op (warns) on a
    /// zero-length `data`; fails with `BufferTooSmall` if `data` overruns the
    /// buffer, or `InvalidConfig` if the buffer wasn't created with
    /// `HostAccess::WRITE`.
    pub fn map_write<D: Pod>(self: &Arc<Self>, data: &D) -> Result<()> {
        self.check_host_access(HostAccess::WRITE)?;
        let bytes = bytemuck::bytes_of(data);
        if !self.check_map_size(bytes.len() as u64)? {
            return Ok(());
        }
        unsafe { self.shared.allocator.map_write(&self.memory, bytes) };
        Ok(())
    }

    /// Maps the whole buffer for a host read into `out`. Fails with
    /// `InvalidConfig` if the buffer wasn't created with `HostAccess::READ`.
    pub fn map_read(self: &Arc<Self>, out: &mut [u8]) -> Result<()> {
        self.check_host_access(HostAccess::READ)?;
        if !self.check_map_size(out.len() as u64)? {
            return Ok(());
        }
        unsafe { self.shared.allocator.map_read(&self.memory, out) };
        Ok(())
    }

    /// Maps the buffer for a read-modify-write round trip: reads the current
    /// contents into a guard the caller can mutate, then writes the guard's
    /// bytes back to the buffer when it drops. Requires both
    /// `HostAccess::READ` and `HostAccess::WRITE`.
    pub fn map_read_write(self: &Arc<Self>, size: u64) -> Result<MappedBuffer<B>> {
        self.check_host_access(HostAccess::READ | HostAccess::WRITE)?;
        if !self.check_map_size(size)? {
            return Ok(MappedBuffer {
                buffer: None,
                bytes: Vec::new(),
            });
        }
        let mut bytes = vec![0u8; size as usize];
        unsafe { self.shared.allocator.map_read(&self.memory, &mut bytes) };
        Ok(MappedBuffer {
            buffer: Some(self.clone()),
            bytes,
        })
    }

    /// Reads `size` bytes back from the buffer into a freshly allocated
    /// `Vec`, carried over from upstream `read_buf_mem` as a convenience over
    /// [`Buffer::map_read`] for callers that don't already have a
    /// destination buffer.
    pub fn read_buf_mem(self: &Arc<Self>, size: u64) -> Result<Vec<u8>> {
        let mut out = vec![0u8; size as usize];
        self.map_read(&mut out)?;
        Ok(out)
    }

    /// Writes raw bytes to the buffer, carried over from upstream
    /// `write_buf_mem` as a convenience over [`Buffer::map_write`] for
    /// callers that already have bytes rather than a `Pod` value.
    pub fn write_buf_mem(self: &Arc<Self>, data: &[u8]) -> Result<()> {
        self.check_host_access(HostAccess::WRITE)?;
        if !self.check_map_size(data.len() as u64)? {
            return Ok(());
        }
        unsafe { self.shared.allocator.map_write(&self.memory, data) };
        Ok(())
    }
}

impl<B: gfx_hal::Backend> crate::handle::Destroy<B::Buffer> for Shared<B> {
    fn destroy(&self, value: B::Buffer) {
        unsafe { self.device.destroy_buffer(value) };
    }
}

impl<B: gfx_hal::Backend> Drop for Buffer<B> {
    fn drop(&mut self) {
        self.shared.allocator.deallocate(self.memory);
    }
}

impl<B: gfx_hal::Backend> std::fmt::Debug for Buffer<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("label", &self.label)
            .field("size", &self.size)
            .field("usage", &self.usage)
            .finish()
    }
}

/// A `(resource reference, region)` pair; never owns the buffer it names.
#[derive(Clone)]
pub struct BufferView<B: gfx_hal::Backend> {
    pub buffer: Arc<Buffer<B>>,
    pub offset: u64,
    pub size: u64,
}

/// Guard over a host-mapped read-write buffer region; writes the (possibly
/// mutated) bytes back to the buffer on drop. Empty (a no-op drop) if the
/// mapping was for a zero-sized region.
pub struct MappedBuffer<B: gfx_hal::Backend> {
    buffer: Option<Arc<Buffer<B>>>,
    bytes: Vec<u8>,
}

impl<B: gfx_hal::Backend> std::ops::Deref for MappedBuffer<B> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl<B: gfx_hal::Backend> std::ops::DerefMut for MappedBuffer<B> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl<B: gfx_hal::Backend> Drop for MappedBuffer<B> {
    fn drop(&mut self) {
        if let Some(buffer) = &self.buffer {
            unsafe { buffer.shared.allocator.map_write(&buffer.memory, &self.bytes) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_match_spec_usage_bits() {
        assert_eq!(BufferConfig::streaming("s", 16).usage, BufferUsage::TRANSFER_SRC);
        assert_eq!(BufferConfig::read_back("r", 16).usage, BufferUsage::TRANSFER_DST);
        assert_eq!(
            BufferConfig::uniform("u", 16).usage,
            BufferUsage::TRANSFER_DST | BufferUsage::UNIFORM
        );
        assert_eq!(
            BufferConfig::storage("st", 16).usage,
            BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST | BufferUsage::STORAGE
        );
        assert_eq!(
            BufferConfig::vertex("v", 16).usage,
            BufferUsage::TRANSFER_DST | BufferUsage::VERTEX
        );
        assert_eq!(BufferConfig::index("i", 16).usage, BufferUsage::TRANSFER_DST | BufferUsage::INDEX);
    }

    #[test]
    fn check_host_access_rejects_missing_bits() {
        let label: Label = "b".into();
        assert!(host_access_check(HostAccess::empty(), HostAccess::READ, &label).is_err());
        assert!(host_access_check(HostAccess::empty(), HostAccess::WRITE, &label).is_err());
        assert!(host_access_check(HostAccess::WRITE, HostAccess::WRITE, &label).is_ok());
        assert!(host_access_check(HostAccess::WRITE, HostAccess::READ, &label).is_err());
    }

    #[test]
    fn host_access_selects_memory_type() {
        use crate::allocator::MemoryType;
        assert_eq!(HostAccess::empty().memory_type(), MemoryType::DeviceLocal);
        assert_eq!(HostAccess::READ.memory_type(), MemoryType::HostVisible);
        assert_eq!(HostAccess::WRITE.memory_type(), MemoryType::HostVisible);
        assert_eq!((HostAccess::READ | HostAccess::WRITE).memory_type(), MemoryType::HostVisible);
    }
}
