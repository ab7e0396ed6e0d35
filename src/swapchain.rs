//! Swapchain: immutable config (min image count, preferred-format list,
//! color space) plus the mutable "dynamic detail" spec §3 names (current
//! width×height, wrapped swapchain images, optional in-flight image index).
//! Grounded in `swapper.rs::Swapper<B>`, generalized from its hard-coded
//! 3-frames-in-flight/single-format setup to the `SwapchainConfig` surface
//! of spec §6 (caller-supplied image count + allowed-format list + color
//! space, first surface-supported format wins).

use std::borrow::Borrow;
use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use gfx_hal::adapter::Adapter;
use gfx_hal::device::{Device, WaitFor};
use gfx_hal::pool::{CommandPool, CommandPoolCreateFlags};
use gfx_hal::queue::family::QueueFamilyId;
use gfx_hal::queue::{CommandQueue, Submission};
use gfx_hal::window::{PresentationSurface, Surface as _, SwapchainConfig as HalSwapchainConfig};
use gfx_hal::Backend;
use log::warn;
use parking_lot::{Mutex, RwLock};

use crate::compat::ToHalType;
use crate::context::Shared;
use crate::error::{Error, Label, Result};
use crate::format::{ColorSpace, Format};
use crate::state::ImageState;

type SwapchainImage<B> = <<B as Backend>::Surface as PresentationSurface<B>>::SwapchainImage;

/// The fence/semaphore pair and in-flight command buffer for one of the
/// swapchain's frames in flight.
struct FrameSync<B: Backend> {
    fence: B::Fence,
    rendering_complete: B::Semaphore,
    in_use_command: Option<B::CommandBuffer>,
}

impl<B: Backend> FrameSync<B> {
    unsafe fn create(device: &B::Device, label: &Label) -> Self {
        Self {
            fence: device
                .create_fence(true)
                .unwrap_or_else(|e| panic!("[Swapchain:{}] failed to create fence: {:?}", label, e)),
            rendering_complete: device
                .create_semaphore()
                .unwrap_or_else(|e| panic!("[Swapchain:{}] failed to create semaphore: {:?}", label, e)),
            in_use_command: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SwapchainConfig {
    pub label: Label,
    pub image_count: u32,
    pub allowed_formats: Vec<Format>,
    pub color_space: ColorSpace,
}

/// One acquired-but-not-yet-presented image, returned by [`Swapchain::acquire`].
pub struct AcquiredFrame<B: Backend> {
    pub(crate) frame_idx: usize,
    pub(crate) image: ManuallyDrop<SwapchainImage<B>>,
    pub index: u32,
}

/// The swapchain's "current-frame image" dyn-detail (spec §3): an acquired
/// frame the recorder hasn't yet handed to a `PresentInvocation`, paired
/// with the dynamic `(stage, access, layout)` state a `RenderPass`
/// invocation targeting it transitions through like any other color
/// attachment.
struct CurrentImage<B: Backend> {
    frame: AcquiredFrame<B>,
    state: ImageState,
}

pub struct Swapchain<B: Backend> {
    shared: Arc<Shared<B>>,
    label: Label,
    surface: RwLock<B::Surface>,
    adapter: Arc<Adapter<B>>,
    present_family: QueueFamilyId,
    format: Format,
    color_space: ColorSpace,
    min_image_count: u32,

    should_configure: AtomicBool,
    extent: RwLock<Option<(u32, u32)>>,

    frames_in_flight: usize,
    frames: Vec<Mutex<FrameSync<B>>>,
    current_frame: Mutex<usize>,
    command_pool: Mutex<B::CommandPool>,

    /// Set by [`Swapchain::ensure_acquired`], cleared by
    /// [`Swapchain::take_current`] — the recorder's view of "has an image
    /// been acquired but not yet presented" (spec §3).
    current: Mutex<Option<CurrentImage<B>>>,
}

const FENCE_TIMEOUT_NS: u64 = 1_000_000_000;

/// A config's requested image count, floored at one frame in flight — spec
/// §4.4's "image_count is a minimum, never zero". Factored out of
/// `Swapchain::new` so it's unit-testable without a live device/surface.
fn frames_in_flight_count(image_count: u32) -> usize {
    image_count.max(1) as usize
}

impl<B: Backend> Swapchain<B> {
    pub fn new(
        shared: Arc<Shared<B>>,
        adapter: Arc<Adapter<B>>,
        surface: B::Surface,
        present_family: QueueFamilyId,
        config: SwapchainConfig,
    ) -> Result<Self> {
        let supported_formats = surface.supported_formats(&adapter.physical_device);
        let format = config
            .allowed_formats
            .iter()
            .copied()
            .find(|f| match &supported_formats {
                None => true,
                Some(supported) => supported.contains(&f.convert()),
            })
            .ok_or_else(|| Error::NoCompatibleSurfaceFormat { label: config.label.clone() })?;

        let frames_in_flight = frames_in_flight_count(config.image_count);
        let frames = (0..frames_in_flight)
            .map(|_| unsafe { Mutex::new(FrameSync::create(&shared.device, &config.label)) })
            .collect();

        let command_pool = unsafe {
            shared
                .device
                .create_command_pool(present_family, CommandPoolCreateFlags::RESET_INDIVIDUAL)
                .map_err(|e| Error::gpu(config.label.clone(), e))?
        };

        Ok(Self {
            shared,
            label: config.label,
            surface: RwLock::new(surface),
            adapter,
            present_family,
            format,
            color_space: config.color_space,
            min_image_count: config.image_count,
            should_configure: AtomicBool::new(true),
            extent: RwLock::new(None),
            frames_in_flight,
            frames,
            current_frame: Mutex::new(0),
            command_pool: Mutex::new(command_pool),
            current: Mutex::new(None),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    pub(crate) fn present_family(&self) -> QueueFamilyId {
        self.present_family
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        *self.extent.read()
    }

    fn configure_if_needed(&self, fallback_extent: (u32, u32)) -> Result<()> {
        if !self.should_configure.load(Ordering::Acquire) {
            return Ok(());
        }

        let fences: Vec<_> = self.frames.iter().map(|f| f.lock()).collect();
        let fence_refs: Vec<&B::Fence> = fences.iter().map(|f| &f.fence).collect();
        loop {
            match unsafe { self.shared.device.wait_for_fences(fence_refs.iter().copied(), WaitFor::All, FENCE_TIMEOUT_NS) } {
                Ok(true) => break,
                Ok(false) => continue,
                Err(e) => return Err(Error::gpu(self.label.clone(), e)),
            }
        }
        drop(fences);

        let mut surface = self.surface.write();
        let caps = surface.capabilities(&self.adapter.physical_device);
        let extent = caps.current_extent.unwrap_or(gfx_hal::window::Extent2D {
            width: fallback_extent.0,
            height: fallback_extent.1,
        });

        let mut swapchain_config = HalSwapchainConfig::from_caps(&caps, self.format.convert(), extent);
        if caps.image_count.contains(&self.min_image_count) {
            swapchain_config.image_count = self.min_image_count;
        }

        *self.extent.write() = Some((swapchain_config.extent.width, swapchain_config.extent.height));

        unsafe {
            surface
                .configure_swapchain(&self.shared.device, swapchain_config)
                .map_err(|e| Error::invalid_config(self.label.clone(), format!("{:?}", e)))?;
        }

        self.should_configure.store(false, Ordering::Release);
        Ok(())
    }

    /// Acquires the next image, blocking briefly on the frame-in-flight fence
    /// per spec §5 ("`Swapchain::acquire` performs a short fence wait").
    /// Rebuilds the swapchain first if a prior suboptimal present cleared the
    /// dynamic detail (spec §4.7/S6).
    pub fn acquire(&self) -> Result<AcquiredFrame<B>> {
        self.configure_if_needed((1, 1))?;

        let frame_idx = {
            let mut current = self.current_frame.lock();
            let idx = *current;
            *current = (idx + 1) % self.frames_in_flight;
            idx
        };

        {
            let mut frame = self.frames[frame_idx].lock();
            unsafe {
                loop {
                    match self.shared.device.wait_for_fence(&frame.fence, FENCE_TIMEOUT_NS) {
                        Ok(true) => break,
                        Ok(false) => continue,
                        Err(e) => return Err(Error::gpu(self.label.clone(), e)),
                    }
                }
                self.shared.device.reset_fence(&frame.fence).map_err(|e| Error::gpu(self.label.clone(), e))?;
            }
            if let Some(old_command) = frame.in_use_command.take() {
                unsafe { self.command_pool.lock().free(std::iter::once(old_command)) };
            }
        }

        let mut surface = self.surface.write();
        match unsafe { surface.acquire_image(FENCE_TIMEOUT_NS) } {
            Ok((image, suboptimal)) => {
                if suboptimal.is_some() {
                    warn!("[Swapchain:{}] acquired a suboptimal image", self.label);
                }
                Ok(AcquiredFrame {
                    frame_idx,
                    image: ManuallyDrop::new(image),
                    index: frame_idx as u32,
                })
            }
            Err(e) => {
                self.should_configure.store(true, Ordering::Release);
                Err(Error::gpu(self.label.clone(), e))
            }
        }
    }

    /// Presents `frame`'s image on `queue`. On a suboptimal/out-of-date
    /// result, clears the dynamic detail so the next `acquire` rebuilds the
    /// swapchain (spec §4.7 boundary behavior, scenario S6).
    pub(crate) fn present(&self, mut frame: AcquiredFrame<B>, command: B::CommandBuffer, queue: &mut B::CommandQueue) {
        let mut sync = self.frames[frame.frame_idx].lock();

        unsafe {
            let submission = Submission {
                command_buffers: std::iter::once(&command),
                wait_semaphores: std::iter::empty(),
                signal_semaphores: std::iter::once(&sync.rendering_complete),
            };
            queue.submit(submission, Some(&sync.fence));
        }
        sync.in_use_command = Some(command);

        let image = unsafe { ManuallyDrop::take(&mut frame.image) };
        let mut surface = self.surface.write();
        let result = unsafe { queue.present(&mut surface, image, Some(&sync.rendering_complete)) };
        if result.is_err() {
            warn!("[Swapchain:{}] present returned suboptimal/out-of-date, scheduling rebuild", self.label);
            self.should_configure.store(true, Ordering::Release);
            *self.extent.write() = None;
        }
    }

    /// Acquires the next image if none is currently pending, making it the
    /// swapchain's "current-frame image" dyn-detail. Idempotent: a
    /// `RenderPass` invocation attaching to this swapchain ahead of a
    /// `Present` invocation calls this first; the `Present` invocation
    /// itself calls it again right after presenting, per the recording
    /// algorithm's "acquire the next image" step (spec §4.7).
    pub(crate) fn ensure_acquired(&self) -> Result<()> {
        if self.current.lock().is_some() {
            return Ok(());
        }
        let frame = self.acquire()?;
        *self.current.lock() = Some(CurrentImage {
            frame,
            state: ImageState::UNDEFINED,
        });
        Ok(())
    }

    /// The current-frame image's dynamic `(stage, access, layout)` state.
    /// Panics if called before [`Swapchain::ensure_acquired`] — a recorder
    /// bug, not a caller-reachable condition.
    pub(crate) fn current_state(&self) -> ImageState {
        self.current.lock().as_ref().expect("[Swapchain] no current frame acquired").state
    }

    pub(crate) fn set_current_state(&self, new: ImageState) {
        self.current.lock().as_mut().expect("[Swapchain] no current frame acquired").state = new;
    }

    /// Raw view of the current-frame image, valid for as long as the
    /// recorder holds it as "current" (until the next
    /// [`Swapchain::take_current`]). The single-threaded-per-transaction
    /// recording invariant (spec §5) means no concurrent acquire can
    /// invalidate this reference while a command buffer is being built
    /// against it.
    pub(crate) fn current_raw_view(&self) -> &B::ImageView {
        let guard = self.current.lock();
        let current = guard.as_ref().expect("[Swapchain] no current frame acquired");
        let view: &B::ImageView = current.frame.image.borrow();
        // Safety: see doc comment above; the reference only outlives the
        // `MutexGuard` because `current` is mutated exclusively by the
        // single-threaded recorder between, never during, command recording.
        unsafe { &*(view as *const B::ImageView) }
    }

    /// Takes ownership of the current-frame image, clearing the dyn-detail,
    /// for handing to [`Swapchain::present`].
    pub(crate) fn take_current(&self) -> (AcquiredFrame<B>, ImageState) {
        let current = self.current.lock().take().expect("[Swapchain] no current frame to present");
        (current.frame, current.state)
    }

    /// The frame-in-flight slot the swapchain's current-frame image was
    /// acquired into. Used by the recorder to thread the present-submit and
    /// next-acquire fences into the returned `Transaction` (spec.md §4.7
    /// step 1's "return both fences").
    pub(crate) fn current_frame_idx(&self) -> usize {
        self.current.lock().as_ref().expect("[Swapchain] no current frame acquired").frame.frame_idx
    }

    /// Non-blocking: whether frame slot `frame_idx`'s fence has signaled.
    pub(crate) fn frame_fence_signaled(&self, frame_idx: usize) -> bool {
        let frame = self.frames[frame_idx].lock();
        unsafe { self.shared.device.get_fence_status(&frame.fence) }.unwrap_or(false)
    }

    /// Blocks until frame slot `frame_idx`'s fence signals, retrying on
    /// timeout rather than treating it as success (spec §7's "fence waits
    /// are retried internally until success"). Non-destructive: the fence
    /// stays owned by this `Swapchain` and is reset the next time `acquire`
    /// reuses this slot.
    pub(crate) fn wait_frame_fence(&self, frame_idx: usize) -> Result<()> {
        let frame = self.frames[frame_idx].lock();
        loop {
            match unsafe { self.shared.device.wait_for_fence(&frame.fence, FENCE_TIMEOUT_NS) } {
                Ok(true) => return Ok(()),
                Ok(false) => continue,
                Err(e) => return Err(Error::gpu(self.label.clone(), e)),
            }
        }
    }

    /// Allocates a one-off primary command buffer from the swapchain's own
    /// pool. [`Swapchain::present`]'s caller must allocate its command buffer
    /// this way, never from one of the `Context`'s generic per-class pools:
    /// `acquire` frees the previous frame's command buffer back into this
    /// same pool, which would be undefined behavior against a buffer
    /// allocated elsewhere.
    pub(crate) fn allocate_command_buffer(&self) -> B::CommandBuffer {
        unsafe { self.command_pool.lock().allocate_one(gfx_hal::command::Level::Primary) }
    }
}

impl<B: Backend> Drop for Swapchain<B> {
    fn drop(&mut self) {
        let _ = self.shared.device.wait_idle();
        for frame in self.frames.drain(..) {
            let frame = frame.into_inner();
            unsafe {
                self.shared.device.destroy_semaphore(frame.rendering_complete);
                self.shared.device.destroy_fence(frame.fence);
            }
        }
    }
}

impl<B: Backend> std::fmt::Debug for Swapchain<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Swapchain")
            .field("label", &self.label)
            .field("format", &self.format)
            .field("frames_in_flight", &self.frames_in_flight)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_count_floors_at_one_frame_in_flight() {
        assert_eq!(frames_in_flight_count(0), 1);
        assert_eq!(frames_in_flight_count(1), 1);
        assert_eq!(frames_in_flight_count(3), 3);
    }
}
