//! Color image resource. Grounded in `util/format.rs::TextureFormat` (now
//! `crate::format::Format`) and the teacher's pool/handle idioms, generalized
//! to the full immutable config + mutable `(stage, access, layout)` triple
//! spec §3 requires.

use std::sync::Arc;

use bitflags::bitflags;
use gfx_hal::device::Device;
use parking_lot::Mutex;

use crate::allocator::AllocationIndex;
use crate::allocator::MemoryType;
use crate::compat::ToHalType;
use crate::context::{Context, Shared};
use crate::error::{Error, Label, Result};
use crate::format::{ColorSpace, Format};
use crate::handle::{Destroy, Handle};
use crate::state::ImageState;

bitflags! {
    /// Mirrors spec §3's color-image usage bitset `{transferSrc, transferDst,
    /// sampled, storage, attachment, subpassData, tileMemory, present}`.
    pub struct ImageUsage: u32 {
        const TRANSFER_SRC  = 0b0000_0001;
        const TRANSFER_DST  = 0b0000_0010;
        const SAMPLED       = 0b0000_0100;
        const STORAGE       = 0b0000_1000;
        const ATTACHMENT    = 0b0001_0000;
        const SUBPASS_DATA  = 0b0010_0000;
        const TILE_MEMORY   = 0b0100_0000;
        const PRESENT       = 0b1000_0000;
    }
}

impl ToHalType for ImageUsage {
    type Target = gfx_hal::image::Usage;

    fn convert(self) -> Self::Target {
        use gfx_hal::image::Usage as H;
        let mut out = H::empty();
        if self.contains(ImageUsage::TRANSFER_SRC) {
            out |= H::TRANSFER_SRC;
        }
        if self.contains(ImageUsage::TRANSFER_DST) {
            out |= H::TRANSFER_DST;
        }
        if self.contains(ImageUsage::SAMPLED) {
            out |= H::SAMPLED;
        }
        if self.contains(ImageUsage::STORAGE) {
            out |= H::STORAGE;
        }
        if self.contains(ImageUsage::ATTACHMENT) {
            out |= H::COLOR_ATTACHMENT;
        }
        if self.contains(ImageUsage::SUBPASS_DATA) {
            out |= H::INPUT_ATTACHMENT;
        }
        if self.contains(ImageUsage::TILE_MEMORY) {
            out |= H::TRANSIENT_ATTACHMENT;
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct ImageConfig {
    pub label: Label,
    pub width: u32,
    pub height: u32,
    /// `0` means "not a 3D image"; stored as `depth - 1` planes on the HAL
    /// side per spec §3.
    pub depth: u32,
    pub format: Format,
    pub color_space: ColorSpace,
    pub usage: ImageUsage,
}

/// A live color image: immutable config plus the mutable `(stage, access,
/// layout)` dynamic state the recorder updates as barriers are emitted.
pub struct Image<B: gfx_hal::Backend> {
    pub(crate) shared: Arc<Shared<B>>,
    pub(crate) handle: Handle<B::Image, Shared<B>>,
    pub(crate) memory: AllocationIndex,
    pub(crate) label: Label,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) depth: u32,
    pub(crate) format: Format,
    pub(crate) color_space: ColorSpace,
    pub(crate) usage: ImageUsage,
    pub(crate) state: Mutex<ImageState>,
}

impl<B: gfx_hal::Backend> Image<B> {
    /// Creates a color image, allocates device-local memory for it, and
    /// binds it. Images are never host-accessible directly (spec §3); any
    /// host traffic goes through a staging `Buffer` and a transfer.
    pub fn new(context: &Arc<Context<B>>, config: ImageConfig) -> Result<Arc<Self>> {
        use gfx_hal::image::{Kind, Tiling, ViewCapabilities};

        let shared = context.shared().clone();
        let kind = if config.depth > 1 {
            Kind::D3(config.width, config.height, config.depth)
        } else {
            Kind::D2(config.width, config.height, 1, 1)
        };
        let mut raw = unsafe {
            shared
                .device
                .create_image(
                    kind,
                    1,
                    config.format.convert(),
                    Tiling::Optimal,
                    config.usage.convert(),
                    gfx_hal::memory::SparseFlags::empty(),
                    ViewCapabilities::empty(),
                )
                .map_err(|e| Error::gpu(config.label.clone(), e))?
        };
        let requirements = unsafe { shared.device.get_image_requirements(&raw) };
        let memory = shared.allocator.alloc(requirements.size, MemoryType::DeviceLocal, Some(requirements));
        shared.allocator.bind_image(&memory, &mut raw);

        Ok(Arc::new(Self {
            shared: shared.clone(),
            handle: Handle::new(raw, shared),
            memory,
            label: config.label,
            width: config.width,
            height: config.height,
            depth: config.depth,
            format: config.format,
            color_space: config.color_space,
            usage: config.usage,
            state: Mutex::new(ImageState::UNDEFINED),
        }))
    }

    pub(crate) fn raw(&self) -> &B::Image {
        self.handle.get()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    pub fn usage(&self) -> ImageUsage {
        self.usage
    }

    pub(crate) fn state(&self) -> ImageState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, new: ImageState) {
        *self.state.lock() = new;
    }

    /// Creates an owned HAL image view over the whole image, borrowing this
    /// image by reference count.
    pub fn view(self: &Arc<Self>) -> Result<ImageView<B>, crate::error::Error> {
        use gfx_hal::format::Swizzle;
        use gfx_hal::image::{SubresourceRange, ViewKind};

        let raw = unsafe {
            self.shared
                .device
                .create_image_view(
                    self.handle.get(),
                    if self.depth > 1 { ViewKind::D3 } else { ViewKind::D2 },
                    self.format.convert(),
                    Swizzle::NO,
                    SubresourceRange {
                        aspects: gfx_hal::format::Aspects::COLOR,
                        level_start: 0,
                        level_count: None,
                        layer_start: 0,
                        layer_count: None,
                    },
                )
                .map_err(|e| crate::error::Error::gpu(self.label.clone(), e))?
        };
        Ok(ImageView {
            image: self.clone(),
            view: Handle::new(raw, self.shared.clone()),
            sampler: None,
        })
    }
}

impl<B: gfx_hal::Backend> Destroy<B::Image> for Shared<B> {
    fn destroy(&self, value: B::Image) {
        unsafe { self.device.destroy_image(value) };
    }
}

impl<B: gfx_hal::Backend> Destroy<B::ImageView> for Shared<B> {
    fn destroy(&self, value: B::ImageView) {
        unsafe { self.device.destroy_image_view(value) };
    }
}

impl<B: gfx_hal::Backend> Drop for Image<B> {
    fn drop(&mut self) {
        self.shared.allocator.deallocate(self.memory);
    }
}

impl<B: gfx_hal::Backend> std::fmt::Debug for Image<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("label", &self.label)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .finish()
    }
}

/// A `(resource reference, region, sampler choice)` value; owns the derived
/// HAL image-view object it creates, but never the underlying `Image`.
pub struct ImageView<B: gfx_hal::Backend> {
    pub image: Arc<Image<B>>,
    pub(crate) view: Handle<B::ImageView, Shared<B>>,
    pub sampler: Option<crate::resource::sampler::SamplerKey>,
}

impl<B: gfx_hal::Backend> ImageView<B> {
    pub fn raw(&self) -> &B::ImageView {
        self.view.get()
    }

    pub fn with_sampler(mut self, key: crate::resource::sampler::SamplerKey) -> Self {
        self.sampler = Some(key);
        self
    }
}
