//! Depth/depth-stencil image resource: as `Image`, but the usage bitset omits
//! `transferSrc`/`transferDst`/`present` (spec §3) and the image view's
//! aspect mask is derived from whether the format carries a stencil plane.

use std::sync::Arc;

use bitflags::bitflags;
use gfx_hal::device::Device;
use parking_lot::Mutex;

use crate::allocator::{AllocationIndex, MemoryType};
use crate::compat::ToHalType;
use crate::context::{Context, Shared};
use crate::error::{Error, Label, Result};
use crate::format::Format;
use crate::handle::Handle;
use crate::state::ImageState;

bitflags! {
    /// Mirrors spec §3's depth-image usage bitset
    /// `{sampled, attachment, subpassData, tileMemory}`.
    pub struct DepthImageUsage: u32 {
        const SAMPLED       = 0b0001;
        const ATTACHMENT    = 0b0010;
        const SUBPASS_DATA  = 0b0100;
        const TILE_MEMORY   = 0b1000;
    }
}

impl ToHalType for DepthImageUsage {
    type Target = gfx_hal::image::Usage;

    fn convert(self) -> Self::Target {
        use gfx_hal::image::Usage as H;
        let mut out = H::empty();
        if self.contains(DepthImageUsage::SAMPLED) {
            out |= H::SAMPLED;
        }
        if self.contains(DepthImageUsage::ATTACHMENT) {
            out |= H::DEPTH_STENCIL_ATTACHMENT;
        }
        if self.contains(DepthImageUsage::SUBPASS_DATA) {
            out |= H::INPUT_ATTACHMENT;
        }
        if self.contains(DepthImageUsage::TILE_MEMORY) {
            out |= H::TRANSIENT_ATTACHMENT;
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct DepthImageConfig {
    pub label: Label,
    pub width: u32,
    pub height: u32,
    pub depth_format: Format,
    pub usage: DepthImageUsage,
}

pub struct DepthImage<B: gfx_hal::Backend> {
    pub(crate) shared: Arc<Shared<B>>,
    pub(crate) handle: Handle<B::Image, Shared<B>>,
    pub(crate) memory: AllocationIndex,
    pub(crate) label: Label,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) format: Format,
    pub(crate) usage: DepthImageUsage,
    pub(crate) state: Mutex<ImageState>,
}

impl<B: gfx_hal::Backend> DepthImage<B> {
    pub fn new(context: &Arc<Context<B>>, config: DepthImageConfig) -> Result<Arc<Self>> {
        use gfx_hal::image::{Kind, Tiling, ViewCapabilities};

        let shared = context.shared().clone();
        let kind = Kind::D2(config.width, config.height, 1, 1);
        let mut raw = unsafe {
            shared
                .device
                .create_image(
                    kind,
                    1,
                    config.depth_format.convert(),
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
            format: config.depth_format,
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

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn usage(&self) -> DepthImageUsage {
        self.usage
    }

    pub(crate) fn state(&self) -> ImageState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, new: ImageState) {
        *self.state.lock() = new;
    }

    pub(crate) fn aspects(&self) -> gfx_hal::format::Aspects {
        if self.format.has_stencil() {
            gfx_hal::format::Aspects::DEPTH | gfx_hal::format::Aspects::STENCIL
        } else {
            gfx_hal::format::Aspects::DEPTH
        }
    }

    pub fn view(self: &Arc<Self>) -> Result<DepthImageView<B>, Error> {
        use gfx_hal::format::Swizzle;
        use gfx_hal::image::{SubresourceRange, ViewKind};

        let raw = unsafe {
            self.shared
                .device
                .create_image_view(
                    self.handle.get(),
                    ViewKind::D2,
                    self.format.convert(),
                    Swizzle::NO,
                    SubresourceRange {
                        aspects: self.aspects(),
                        level_start: 0,
                        level_count: None,
                        layer_start: 0,
                        layer_count: None,
                    },
                )
                .map_err(|e| Error::gpu(self.label.clone(), e))?
        };
        Ok(DepthImageView {
            image: self.clone(),
            view: Handle::new(raw, self.shared.clone()),
        })
    }
}

impl<B: gfx_hal::Backend> Drop for DepthImage<B> {
    fn drop(&mut self) {
        self.shared.allocator.deallocate(self.memory);
    }
}

impl<B: gfx_hal::Backend> std::fmt::Debug for DepthImage<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepthImage")
            .field("label", &self.label)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .finish()
    }
}

pub struct DepthImageView<B: gfx_hal::Backend> {
    pub image: Arc<DepthImage<B>>,
    pub(crate) view: Handle<B::ImageView, Shared<B>>,
}

impl<B: gfx_hal::Backend> DepthImageView<B> {
    pub fn raw(&self) -> &B::ImageView {
        self.view.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stencil_formats_add_stencil_aspect() {
        assert!(Format::Depth24PlusStencil8.has_stencil());
        assert!(!Format::Depth32Sfloat.has_stencil());
    }
}
