//! Pixel formats, color spaces, and image layouts. Mirrors the set gfx-hal
//! exposes; kept as our own closed enum rather than a passthrough so the rest
//! of the crate never has to depend on the backend at the API surface.

use gfx_hal::format::Format as HalFormat;
use gfx_hal::image::Layout as HalLayout;

use crate::compat::ToHalType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    R8Unorm,
    R8Snorm,
    R8Uint,
    R8Sint,
    R16Uint,
    R16Sint,
    R16Sfloat,
    Rg8Unorm,
    Rg8Snorm,
    Rg8Uint,
    Rg8Sint,
    R32Uint,
    R32Sint,
    R32Sfloat,
    Rg16Uint,
    Rg16Sint,
    Rg16Sfloat,
    Rgba8Unorm,
    Rgba8Srgb,
    Rgba8Snorm,
    Rgba8Uint,
    Rgba8Sint,
    Bgra8Unorm,
    Bgra8Srgb,
    Rg32Uint,
    Rg32Sint,
    Rg32Sfloat,
    Rgba16Uint,
    Rgba16Sint,
    Rgba16Sfloat,
    Rgba32Uint,
    Rgba32Sint,
    Rgba32Sfloat,
    /// Depth-only formats.
    Depth16Unorm,
    Depth32Sfloat,
    /// Depth-stencil formats.
    Depth24PlusStencil8,
    Depth32SfloatStencil8,
}

impl Format {
    /// True for formats usable as a `DepthImage`'s `depth_format`.
    pub fn is_depth(self) -> bool {
        matches!(
            self,
            Format::Depth16Unorm
                | Format::Depth32Sfloat
                | Format::Depth24PlusStencil8
                | Format::Depth32SfloatStencil8
        )
    }

    /// True when the format additionally carries a stencil plane.
    pub fn has_stencil(self) -> bool {
        matches!(self, Format::Depth24PlusStencil8 | Format::Depth32SfloatStencil8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    Linear,
    Srgb,
}

/// Layout of an image's memory at a point in time; the last element of an
/// `Image`'s dynamic-state triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    Undefined,
    General,
    ColorAttachmentOptimal,
    DepthStencilAttachmentOptimal,
    DepthStencilReadOnlyOptimal,
    ShaderReadOnlyOptimal,
    TransferSrcOptimal,
    TransferDstOptimal,
    Preinitialized,
    PresentSrc,
}

impl ToHalType for Format {
    type Target = HalFormat;

    fn convert(self) -> HalFormat {
        match self {
            Format::R8Unorm => HalFormat::R8Unorm,
            Format::R8Snorm => HalFormat::R8Snorm,
            Format::R8Uint => HalFormat::R8Uint,
            Format::R8Sint => HalFormat::R8Sint,
            Format::R16Uint => HalFormat::R16Uint,
            Format::R16Sint => HalFormat::R16Sint,
            Format::R16Sfloat => HalFormat::R16Sfloat,
            Format::Rg8Unorm => HalFormat::Rg8Unorm,
            Format::Rg8Snorm => HalFormat::Rg8Snorm,
            Format::Rg8Uint => HalFormat::Rg8Uint,
            Format::Rg8Sint => HalFormat::Rg8Sint,
            Format::R32Uint => HalFormat::R32Uint,
            Format::R32Sint => HalFormat::R32Sint,
            Format::R32Sfloat => HalFormat::R32Sfloat,
            Format::Rg16Uint => HalFormat::Rg16Uint,
            Format::Rg16Sint => HalFormat::Rg16Sint,
            Format::Rg16Sfloat => HalFormat::Rg16Sfloat,
            Format::Rgba8Unorm => HalFormat::Rgba8Unorm,
            Format::Rgba8Srgb => HalFormat::Rgba8Srgb,
            Format::Rgba8Snorm => HalFormat::Rgba8Snorm,
            Format::Rgba8Uint => HalFormat::Rgba8Uint,
            Format::Rgba8Sint => HalFormat::Rgba8Sint,
            Format::Bgra8Unorm => HalFormat::Bgra8Unorm,
            Format::Bgra8Srgb => HalFormat::Bgra8Srgb,
            Format::Rg32Uint => HalFormat::Rg32Uint,
            Format::Rg32Sint => HalFormat::Rg32Sint,
            Format::Rg32Sfloat => HalFormat::Rg32Sfloat,
            Format::Rgba16Uint => HalFormat::Rgba16Uint,
            Format::Rgba16Sint => HalFormat::Rgba16Sint,
            Format::Rgba16Sfloat => HalFormat::Rgba16Sfloat,
            Format::Rgba32Uint => HalFormat::Rgba32Uint,
            Format::Rgba32Sint => HalFormat::Rgba32Sint,
            Format::Rgba32Sfloat => HalFormat::Rgba32Sfloat,
            Format::Depth16Unorm => HalFormat::D16Unorm,
            Format::Depth32Sfloat => HalFormat::D32Sfloat,
            Format::Depth24PlusStencil8 => HalFormat::D24UnormS8Uint,
            Format::Depth32SfloatStencil8 => HalFormat::D32SfloatS8Uint,
        }
    }
}

impl ToHalType for Layout {
    type Target = HalLayout;

    fn convert(self) -> HalLayout {
        match self {
            Layout::Undefined => HalLayout::Undefined,
            Layout::General => HalLayout::General,
            Layout::ColorAttachmentOptimal => HalLayout::ColorAttachmentOptimal,
            Layout::DepthStencilAttachmentOptimal => HalLayout::DepthStencilAttachmentOptimal,
            Layout::DepthStencilReadOnlyOptimal => HalLayout::DepthStencilReadOnlyOptimal,
            Layout::ShaderReadOnlyOptimal => HalLayout::ShaderReadOnlyOptimal,
            Layout::TransferSrcOptimal => HalLayout::TransferSrcOptimal,
            Layout::TransferDstOptimal => HalLayout::TransferDstOptimal,
            Layout::Preinitialized => HalLayout::Preinitialized,
            Layout::PresentSrc => HalLayout::Present,
        }
    }
}
