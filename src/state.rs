//! The `(stage, access[, layout])` triple that is a resource's dynamic state,
//! the `Usage` a transition requests, and the fixed table mapping one to the
//! other. Grounded in spec.md §4.7's barrier-emission algorithm; the teacher
//! codebase has no equivalent (its single render pass in `graph/mod.rs` never
//! tracks synchronization state at all), so the table below is authored
//! directly from the specification rather than adapted from existing code.

use bitflags::bitflags;

use crate::compat::ToHalType;
use crate::format::Layout;

bitflags! {
    /// Pipeline stages a synchronization scope can be anchored to.
    pub struct PipelineStage: u32 {
        const TOP_OF_PIPE               = 0b0000_0000_0001;
        const HOST                      = 0b0000_0000_0010;
        const TRANSFER                  = 0b0000_0000_0100;
        const COMPUTE_SHADER            = 0b0000_0000_1000;
        const VERTEX_INPUT              = 0b0000_0001_0000;
        const VERTEX_SHADER             = 0b0000_0010_0000;
        const EARLY_FRAGMENT_TESTS      = 0b0000_0100_0000;
        const FRAGMENT_SHADER           = 0b0000_1000_0000;
        const LATE_FRAGMENT_TESTS       = 0b0001_0000_0000;
        const COLOR_ATTACHMENT_OUTPUT   = 0b0010_0000_0000;
        const BOTTOM_OF_PIPE            = 0b0100_0000_0000;
        const ALL_GRAPHICS              = Self::VERTEX_INPUT.bits | Self::VERTEX_SHADER.bits
            | Self::EARLY_FRAGMENT_TESTS.bits | Self::FRAGMENT_SHADER.bits
            | Self::LATE_FRAGMENT_TESTS.bits | Self::COLOR_ATTACHMENT_OUTPUT.bits;
        const ALL_COMMANDS              = 0b1000_0000_0000;
    }
}

bitflags! {
    /// Memory access kinds a synchronization scope can read or write.
    pub struct Access: u32 {
        const NONE                            = 0;
        const HOST_READ                       = 0b0000_0000_0001;
        const HOST_WRITE                      = 0b0000_0000_0010;
        const TRANSFER_READ                   = 0b0000_0000_0100;
        const TRANSFER_WRITE                  = 0b0000_0000_1000;
        const SHADER_READ                     = 0b0000_0001_0000;
        const SHADER_WRITE                    = 0b0000_0010_0000;
        const COLOR_ATTACHMENT_READ            = 0b0000_0100_0000;
        const COLOR_ATTACHMENT_WRITE           = 0b0000_1000_0000;
        const DEPTH_STENCIL_ATTACHMENT_READ     = 0b0001_0000_0000;
        const DEPTH_STENCIL_ATTACHMENT_WRITE    = 0b0010_0000_0000;
        const VERTEX_ATTRIBUTE_READ            = 0b0100_0000_0000;
        const INDEX_READ                      = 0b1000_0000_0000;
    }
}

/// The synchronization scope of a buffer: no layout component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferState {
    pub stage: PipelineStage,
    pub access: Access,
}

impl BufferState {
    pub const HOST_INITIAL: Self = BufferState {
        stage: PipelineStage::HOST,
        access: Access::NONE,
    };
}

/// The synchronization scope of an image: stage, access, and layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageState {
    pub stage: PipelineStage,
    pub access: Access,
    pub layout: Layout,
}

impl ImageState {
    pub const UNDEFINED: Self = ImageState {
        stage: PipelineStage::TOP_OF_PIPE,
        access: Access::NONE,
        layout: Layout::Undefined,
    };
}

/// A requested usage of a resource view, carried by an invocation's
/// transition list. Resolved to a destination `(stage, access[, layout])`
/// via [`buffer_destination`]/[`image_destination`] before being compared
/// against the resource's current dynamic state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Usage {
    TransferSrc,
    TransferDst,
    BufferUniform,
    BufferStorage,
    ImageSampled,
    ImageDepthSampled,
    ImageStorage,
    ColorAttachment,
    DepthAttachment,
    VertexInput,
    IndexInput,
    Present,
    Host,
}

/// Fixed table resolving a buffer usage request to a destination `(stage,
/// access)` pair. See spec.md §4.7 "Barrier emission".
pub fn buffer_destination(usage: Usage) -> BufferState {
    let (access, stage) = match usage {
        Usage::TransferSrc => (Access::TRANSFER_READ, PipelineStage::TRANSFER),
        Usage::TransferDst => (Access::TRANSFER_WRITE, PipelineStage::TRANSFER),
        Usage::BufferUniform => (
            Access::SHADER_READ,
            PipelineStage::ALL_GRAPHICS | PipelineStage::COMPUTE_SHADER,
        ),
        Usage::BufferStorage => (
            Access::SHADER_READ | Access::SHADER_WRITE,
            PipelineStage::ALL_GRAPHICS | PipelineStage::COMPUTE_SHADER,
        ),
        Usage::VertexInput => (Access::VERTEX_ATTRIBUTE_READ, PipelineStage::VERTEX_INPUT),
        Usage::IndexInput => (Access::INDEX_READ, PipelineStage::VERTEX_INPUT),
        Usage::Host => (Access::HOST_READ | Access::HOST_WRITE, PipelineStage::HOST),
        other => panic!("[state] {:?} is not a valid buffer usage", other),
    };
    BufferState { stage, access }
}

/// Fixed table resolving an image usage request to a destination `(stage,
/// access, layout)` triple. See spec.md §4.7 "Barrier emission".
pub fn image_destination(usage: Usage) -> ImageState {
    let (access, stage, layout) = match usage {
        Usage::TransferSrc => (
            Access::TRANSFER_READ,
            PipelineStage::TRANSFER,
            Layout::TransferSrcOptimal,
        ),
        Usage::TransferDst => (
            Access::TRANSFER_WRITE,
            PipelineStage::TRANSFER,
            Layout::TransferDstOptimal,
        ),
        Usage::ImageSampled => (
            Access::SHADER_READ,
            PipelineStage::ALL_GRAPHICS | PipelineStage::COMPUTE_SHADER,
            Layout::ShaderReadOnlyOptimal,
        ),
        Usage::ImageDepthSampled => (
            Access::SHADER_READ,
            PipelineStage::ALL_GRAPHICS | PipelineStage::COMPUTE_SHADER,
            Layout::DepthStencilReadOnlyOptimal,
        ),
        Usage::ImageStorage => (
            Access::SHADER_READ | Access::SHADER_WRITE,
            PipelineStage::ALL_GRAPHICS | PipelineStage::COMPUTE_SHADER,
            Layout::General,
        ),
        Usage::ColorAttachment => (
            Access::COLOR_ATTACHMENT_READ | Access::COLOR_ATTACHMENT_WRITE,
            PipelineStage::COLOR_ATTACHMENT_OUTPUT,
            Layout::ColorAttachmentOptimal,
        ),
        Usage::DepthAttachment => (
            Access::DEPTH_STENCIL_ATTACHMENT_READ | Access::DEPTH_STENCIL_ATTACHMENT_WRITE,
            PipelineStage::EARLY_FRAGMENT_TESTS | PipelineStage::LATE_FRAGMENT_TESTS,
            Layout::DepthStencilAttachmentOptimal,
        ),
        Usage::Present => (Access::NONE, PipelineStage::BOTTOM_OF_PIPE, Layout::PresentSrc),
        other => panic!("[state] {:?} is not a valid image usage", other),
    };
    ImageState { stage, access, layout }
}

impl ToHalType for PipelineStage {
    type Target = gfx_hal::pso::PipelineStage;

    fn convert(self) -> Self::Target {
        use gfx_hal::pso::PipelineStage as H;
        let mut out = H::empty();
        if self.contains(PipelineStage::TOP_OF_PIPE) {
            out |= H::TOP_OF_PIPE;
        }
        if self.contains(PipelineStage::HOST) {
            out |= H::HOST;
        }
        if self.contains(PipelineStage::TRANSFER) {
            out |= H::TRANSFER;
        }
        if self.contains(PipelineStage::COMPUTE_SHADER) {
            out |= H::COMPUTE_SHADER;
        }
        if self.contains(PipelineStage::VERTEX_INPUT) {
            out |= H::VERTEX_INPUT;
        }
        if self.contains(PipelineStage::VERTEX_SHADER) {
            out |= H::VERTEX_SHADER;
        }
        if self.contains(PipelineStage::EARLY_FRAGMENT_TESTS) {
            out |= H::EARLY_FRAGMENT_TESTS;
        }
        if self.contains(PipelineStage::FRAGMENT_SHADER) {
            out |= H::FRAGMENT_SHADER;
        }
        if self.contains(PipelineStage::LATE_FRAGMENT_TESTS) {
            out |= H::LATE_FRAGMENT_TESTS;
        }
        if self.contains(PipelineStage::COLOR_ATTACHMENT_OUTPUT) {
            out |= H::COLOR_ATTACHMENT_OUTPUT;
        }
        if self.contains(PipelineStage::BOTTOM_OF_PIPE) {
            out |= H::BOTTOM_OF_PIPE;
        }
        if self.contains(PipelineStage::ALL_COMMANDS) {
            out |= H::ALL_COMMANDS;
        }
        out
    }
}

impl ToHalType for Access {
    type Target = gfx_hal::image::Access;

    fn convert(self) -> Self::Target {
        use gfx_hal::image::Access as H;
        let mut out = H::empty();
        if self.contains(Access::HOST_READ) {
            out |= H::HOST_READ;
        }
        if self.contains(Access::HOST_WRITE) {
            out |= H::HOST_WRITE;
        }
        if self.contains(Access::TRANSFER_READ) {
            out |= H::TRANSFER_READ;
        }
        if self.contains(Access::TRANSFER_WRITE) {
            out |= H::TRANSFER_WRITE;
        }
        if self.contains(Access::SHADER_READ) {
            out |= H::SHADER_READ;
        }
        if self.contains(Access::SHADER_WRITE) {
            out |= H::SHADER_WRITE;
        }
        if self.contains(Access::COLOR_ATTACHMENT_READ) {
            out |= H::COLOR_ATTACHMENT_READ;
        }
        if self.contains(Access::COLOR_ATTACHMENT_WRITE) {
            out |= H::COLOR_ATTACHMENT_WRITE;
        }
        if self.contains(Access::DEPTH_STENCIL_ATTACHMENT_READ) {
            out |= H::DEPTH_STENCIL_ATTACHMENT_READ;
        }
        if self.contains(Access::DEPTH_STENCIL_ATTACHMENT_WRITE) {
            out |= H::DEPTH_STENCIL_ATTACHMENT_WRITE;
        }
        if self.contains(Access::VERTEX_ATTRIBUTE_READ) {
            out |= H::VERTEX_ATTRIBUTE_READ;
        }
        if self.contains(Access::INDEX_READ) {
            out |= H::INDEX_BUFFER_READ;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_src_to_dst_differs() {
        let src = image_destination(Usage::TransferSrc);
        let dst = image_destination(Usage::TransferDst);
        assert_ne!(src, dst);
    }

    #[test]
    fn storage_write_then_transfer_read_matches_s3_scenario() {
        // S3 — "automatic barrier insertion": compute writes a storage
        // buffer, then a transfer reads it.
        let write = buffer_destination(Usage::BufferStorage);
        let read = buffer_destination(Usage::TransferSrc);
        assert!(write.access.contains(Access::SHADER_WRITE));
        assert_eq!(write.stage, PipelineStage::ALL_GRAPHICS | PipelineStage::COMPUTE_SHADER);
        assert_eq!(read.access, Access::TRANSFER_READ);
        assert_eq!(read.stage, PipelineStage::TRANSFER);
        assert_ne!(write, read);
    }

    #[test]
    fn present_has_no_access() {
        assert_eq!(image_destination(Usage::Present).access, Access::NONE);
    }
}
