//! RenderPass: attachment assembly and the framebuffer pool keyed by
//! `(render-pass id, attachment-view ids)`. Grounded in
//! `graph/builder.rs::build_pass_node` (attachment/subpass assembly from
//! load/store bits), generalized from its graph-attachment-index scheme
//! into the flat `RenderPassConfig{width, height, attm_cfgs}` of spec §6.

use std::sync::Arc;

use bitflags::bitflags;
use gfx_hal::device::Device;
use gfx_hal::pass::{Attachment, AttachmentOps, SubpassDesc};

use crate::compat::{Clear, ToHalType};
use crate::context::Shared;
use crate::error::{Error, Label, Result};
use crate::format::{ColorSpace, Format};
use crate::handle::{Destroy, Handle};
use crate::pool::PoolManager;

bitflags! {
    /// An attachment's access bits; load/store ops are derived from these
    /// per spec §4.5 (clear if `CLEAR` set, else load if `LOAD` set, else
    /// dont-care; store if `STORE` set, else dont-care).
    pub struct AttachmentAccess: u32 {
        const CLEAR = 0b0001;
        const LOAD  = 0b0010;
        const STORE = 0b0100;
        const FETCH = 0b1000;
    }
}

#[derive(Debug, Clone)]
pub enum AttachmentKind {
    Color { format: Format, color_space: ColorSpace },
    Depth { format: Format },
}

#[derive(Debug, Clone)]
pub struct AttachmentConfig {
    pub kind: AttachmentKind,
    pub access: AttachmentAccess,
}

impl AttachmentConfig {
    fn load_op(&self) -> gfx_hal::pass::AttachmentLoadOp {
        use gfx_hal::pass::AttachmentLoadOp as L;
        if self.access.contains(AttachmentAccess::CLEAR) {
            L::Clear
        } else if self.access.contains(AttachmentAccess::LOAD) {
            L::Load
        } else {
            L::DontCare
        }
    }

    fn store_op(&self) -> gfx_hal::pass::AttachmentStoreOp {
        use gfx_hal::pass::AttachmentStoreOp as S;
        if self.access.contains(AttachmentAccess::STORE) {
            S::Store
        } else {
            S::DontCare
        }
    }

    fn format(&self) -> Format {
        match self.kind {
            AttachmentKind::Color { format, .. } => format,
            AttachmentKind::Depth { format } => format,
        }
    }

    fn default_clear(&self) -> Clear {
        match self.kind {
            AttachmentKind::Color { .. } => Clear::Color(0.0, 0.0, 0.0, 0.0),
            AttachmentKind::Depth { .. } => Clear::Depth(1.0, 0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderPassConfig {
    pub label: Label,
    pub width: u32,
    pub height: u32,
    pub attm_cfgs: Vec<AttachmentConfig>,
}

/// A unique id for a constructed `RenderPass`, used as half of the
/// framebuffer-pool key.
pub type RenderPassId = u64;

/// Attachment-view identities; the other half of the framebuffer-pool key.
/// Uses the raw view pointer identity, matching spec §4.2's "attachment-view
/// ids" (views are never deduplicated beyond pointer equality).
pub type AttachmentViewKey = Vec<usize>;

pub(crate) type FramebufferKey = (RenderPassId, AttachmentViewKey);

static NEXT_RENDER_PASS_ID: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);

pub struct RenderPass<B: gfx_hal::Backend> {
    pub(crate) shared: Arc<Shared<B>>,
    pub(crate) id: RenderPassId,
    pub(crate) handle: Handle<B::RenderPass, Shared<B>>,
    pub(crate) label: Label,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) attachments: Vec<AttachmentConfig>,
    pub(crate) clear_values: Vec<Clear>,
    pub(crate) depth_index: Option<usize>,
    pub(crate) framebuffers: Arc<PoolManager<FramebufferKey, Handle<B::Framebuffer, Shared<B>>>>,
}

impl<B: gfx_hal::Backend> RenderPass<B> {
    pub fn new(shared: Arc<Shared<B>>, config: RenderPassConfig) -> Result<Arc<Self>> {
        let depth_count = config
            .attm_cfgs
            .iter()
            .filter(|a| matches!(a.kind, AttachmentKind::Depth { .. }))
            .count();
        if depth_count > 1 {
            return Err(Error::invalid_config(config.label.clone(), "a subpass may have at most one depth attachment"));
        }

        let attachments: Vec<Attachment> = config
            .attm_cfgs
            .iter()
            .map(|a| {
                let layout = match a.kind {
                    AttachmentKind::Color { .. } => gfx_hal::image::Layout::ColorAttachmentOptimal,
                    AttachmentKind::Depth { .. } => gfx_hal::image::Layout::DepthStencilAttachmentOptimal,
                };
                Attachment {
                    format: Some(a.format().convert()),
                    samples: 1,
                    ops: AttachmentOps::new(a.load_op(), a.store_op()),
                    stencil_ops: AttachmentOps::DONT_CARE,
                    layouts: gfx_hal::image::Layout::Undefined..layout,
                }
            })
            .collect();

        // Indices follow each attachment's actual position in `attm_cfgs`
        // rather than assuming color attachments precede the depth one —
        // spec §4.5 only orders color attachments among themselves.
        let color_refs: Vec<(usize, gfx_hal::image::Layout)> = config
            .attm_cfgs
            .iter()
            .enumerate()
            .filter(|(_, a)| matches!(a.kind, AttachmentKind::Color { .. }))
            .map(|(i, _)| (i, gfx_hal::image::Layout::ColorAttachmentOptimal))
            .collect();
        let depth_ref = config
            .attm_cfgs
            .iter()
            .enumerate()
            .find(|(_, a)| matches!(a.kind, AttachmentKind::Depth { .. }))
            .map(|(i, _)| (i, gfx_hal::image::Layout::DepthStencilAttachmentOptimal));

        let subpass = SubpassDesc {
            colors: &color_refs,
            depth_stencil: depth_ref.as_ref(),
            inputs: &[],
            resolves: &[],
            preserves: &[],
        };

        let handle = unsafe {
            shared
                .device
                .create_render_pass(
                    attachments.into_iter(),
                    std::iter::once(subpass),
                    std::iter::empty::<gfx_hal::pass::SubpassDependency>(),
                )
                .map_err(|e| Error::gpu(config.label.clone(), e))?
        };

        let clear_values = config.attm_cfgs.iter().map(|a| a.default_clear()).collect();
        let depth_index = depth_ref.map(|(i, _)| i);
        let id = NEXT_RENDER_PASS_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        Ok(Arc::new(Self {
            shared: shared.clone(),
            id,
            handle: Handle::new(handle, shared),
            label: config.label,
            width: config.width,
            height: config.height,
            attachments: config.attm_cfgs,
            clear_values,
            depth_index,
            framebuffers: Arc::new(PoolManager::new()),
        }))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub(crate) fn raw(&self) -> &B::RenderPass {
        self.handle.get()
    }

    pub fn clear_values(&self) -> &[Clear] {
        &self.clear_values
    }

    pub fn set_clear_value(&mut self, index: usize, clear: Clear) {
        self.clear_values[index] = clear;
    }

    /// Leases a framebuffer for the given attachment views, minting one sized
    /// to this render pass's dimensions if this exact view combination hasn't
    /// been seen before.
    pub fn acquire_framebuffer<'a>(
        self: &Arc<Self>,
        view_key: AttachmentViewKey,
        views: impl IntoIterator<Item = &'a B::ImageView>,
    ) -> crate::pool::PoolItem<FramebufferKey, Handle<B::Framebuffer, Shared<B>>>
    where
        B::ImageView: 'a,
    {
        let key: FramebufferKey = (self.id, view_key);
        let shared = self.shared.clone();
        let handle = self.handle.get();
        let extent = gfx_hal::image::Extent {
            width: self.width,
            height: self.height,
            depth: 1,
        };
        let views: Vec<&B::ImageView> = views.into_iter().collect();
        self.framebuffers.acquire(key, move || {
            let raw = unsafe {
                shared
                    .device
                    .create_framebuffer(handle, views, extent)
                    .expect("[RenderPass] failed to create framebuffer")
            };
            Handle::new(raw, shared.clone())
        })
    }
}

impl<B: gfx_hal::Backend> Destroy<B::RenderPass> for Shared<B> {
    fn destroy(&self, value: B::RenderPass) {
        unsafe { self.device.destroy_render_pass(value) };
    }
}

impl<B: gfx_hal::Backend> std::fmt::Debug for RenderPass<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPass").field("label", &self.label).field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_store_derivation_matches_spec_table() {
        let clear_store = AttachmentConfig {
            kind: AttachmentKind::Color { format: Format::Rgba8Unorm, color_space: ColorSpace::Srgb },
            access: AttachmentAccess::CLEAR | AttachmentAccess::STORE,
        };
        assert_eq!(clear_store.load_op(), gfx_hal::pass::AttachmentLoadOp::Clear);
        assert_eq!(clear_store.store_op(), gfx_hal::pass::AttachmentStoreOp::Store);

        let load_only = AttachmentConfig {
            kind: AttachmentKind::Color { format: Format::Rgba8Unorm, color_space: ColorSpace::Srgb },
            access: AttachmentAccess::LOAD,
        };
        assert_eq!(load_only.load_op(), gfx_hal::pass::AttachmentLoadOp::Load);
        assert_eq!(load_only.store_op(), gfx_hal::pass::AttachmentStoreOp::DontCare);

        let bare = AttachmentConfig {
            kind: AttachmentKind::Depth { format: Format::Depth32Sfloat },
            access: AttachmentAccess::empty(),
        };
        assert_eq!(bare.load_op(), gfx_hal::pass::AttachmentLoadOp::DontCare);
        assert_eq!(bare.default_clear(), Clear::Depth(1.0, 0));
    }
}
