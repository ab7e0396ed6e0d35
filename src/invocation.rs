//! The invocation IR (spec §4.6): a tree whose leaves are single GPU
//! operations and whose interior nodes are render passes or composites. The
//! teacher codebase has no equivalent tree type (`graph/mod.rs` records a
//! single fixed pass inline), so the variant shapes below are authored
//! directly from spec §4.6's table rather than adapted from existing code;
//! the *type-level* enforcement of "RenderPass children are all Graphics"
//! and "Composite children are never Graphics" follows the crate's existing
//! pattern of using the type system instead of runtime checks wherever a
//! structural constraint can be expressed that way (see `task/mod.rs`).

use std::sync::Arc;

use gfx_hal::Backend;

use crate::context::SubmitClass;
use crate::error::{Error, Label, Result};
use crate::render_pass::RenderPass;
use crate::resource::{BufferView, DepthImageView, ImageView};
use crate::state::Usage;
use crate::swapchain::Swapchain;
use crate::task::{ComputeTask, GraphicsTask, IndexType, ResourceBinding};

/// A resource view as it appears in a transition list, erased to the three
/// kinds a transition can target. Depth images are deliberately absent from
/// [`TransferEndpoint`] below so "depth images cannot appear as transfer
/// sources or destinations" (spec §4.6) is a compile error, not a runtime
/// check. Borrows from the owning invocation rather than cloning, since
/// `ImageView`/`DepthImageView` own a HAL view handle and are not `Clone`.
pub enum TransitionTarget<'a, B: Backend> {
    Buffer(&'a BufferView<B>),
    Image(&'a ImageView<B>),
    DepthImage(&'a DepthImageView<B>),
    Swapchain(&'a Arc<Swapchain<B>>),
}

/// One entry of an invocation's transition list: a view and the usage the
/// invocation requires of it. The recorder resolves `usage` to a destination
/// `(stage, access[, layout])` via [`crate::state::buffer_destination`] /
/// [`crate::state::image_destination`].
pub struct Transition<'a, B: Backend> {
    pub target: TransitionTarget<'a, B>,
    pub usage: Usage,
}

impl<'a, B: Backend> Transition<'a, B> {
    fn buffer(view: &'a BufferView<B>, usage: Usage) -> Self {
        Self { target: TransitionTarget::Buffer(view), usage }
    }
    fn image(view: &'a ImageView<B>, usage: Usage) -> Self {
        Self { target: TransitionTarget::Image(view), usage }
    }
    fn depth_image(view: &'a DepthImageView<B>, usage: Usage) -> Self {
        Self { target: TransitionTarget::DepthImage(view), usage }
    }

    fn swapchain(swapchain: &'a Arc<Swapchain<B>>, usage: Usage) -> Self {
        Self { target: TransitionTarget::Swapchain(swapchain), usage }
    }
}

fn binding_transition<B: Backend>(binding: &ResourceBinding<B>) -> Transition<'_, B> {
    let usage = binding.ty().usage();
    match binding {
        ResourceBinding::UniformBuffer(v) | ResourceBinding::StorageBuffer(v) => Transition::buffer(v, usage),
        ResourceBinding::SampledImage(v) | ResourceBinding::StorageImage(v) => Transition::image(v, usage),
        ResourceBinding::DepthSampledImage(v) => Transition::depth_image(v, usage),
    }
}

fn check_bindings<B: Backend>(label: &Label, expected: &[crate::binding::ResourceType], bindings: &[ResourceBinding<B>]) -> Result<()> {
    if expected.len() != bindings.len() {
        return Err(Error::invalid_config(
            label.clone(),
            format!("expected {} resource bindings, got {}", expected.len(), bindings.len()),
        ));
    }
    for (i, (want, got)) in expected.iter().zip(bindings.iter()).enumerate() {
        if *want != got.ty() {
            return Err(Error::invalid_config(label.clone(), format!("binding {} kind mismatch", i)));
        }
    }
    Ok(())
}

/// One half of a transfer's (src, dst) pair. Buffer or (color) image only;
/// see [`TransitionTarget`].
pub enum TransferEndpoint<B: Backend> {
    Buffer(BufferView<B>),
    Image(ImageView<B>),
}

impl<B: Backend> TransferEndpoint<B> {
    fn transition(&self, usage: Usage) -> Transition<'_, B> {
        match self {
            TransferEndpoint::Buffer(v) => Transition::buffer(v, usage),
            TransferEndpoint::Image(v) => Transition::image(v, usage),
        }
    }
}

pub struct TransferInvocation<B: Backend> {
    pub(crate) label: Label,
    pub(crate) is_timed: bool,
    pub(crate) src: TransferEndpoint<B>,
    pub(crate) dst: TransferEndpoint<B>,
    pub(crate) size: u64,
}

impl<B: Backend> TransferInvocation<B> {
    pub fn new(label: impl Into<Label>, src: TransferEndpoint<B>, dst: TransferEndpoint<B>, size: u64, is_timed: bool) -> Self {
        Self { label: label.into(), is_timed, src, dst, size }
    }

    pub(crate) fn submit_class(&self) -> SubmitClass {
        SubmitClass::Transfer
    }

    pub(crate) fn transitions(&self) -> Vec<Transition<'_, B>> {
        vec![self.src.transition(Usage::TransferSrc), self.dst.transition(Usage::TransferDst)]
    }
}

/// Either an indexed or a non-indexed draw, mutually exclusive per spec §4.6
/// ("index buffer view + index type + nidx OR nvert").
pub enum DrawCall<B: Backend> {
    Indexed { indices: BufferView<B>, index_type: IndexType, index_count: u32 },
    Vertices { vertex_count: u32 },
}

pub struct ComputeInvocation<B: Backend> {
    pub(crate) label: Label,
    pub(crate) is_timed: bool,
    pub(crate) task: Arc<ComputeTask<B>>,
    pub(crate) bindings: Vec<ResourceBinding<B>>,
    pub(crate) workgroup_count: (u32, u32, u32),
}

impl<B: Backend> ComputeInvocation<B> {
    pub fn new(
        label: impl Into<Label>,
        task: Arc<ComputeTask<B>>,
        bindings: Vec<ResourceBinding<B>>,
        workgroup_count: (u32, u32, u32),
        is_timed: bool,
    ) -> Result<Self> {
        let label = label.into();
        check_bindings(&label, task.rsc_tys(), &bindings)?;
        Ok(Self { label, is_timed, task, bindings, workgroup_count })
    }

    pub(crate) fn submit_class(&self) -> SubmitClass {
        SubmitClass::Compute
    }

    pub(crate) fn transitions(&self) -> Vec<Transition<'_, B>> {
        self.bindings.iter().map(binding_transition).collect()
    }
}

pub struct GraphicsInvocation<B: Backend> {
    pub(crate) label: Label,
    pub(crate) is_timed: bool,
    pub(crate) task: Arc<GraphicsTask<B>>,
    pub(crate) bindings: Vec<ResourceBinding<B>>,
    pub(crate) vertex_buffers: Vec<BufferView<B>>,
    pub(crate) draw: DrawCall<B>,
    pub(crate) instance_count: u32,
}

impl<B: Backend> GraphicsInvocation<B> {
    pub fn new(
        label: impl Into<Label>,
        task: Arc<GraphicsTask<B>>,
        bindings: Vec<ResourceBinding<B>>,
        vertex_buffers: Vec<BufferView<B>>,
        draw: DrawCall<B>,
        instance_count: u32,
        is_timed: bool,
    ) -> Result<Self> {
        let label = label.into();
        check_bindings(&label, task.rsc_tys(), &bindings)?;
        Ok(Self {
            label,
            is_timed,
            task,
            bindings,
            vertex_buffers,
            draw,
            instance_count,
        })
    }

    pub(crate) fn submit_class(&self) -> SubmitClass {
        SubmitClass::Graphics
    }

    pub(crate) fn transitions(&self) -> Vec<Transition<'_, B>> {
        let mut out: Vec<Transition<'_, B>> = self.bindings.iter().map(binding_transition).collect();
        for v in &self.vertex_buffers {
            out.push(Transition::buffer(v, Usage::VertexInput));
        }
        if let DrawCall::Indexed { indices, .. } = &self.draw {
            out.push(Transition::buffer(indices, Usage::IndexInput));
        }
        out
    }
}

/// One render-pass attachment, tagged by the kind its config declared.
/// [`AttachmentView::Swapchain`] targets a swapchain's current-frame image
/// directly (spec §3's swapchain dyn-detail) — the S5/S6 "render, then
/// present" scenarios attach a render pass's color output straight to the
/// image the next `PresentInvocation` will hand back to the surface, rather
/// than going through an owned [`Image`](crate::resource::Image) and a copy.
pub enum AttachmentView<B: Backend> {
    Color(ImageView<B>),
    Depth(DepthImageView<B>),
    Swapchain(Arc<Swapchain<B>>),
}

pub struct RenderPassInvocation<B: Backend> {
    pub(crate) label: Label,
    pub(crate) is_timed: bool,
    pub(crate) render_pass: Arc<RenderPass<B>>,
    pub(crate) attachments: Vec<AttachmentView<B>>,
    pub(crate) children: Vec<GraphicsInvocation<B>>,
}

impl<B: Backend> RenderPassInvocation<B> {
    pub fn new(
        label: impl Into<Label>,
        render_pass: Arc<RenderPass<B>>,
        attachments: Vec<AttachmentView<B>>,
        children: Vec<GraphicsInvocation<B>>,
        is_timed: bool,
    ) -> Result<Self> {
        let label = label.into();
        if attachments.len() != render_pass.attachments.len() {
            return Err(Error::invalid_config(
                label,
                format!(
                    "render pass expects {} attachments, got {}",
                    render_pass.attachments.len(),
                    attachments.len()
                ),
            ));
        }
        for (i, (cfg, view)) in render_pass.attachments.iter().zip(attachments.iter()).enumerate() {
            let matches = matches!(
                (&cfg.kind, view),
                (crate::render_pass::AttachmentKind::Color { .. }, AttachmentView::Color(_))
                    | (crate::render_pass::AttachmentKind::Color { .. }, AttachmentView::Swapchain(_))
                    | (crate::render_pass::AttachmentKind::Depth { .. }, AttachmentView::Depth(_))
            );
            if !matches {
                return Err(Error::invalid_config(label, format!("attachment {} kind mismatch", i)));
            }
        }
        Ok(Self {
            label,
            is_timed,
            render_pass,
            attachments,
            children,
        })
    }

    pub(crate) fn submit_class(&self) -> SubmitClass {
        SubmitClass::Graphics
    }

    pub(crate) fn transitions(&self) -> Vec<Transition<'_, B>> {
        self.attachments
            .iter()
            .map(|a| match a {
                AttachmentView::Color(v) => Transition::image(v, Usage::ColorAttachment),
                AttachmentView::Depth(v) => Transition::depth_image(v, Usage::DepthAttachment),
                AttachmentView::Swapchain(sc) => Transition::swapchain(sc, Usage::ColorAttachment),
            })
            .collect()
    }
}

/// A Composite's children: any invocation kind except Graphics, which may
/// only ever occur inside a `RenderPassInvocation` (spec §4.6 constraint).
pub enum CompositeChild<B: Backend> {
    Transfer(TransferInvocation<B>),
    Compute(ComputeInvocation<B>),
    RenderPass(RenderPassInvocation<B>),
    Composite(CompositeInvocation<B>),
    /// A pre-recorded secondary command buffer (spec §4.7's baking rule),
    /// replayed with `execute_commands` instead of being walked node by node.
    Baked(crate::recorder::Baked<B>),
}

impl<B: Backend> CompositeChild<B> {
    pub(crate) fn submit_class(&self) -> SubmitClass {
        match self {
            CompositeChild::Transfer(i) => i.submit_class(),
            CompositeChild::Compute(i) => i.submit_class(),
            CompositeChild::RenderPass(i) => i.submit_class(),
            CompositeChild::Composite(i) => i.submit_class,
            CompositeChild::Baked(b) => b.submit_class(),
        }
    }
}

pub struct CompositeInvocation<B: Backend> {
    pub(crate) label: Label,
    pub(crate) is_timed: bool,
    pub(crate) children: Vec<CompositeChild<B>>,
    pub(crate) submit_class: SubmitClass,
}

/// The first non-`Any` class among `classes`, or `Any` if every one of them
/// is (or there are none) — spec §4.6's "Composite ... Class: inferred
/// (first non-any child)".
fn infer_composite_class(classes: &[SubmitClass]) -> SubmitClass {
    classes.iter().copied().find(|c| *c != SubmitClass::Any).unwrap_or(SubmitClass::Any)
}

impl<B: Backend> CompositeInvocation<B> {
    pub fn new(label: impl Into<Label>, children: Vec<CompositeChild<B>>, is_timed: bool) -> Self {
        let classes: Vec<SubmitClass> = children.iter().map(CompositeChild::submit_class).collect();
        let submit_class = infer_composite_class(&classes);
        Self {
            label: label.into(),
            is_timed,
            children,
            submit_class,
        }
    }

    pub(crate) fn submit_class(&self) -> SubmitClass {
        self.submit_class
    }
}

pub struct PresentInvocation<B: Backend> {
    pub(crate) label: Label,
    pub(crate) is_timed: bool,
    pub(crate) swapchain: Arc<Swapchain<B>>,
}

impl<B: Backend> PresentInvocation<B> {
    pub fn new(label: impl Into<Label>, swapchain: Arc<Swapchain<B>>, is_timed: bool) -> Self {
        Self { label: label.into(), is_timed, swapchain }
    }

    pub(crate) fn submit_class(&self) -> SubmitClass {
        SubmitClass::Present
    }

    pub(crate) fn transitions(&self) -> Vec<Transition<'_, B>> {
        vec![Transition::swapchain(&self.swapchain, Usage::Present)]
    }
}

/// The root of a recordable invocation tree (spec §4.6).
pub enum Invocation<B: Backend> {
    Transfer(TransferInvocation<B>),
    Compute(ComputeInvocation<B>),
    Graphics(GraphicsInvocation<B>),
    RenderPass(RenderPassInvocation<B>),
    Composite(CompositeInvocation<B>),
    Present(PresentInvocation<B>),
}

impl<B: Backend> Invocation<B> {
    pub(crate) fn label(&self) -> &str {
        match self {
            Invocation::Transfer(i) => &i.label,
            Invocation::Compute(i) => &i.label,
            Invocation::Graphics(i) => &i.label,
            Invocation::RenderPass(i) => &i.label,
            Invocation::Composite(i) => &i.label,
            Invocation::Present(i) => &i.label,
        }
    }

    pub(crate) fn submit_class(&self) -> SubmitClass {
        match self {
            Invocation::Transfer(i) => i.submit_class(),
            Invocation::Compute(i) => i.submit_class(),
            Invocation::Graphics(i) => i.submit_class(),
            Invocation::RenderPass(i) => i.submit_class(),
            Invocation::Composite(i) => i.submit_class(),
            Invocation::Present(i) => i.submit_class(),
        }
    }

    pub(crate) fn is_timed(&self) -> bool {
        match self {
            Invocation::Transfer(i) => i.is_timed,
            Invocation::Compute(i) => i.is_timed,
            Invocation::Graphics(i) => i.is_timed,
            Invocation::RenderPass(i) => i.is_timed,
            Invocation::Composite(i) => i.is_timed,
            Invocation::Present(i) => i.is_timed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_class_is_first_non_any_child() {
        assert_eq!(
            infer_composite_class(&[SubmitClass::Any, SubmitClass::Compute, SubmitClass::Graphics]),
            SubmitClass::Compute
        );
    }

    #[test]
    fn composite_class_is_any_when_every_child_is_any() {
        assert_eq!(infer_composite_class(&[SubmitClass::Any, SubmitClass::Any]), SubmitClass::Any);
    }

    #[test]
    fn composite_class_is_any_with_no_children() {
        assert_eq!(infer_composite_class(&[]), SubmitClass::Any);
    }
}
