//! Compute `Task`: a single compute pipeline, its descriptor-set layout, and
//! the workgroup size injected via specialization constants 0, 1, 2 (spec
//! §4.5). Grounded in `plumber.rs::create_pipeline`'s shader-module lifecycle
//! (create, bake into the pipeline, destroy), generalized from the graphics
//! path to `create_compute_pipelines`.

use std::borrow::Cow;
use std::iter;
use std::sync::Arc;

use gfx_hal::device::Device;
use gfx_hal::pso::{ComputePipelineDesc, EntryPoint, Specialization, SpecializationConstant};
use gfx_hal::Backend;

use crate::binding::ResourceType;
use crate::context::{Context, Shared};
use crate::error::{Error, Label, Result};
use crate::handle::{Destroy, Handle};
use crate::shader::{ShaderCompiler, ShaderSource};

#[derive(Debug, Clone)]
pub struct ComputeTaskConfig {
    pub label: Label,
    pub entry_name: String,
    pub code: ShaderSource,
    pub rsc_tys: Vec<ResourceType>,
    pub workgrp_size: (u32, u32, u32),
}

pub struct ComputeTask<B: Backend> {
    shared: Arc<Shared<B>>,
    label: Label,
    layout: Handle<B::PipelineLayout, Shared<B>>,
    pipeline: Handle<B::ComputePipeline, Shared<B>>,
    rsc_tys: Vec<ResourceType>,
    workgrp_size: (u32, u32, u32),
}

/// Rejects a workgroup size with any zero dimension, per spec §4.5's
/// `ZeroWorkgroupSize` requirement (folded into `InvalidConfig`). Factored
/// out of `ComputeTask::new` so it's unit-testable without a live device.
fn check_workgroup_size(size: (u32, u32, u32), label: &Label) -> Result<()> {
    let (x, y, z) = size;
    if x == 0 || y == 0 || z == 0 {
        return Err(Error::invalid_config(label.clone(), "workgroup size must have x*y*z != 0"));
    }
    Ok(())
}

impl<B: Backend> ComputeTask<B> {
    pub fn new(context: &Arc<Context<B>>, config: ComputeTaskConfig, compiler: &ShaderCompiler) -> Result<Arc<Self>> {
        check_workgroup_size(config.workgrp_size, &config.label)?;
        let (x, y, z) = config.workgrp_size;

        context.ensure_descriptor_layout(&config.rsc_tys, &config.label)?;
        let shared = context.shared();
        let device = &shared.device;

        let layout = context
            .with_descriptor_layout(&config.rsc_tys, |set_layout| unsafe {
                device
                    .create_pipeline_layout(iter::once(set_layout), iter::empty::<(gfx_hal::pso::ShaderStageFlags, std::ops::Range<u32>)>())
                    .map_err(|e| Error::gpu(config.label.clone(), e))
            })
            .expect("[ComputeTask] descriptor layout just ensured but missing from cache")?;
        let layout = Handle::new(layout, shared.clone());

        let spirv = compiler.compile(config.code.clone()).map_err(|e| Error::invalid_config(config.label.clone(), e.to_string()))?;
        let module = unsafe {
            device
                .create_shader_module(&spirv)
                .map_err(|e| Error::gpu(config.label.clone(), e))?
        };

        let workgroup_bytes: Vec<u8> = [x, y, z].iter().flat_map(|v| v.to_ne_bytes()).collect();
        let specialization = Specialization {
            constants: Cow::Owned(vec![
                SpecializationConstant { id: 0, range: 0..4 },
                SpecializationConstant { id: 1, range: 4..8 },
                SpecializationConstant { id: 2, range: 8..12 },
            ]),
            data: Cow::Owned(workgroup_bytes),
        };

        let entry = EntryPoint {
            entry: config.entry_name.as_str(),
            module: &module,
            specialization,
        };

        let desc = ComputePipelineDesc::new(entry, layout.get());
        let pipeline = unsafe {
            let result = device.create_compute_pipeline(&desc, None).map_err(|e| Error::gpu(config.label.clone(), e));
            device.destroy_shader_module(module);
            result?
        };

        Ok(Arc::new(Self {
            shared: shared.clone(),
            label: config.label,
            layout,
            pipeline: Handle::new(pipeline, shared),
            rsc_tys: config.rsc_tys,
            workgrp_size: config.workgrp_size,
        }))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn rsc_tys(&self) -> &[ResourceType] {
        &self.rsc_tys
    }

    pub fn workgrp_size(&self) -> (u32, u32, u32) {
        self.workgrp_size
    }

    pub(crate) fn pipeline(&self) -> &B::ComputePipeline {
        self.pipeline.get()
    }

    pub(crate) fn layout(&self) -> &B::PipelineLayout {
        self.layout.get()
    }
}

impl<B: Backend> Destroy<B::PipelineLayout> for Shared<B> {
    fn destroy(&self, value: B::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(value) };
    }
}

impl<B: Backend> Destroy<B::ComputePipeline> for Shared<B> {
    fn destroy(&self, value: B::ComputePipeline) {
        unsafe { self.device.destroy_compute_pipeline(value) };
    }
}

impl<B: Backend> std::fmt::Debug for ComputeTask<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeTask")
            .field("label", &self.label)
            .field("workgrp_size", &self.workgrp_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_workgroup_size_is_rejected_before_any_device_call() {
        let label: Label = "writer".into();
        assert!(check_workgroup_size((1, 0, 1), &label).is_err());
        assert!(check_workgroup_size((0, 1, 1), &label).is_err());
        assert!(check_workgroup_size((1, 1, 0), &label).is_err());
        assert!(check_workgroup_size((1, 1, 1), &label).is_ok());
    }
}
