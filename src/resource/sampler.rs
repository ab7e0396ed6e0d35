//! Sampler cache keys. Spec §4.4 fixes the Context's sampler cache to exactly
//! six filter/mip/anisotropy/compare combinations; `Context` builds one of
//! each eagerly rather than lazily minting samplers from open-ended
//! `SamplerDesc` values the way the teacher's `plumber.rs` does for
//! pipelines.

use crate::context::Shared;
use crate::handle::Handle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerKey {
    LinearNone,
    NearestNone,
    Aniso4None,
    LinearLessCompare,
    NearestLessCompare,
    Aniso4LessCompare,
}

impl SamplerKey {
    pub const ALL: [SamplerKey; 6] = [
        SamplerKey::LinearNone,
        SamplerKey::NearestNone,
        SamplerKey::Aniso4None,
        SamplerKey::LinearLessCompare,
        SamplerKey::NearestLessCompare,
        SamplerKey::Aniso4LessCompare,
    ];

    pub(crate) fn info(self) -> gfx_hal::image::SamplerDesc {
        use gfx_hal::image::{Filter, SamplerDesc, WrapMode};
        use gfx_hal::pso::Comparison;

        let (mag, anisotropy_clamp, compare) = match self {
            SamplerKey::LinearNone => (Filter::Linear, None, None),
            SamplerKey::NearestNone => (Filter::Nearest, None, None),
            SamplerKey::Aniso4None => (Filter::Linear, Some(4), None),
            SamplerKey::LinearLessCompare => (Filter::Linear, None, Some(Comparison::Less)),
            SamplerKey::NearestLessCompare => (Filter::Nearest, None, Some(Comparison::Less)),
            SamplerKey::Aniso4LessCompare => (Filter::Linear, Some(4), Some(Comparison::Less)),
        };

        let mut desc = SamplerDesc::new(mag, WrapMode::Clamp);
        desc.anisotropy_clamp = anisotropy_clamp;
        desc.comparison = compare;
        desc
    }
}

/// An owned GPU-API sampler object, keyed by [`SamplerKey`] in the Context's
/// cache.
pub struct Sampler<B: gfx_hal::Backend> {
    pub(crate) handle: Handle<B::Sampler, Shared<B>>,
}

impl<B: gfx_hal::Backend> Sampler<B> {
    pub fn raw(&self) -> &B::Sampler {
        self.handle.get()
    }
}

impl<B: gfx_hal::Backend> crate::handle::Destroy<B::Sampler> for Shared<B> {
    fn destroy(&self, value: B::Sampler) {
        use gfx_hal::device::Device;
        unsafe { self.device.destroy_sampler(value) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_six_keys_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for key in SamplerKey::ALL {
            assert!(seen.insert(key), "duplicate sampler key {:?}", key);
        }
        assert_eq!(seen.len(), 6);
    }
}
