//! Typed owning wrappers over raw GPU-API handles, released exactly once on
//! drop. Generalizes the `ManuallyDrop<B::X>` + custom `Drop` idiom the
//! teacher repeats by hand in `pool.rs`, `memory_page.rs`, and `plumber.rs`
//! into a single generic wrapper.

use std::fmt;
use std::mem::ManuallyDrop;
use std::sync::Arc;

/// Anything capable of destroying a `T` given the device it was created
/// from. Implemented per handle kind (buffer, image view, descriptor-set
/// layout, pipeline, render pass, ...); see `context.rs` for the
/// instantiations used by this crate.
pub trait Destroy<T> {
    fn destroy(&self, value: T);
}

/// A `T` owned by this handle, released via `D::destroy` exactly once, on
/// drop. `D` is typically `Arc<B::Device>` paired with a small shim that
/// implements `Destroy<T>` for the handle kind in question.
pub struct Handle<T, D: Destroy<T>> {
    value: ManuallyDrop<T>,
    destroyer: Arc<D>,
}

impl<T, D: Destroy<T>> Handle<T, D> {
    pub fn new(value: T, destroyer: Arc<D>) -> Self {
        Self {
            value: ManuallyDrop::new(value),
            destroyer,
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T, D: Destroy<T>> Drop for Handle<T, D> {
    fn drop(&mut self) {
        // Safety: `self.value` is only ever taken here, and this is the only
        // place `Handle` relinquishes it — it happens at most once.
        let value = unsafe { ManuallyDrop::take(&mut self.value) };
        self.destroyer.destroy(value);
    }
}

impl<T: fmt::Debug, D: Destroy<T>> fmt::Debug for Handle<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle").field("value", &*self.value).finish()
    }
}
