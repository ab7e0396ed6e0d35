//! Per-submission-class queue selection. Grounded in `context_builder.rs`'s
//! family lookup (`supports_graphics`/`supports_compute`), generalized from
//! its two hard-coded families (graphics, compute) into the five-class
//! priority rule spec §4.4 mandates.

use std::collections::HashMap;
use std::sync::Arc;

use gfx_hal::queue::{QueueFamily, QueueFamilyId, QueueType};
use parking_lot::Mutex;

/// The five submission classes a command or invocation may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmitClass {
    Any,
    Graphics,
    Compute,
    Transfer,
    Present,
}

fn capability_bits(queue_type: QueueType) -> u32 {
    queue_type.supports_graphics() as u32 + queue_type.supports_compute() as u32 + queue_type.supports_transfer() as u32
}

fn satisfies(queue_type: QueueType, class: SubmitClass) -> bool {
    match class {
        SubmitClass::Any => true,
        SubmitClass::Graphics | SubmitClass::Present => queue_type.supports_graphics(),
        SubmitClass::Compute => queue_type.supports_compute(),
        SubmitClass::Transfer => queue_type.supports_transfer(),
    }
}

/// Picks the queue family index for `class` out of `families`, per spec
/// §4.4: search in descending number of set capability bits for the first
/// family that supports every flag the class requires. `Any` always takes
/// the first enumerated family.
pub(crate) fn select_family<F: QueueFamily>(families: &[F], class: SubmitClass) -> Option<usize> {
    if class == SubmitClass::Any {
        return if families.is_empty() { None } else { Some(0) };
    }
    let mut indices: Vec<usize> = (0..families.len()).collect();
    indices.sort_by_key(|&i| std::cmp::Reverse(capability_bits(families[i].queue_type())));
    indices.into_iter().find(|&i| satisfies(families[i].queue_type(), class))
}

/// One opened queue plus the family it was opened from, per submission
/// class. Locking mirrors `Queues<B>` in the teacher codebase
/// (`Mutex<B::CommandQueue>` per class); wrapped in `Arc` here since two
/// classes selecting the same family share its one opened queue.
pub(crate) struct Queues<B: gfx_hal::Backend> {
    by_class: HashMap<SubmitClass, (Arc<Mutex<B::CommandQueue>>, QueueFamilyId)>,
}

impl<B: gfx_hal::Backend> Queues<B> {
    pub(crate) fn new(by_class: HashMap<SubmitClass, (Arc<Mutex<B::CommandQueue>>, QueueFamilyId)>) -> Self {
        Self { by_class }
    }

    pub(crate) fn family_of(&self, class: SubmitClass) -> Option<QueueFamilyId> {
        self.by_class.get(&class).map(|(_, family)| *family)
    }

    pub(crate) fn with_queue<R>(&self, class: SubmitClass, f: impl FnOnce(&mut B::CommandQueue) -> R) -> Option<R> {
        self.by_class.get(&class).map(|(queue, _)| f(&mut queue.lock()))
    }

    pub(crate) fn supports(&self, class: SubmitClass) -> bool {
        self.by_class.contains_key(&class)
    }
}

impl<B: gfx_hal::Backend> std::fmt::Debug for Queues<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queues").field("classes", &self.by_class.keys().collect::<Vec<_>>()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct FakeFamily {
        id: QueueFamilyId,
        ty: QueueType,
    }

    impl QueueFamily for FakeFamily {
        fn queue_type(&self) -> QueueType {
            self.ty
        }
        fn max_queues(&self) -> usize {
            1
        }
        fn id(&self) -> QueueFamilyId {
            self.id
        }
    }

    #[test]
    fn prefers_general_family_over_specialized_ones() {
        let families = vec![
            FakeFamily { id: QueueFamilyId(0), ty: QueueType::Transfer },
            FakeFamily { id: QueueFamilyId(1), ty: QueueType::General },
            FakeFamily { id: QueueFamilyId(2), ty: QueueType::Graphics },
        ];
        assert_eq!(select_family(&families, SubmitClass::Graphics), Some(1));
        assert_eq!(select_family(&families, SubmitClass::Compute), Some(1));
    }

    #[test]
    fn falls_back_to_specialized_family_when_no_general_queue_exists() {
        let families = vec![
            FakeFamily { id: QueueFamilyId(0), ty: QueueType::Transfer },
            FakeFamily { id: QueueFamilyId(1), ty: QueueType::Compute },
        ];
        assert_eq!(select_family(&families, SubmitClass::Compute), Some(1));
        assert_eq!(select_family(&families, SubmitClass::Graphics), None);
    }

    #[test]
    fn any_takes_the_first_family_regardless_of_capability() {
        let families = vec![FakeFamily { id: QueueFamilyId(0), ty: QueueType::Transfer }];
        assert_eq!(select_family(&families, SubmitClass::Any), Some(0));
    }
}
