use crate::artifact::ArtifactId;

/// Snapshot of the most recent `capacity` artifacts, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    ids: Vec<ArtifactId>,
    capacity: usize,
}

impl Window {
    pub(super) fn new(ids: Vec<ArtifactId>, capacity: usize) -> Self {
        debug_assert!(ids.len() <= capacity);
        Self { ids, capacity }
    }

    pub fn ids(&self) -> &[ArtifactId] {
        &self.ids
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Slot 0 is the newest artifact, slot `len - 1` the oldest; higher slots
    /// are empty.
    pub fn slot(&self, slot: usize) -> Option<&ArtifactId> {
        let last = self.ids.len().checked_sub(1)?;
        let position = last.checked_sub(slot)?;
        self.ids.get(position)
    }

    /// Targets for every slot `0..capacity`, newest first.
    pub fn slots(&self) -> impl Iterator<Item = Option<&ArtifactId>> + '_ {
        (0..self.capacity).map(|slot| self.slot(slot))
    }
}
