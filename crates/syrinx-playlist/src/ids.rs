/// Identifier of one playlist entity (period, set, representation).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Explicit id generator, threaded through playlist construction.
///
/// One generator per manifest parse; ids are unique within one playlist
/// generation, including across live refreshes when the same generator is
/// reused for the merge.
#[derive(Debug, Default)]
pub struct IdGen {
    next: u64,
}

impl IdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next += 1;
        id
    }
}
