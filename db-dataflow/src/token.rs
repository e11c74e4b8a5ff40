//! The unit of data flowing along a dataflow edge: a tile handle plus an
//! annotation that tells the runtime where it must run.

use db_kernel::resource::ResourcePointer;
use db_storage::PaxTile;
use std::sync::Arc;

/// Where a task or token is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Worker(u8),
    Resource(ResourcePointer),
    Local,
}

impl Target {
    /// Resolves to a concrete worker id given the worker currently running.
    pub fn resolve(&self, current_worker: u8) -> u8 {
        match self {
            Target::Worker(w) => *w,
            Target::Resource(ptr) => ptr.owner_worker_id(),
            Target::Local => current_worker,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessIntention {
    ReadOnly,
    Write,
}

/// A descriptor of which byte offsets within a tile the prefetch pipeline
/// should issue hints for, produced by an operator's prefetch-set selection
/// (spec §4.7.1).
#[derive(Debug, Clone, Default)]
pub struct PrefetchDescriptor {
    pub offsets: Vec<u32>,
}

impl PrefetchDescriptor {
    pub fn new(offsets: Vec<u32>) -> Self {
        Self { offsets }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone)]
pub struct Annotation {
    pub target: Target,
    pub access_intention: AccessIntention,
    pub prefetch: PrefetchDescriptor,
}

impl Annotation {
    pub fn new(target: Target, access_intention: AccessIntention) -> Self {
        Self {
            target,
            access_intention,
            prefetch: PrefetchDescriptor::empty(),
        }
    }

    pub fn with_prefetch(mut self, prefetch: PrefetchDescriptor) -> Self {
        self.prefetch = prefetch;
        self
    }
}

/// A boolean mask over a tile's rows; `None` means every row is live. Used
/// by table-selection/selection to avoid materialising filtered-out rows.
#[derive(Debug, Clone)]
pub struct RowMask {
    bits: Vec<bool>,
}

impl RowMask {
    pub fn all_true(len: usize) -> Self {
        Self { bits: vec![true; len] }
    }

    pub fn is_set(&self, row: usize) -> bool {
        self.bits.get(row).copied().unwrap_or(false)
    }

    pub fn set(&mut self, row: usize, value: bool) {
        self.bits[row] = value;
    }

    pub fn count_set(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn and(&self, other: &RowMask) -> RowMask {
        RowMask {
            bits: self.bits.iter().zip(other.bits.iter()).map(|(a, b)| *a && *b).collect(),
        }
    }
}

/// Wraps one tile handle and an optional secondary handle (a built hash
/// table, for the probe side of a join).
#[derive(Clone)]
pub struct RecordSet {
    pub tile: Arc<PaxTile>,
    pub mask: Option<RowMask>,
    pub secondary: Option<ResourcePointer>,
}

impl RecordSet {
    pub fn new(tile: Arc<PaxTile>) -> Self {
        Self {
            tile,
            mask: None,
            secondary: None,
        }
    }

    pub fn with_mask(mut self, mask: RowMask) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn with_secondary(mut self, secondary: ResourcePointer) -> Self {
        self.secondary = Some(secondary);
        self
    }

    /// True for row `i` unless explicitly masked out.
    pub fn is_live(&self, row: usize) -> bool {
        self.mask.as_ref().map(|m| m.is_set(row)).unwrap_or(true)
    }
}

#[derive(Clone)]
pub struct Token {
    pub record_set: RecordSet,
    pub annotation: Annotation,
}

impl Token {
    pub fn new(record_set: RecordSet, annotation: Annotation) -> Self {
        Self { record_set, annotation }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_resource_resolves_via_owner_byte() {
        let ptr = ResourcePointer::new(7, db_kernel::resource::ResourceFlags::TILE, 0x1000);
        let target = Target::Resource(ptr);
        assert_eq!(target.resolve(3), 7);
    }

    #[test]
    fn row_mask_and_intersects() {
        let mut a = RowMask::all_true(4);
        a.set(1, false);
        let mut b = RowMask::all_true(4);
        b.set(2, false);
        let c = a.and(&b);
        assert_eq!(c.count_set(), 2);
    }
}
