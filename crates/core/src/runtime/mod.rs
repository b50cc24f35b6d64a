//! Run-time side of the coverage map.
//!
//! This is what `AcquireCoverageMap` + `MarkCoverage` do inside an
//! instrumented process: a process-wide pointer slot, lazily filled by
//! attaching the shared segment, then plain byte stores of 1.
//!
//! The slot is lock-free. Threads that race on a null slot may each attach;
//! the first published segment wins and every thread ends up writing through
//! it. Concurrent stores of 1 to the same byte are benign.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use once_cell::race::OnceRef;

use crate::model::CoverageId;
use crate::store::render_profile;

/// A coverage segment: one byte per coverage id.
#[derive(Debug)]
pub struct Segment {
    bytes: Box<[AtomicU8]>,
}

impl Segment {
    pub fn new(size: usize) -> Self {
        Self { bytes: (0..size).map(|_| AtomicU8::new(0)).collect() }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Store 1 at `id`. Ids past the end are ignored.
    pub fn mark(&self, id: CoverageId) {
        if let Some(byte) = self.bytes.get(id as usize) {
            byte.store(1, Ordering::Relaxed);
        }
    }

    pub fn is_marked(&self, id: CoverageId) -> bool {
        self.bytes.get(id as usize).is_some_and(|b| b.load(Ordering::Relaxed) != 0)
    }

    /// Ids with a non-zero byte, ascending.
    pub fn executed_ids(&self) -> Vec<CoverageId> {
        self.bytes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.load(Ordering::Relaxed) != 0)
            .map(|(i, _)| i as CoverageId)
            .collect()
    }

    /// Contents in the profile-log format.
    pub fn to_profile_log(&self) -> String {
        render_profile(self.executed_ids())
    }
}

/// Platform attach of a shared segment by key.
pub trait SegmentAttach: Send + Sync {
    /// Attach (or create) the segment for `key` with `size` bytes. Segments
    /// live for the rest of the process.
    fn attach(&self, key: i32, size: usize) -> &'static Segment;
}

/// Attach that hands out one process-local segment per call. Stands in for
/// the OS shared-memory attach in tests and simulations.
#[derive(Debug, Default)]
pub struct HeapAttach {
    attaches: AtomicUsize,
}

impl HeapAttach {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of attach calls made so far.
    pub fn attach_count(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }
}

impl SegmentAttach for HeapAttach {
    fn attach(&self, _key: i32, size: usize) -> &'static Segment {
        self.attaches.fetch_add(1, Ordering::SeqCst);
        Box::leak(Box::new(Segment::new(size)))
    }
}

/// The process-wide "already obtained" pointer slot.
pub struct CoverageSlot {
    base: OnceRef<'static, Segment>,
    key: i32,
    size: usize,
}

impl CoverageSlot {
    pub fn new(key: i32, size: usize) -> Self {
        Self { base: OnceRef::new(), key, size }
    }

    /// Base segment, attaching through `attach` while the slot is still empty.
    ///
    /// Racing callers may each attach; the first segment published is the one
    /// every caller gets back.
    pub fn acquire(&self, attach: &dyn SegmentAttach) -> &'static Segment {
        self.base.get_or_init(|| attach.attach(self.key, self.size))
    }

    /// `AcquireCoverageMap` followed by `MarkCoverage { id }`.
    pub fn mark(&self, attach: &dyn SegmentAttach, id: CoverageId) {
        self.acquire(attach).mark(id);
    }

    pub fn is_attached(&self) -> bool {
        self.base.get().is_some()
    }
}

impl fmt::Debug for CoverageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoverageSlot")
            .field("key", &self.key)
            .field("size", &self.size)
            .field("attached", &self.is_attached())
            .finish()
    }
}
