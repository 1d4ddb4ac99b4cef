use std::sync::atomic::{AtomicU32, Ordering};

/// Process-wide source of attachment identities. Deform and sequence timelines key on these
/// ids, so a linked mesh that copies its parent's id shares the parent's keys.
pub(crate) struct IdSource(AtomicU32);

impl IdSource {
    const fn new() -> Self {
        Self(AtomicU32::new(1))
    }

    pub(crate) fn next(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

pub(crate) static VERTEX_ATTACHMENT_IDS: IdSource = IdSource::new();
pub(crate) static SEQUENCE_IDS: IdSource = IdSource::new();
