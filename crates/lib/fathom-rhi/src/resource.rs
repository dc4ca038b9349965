use crate::frame_graph::AttachmentHandle;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a pool-owned resource, unique for the lifetime of the process.
/// View caches are keyed per resource, so two bit-identical view descriptors
/// on different resources can never collide.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct ResourceId(u64);

/// Bookkeeping shared by every resource kind: identity, debug name, the
/// version counter bumped on pool (re)binding, and the back-reference to the
/// frame attachment the resource is currently registered under.
pub struct ResourceTracking {
    id: ResourceId,
    name: String,
    version: AtomicU32,
    attachment: Mutex<Option<AttachmentHandle>>,
}

impl ResourceTracking {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ResourceId(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            version: AtomicU32::new(0),
            attachment: Mutex::new(None),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version.load(Ordering::Acquire)
    }

    /// Views created before the bump report `is_stale` afterwards.
    pub(crate) fn bump_version(&self) {
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    pub fn attachment(&self) -> Option<AttachmentHandle> {
        *self.attachment.lock()
    }

    pub(crate) fn set_attachment(&self, handle: Option<AttachmentHandle>) {
        *self.attachment.lock() = handle;
    }
}

impl Drop for ResourceTracking {
    fn drop(&mut self) {
        debug_assert!(
            self.attachment.get_mut().is_none(),
            "Resource {:?} destroyed while still attached to the frame graph",
            self.name,
        );
    }
}

pub trait Resource {
    type Desc;

    fn desc(&self) -> &Self::Desc;
    fn tracking(&self) -> &ResourceTracking;

    fn is_attachment(&self) -> bool {
        self.tracking().attachment().is_some()
    }
}
