use crate::{
    factory::{RawResourceView, ViewFactory},
    resource::{Resource, ResourceTracking},
    view_cache::ViewCache,
    RhiError,
};
use ash::vk;
use derive_builder::Builder;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum MemoryLocation {
    GpuOnly,
    CpuToGpu,
    GpuToCpu,
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct BufferDesc {
    pub size: usize,
    pub usage: vk::BufferUsageFlags,
    pub memory_location: MemoryLocation,
}

impl BufferDesc {
    pub fn new_gpu_only(size: usize, usage: vk::BufferUsageFlags) -> Self {
        Self {
            size,
            usage,
            memory_location: MemoryLocation::GpuOnly,
        }
    }

    pub fn new_cpu_to_gpu(size: usize, usage: vk::BufferUsageFlags) -> Self {
        Self {
            size,
            usage,
            memory_location: MemoryLocation::CpuToGpu,
        }
    }

    pub fn new_gpu_to_cpu(size: usize, usage: vk::BufferUsageFlags) -> Self {
        Self {
            size,
            usage,
            memory_location: MemoryLocation::GpuToCpu,
        }
    }
}

/// Typed subrange of a buffer: `element_count` elements of `element_size`
/// bytes starting at element `element_offset`, optionally reinterpreted
/// through `format` for texel buffers.
#[derive(Clone, Copy, Builder, Eq, PartialEq, Hash)]
#[builder(pattern = "owned", derive(Clone))]
pub struct BufferViewDesc {
    #[builder(default = "0")]
    pub element_offset: u32,
    pub element_count: u32,
    pub element_size: u32,
    #[builder(setter(strip_option), default)]
    pub format: Option<vk::Format>,
    /// Opts the view out of scope-attachment cross-checking at command
    /// recording time, e.g. for constant buffers bound from long-lived pools.
    #[builder(default)]
    pub ignore_frame_attachment_validation: bool,
}

impl BufferViewDesc {
    pub fn builder() -> BufferViewDescBuilder {
        Default::default()
    }

    /// Deterministic across processes; the per-resource view-cache key.
    pub fn content_hash(&self) -> u64 {
        fxhash::hash64(self)
    }
}

pub struct Buffer {
    pub desc: BufferDesc,
    pub(crate) tracking: ResourceTracking,
    pub(crate) views: ViewCache<BufferView>,
}

impl Buffer {
    pub fn new(desc: BufferDesc, name: impl Into<String>) -> Self {
        Self {
            desc,
            tracking: ResourceTracking::new(name),
            views: Default::default(),
        }
    }

    /// Returns the cached view for `desc`, creating it through `factory` on
    /// first request. See [`Image::view`](crate::image::Image::view).
    pub fn view(
        buffer: &Arc<Buffer>,
        factory: &Arc<dyn ViewFactory>,
        desc: &BufferViewDesc,
    ) -> Result<Arc<BufferView>, RhiError> {
        let hash = desc.content_hash();
        let version = buffer.tracking.version();

        buffer.views.get_or_create(hash, || {
            log::trace!("Creating a buffer view of {:?}", buffer.tracking.name());
            let raw = factory.create_buffer_view(buffer, desc)?;

            Ok(BufferView {
                buffer: buffer.clone(),
                desc: *desc,
                raw,
                hash,
                version,
                factory: factory.clone(),
            })
        })
    }

    /// Query-only; does not extend any view's lifetime.
    pub fn is_view_cached(&self, desc: &BufferViewDesc) -> bool {
        self.views.contains(desc.content_hash())
    }

    pub fn cached_view_count(&self) -> usize {
        self.views.live_view_count()
    }

    /// Called by the owning pool when the buffer's memory is (re)bound.
    pub fn invalidate_views(&self) {
        self.tracking.bump_version();
        self.views.clear();
    }
}

impl Resource for Buffer {
    type Desc = BufferDesc;

    fn desc(&self) -> &Self::Desc {
        &self.desc
    }

    fn tracking(&self) -> &ResourceTracking {
        &self.tracking
    }
}

pub struct BufferView {
    buffer: Arc<Buffer>,
    pub desc: BufferViewDesc,
    pub raw: RawResourceView,
    hash: u64,
    version: u32,
    factory: Arc<dyn ViewFactory>,
}

impl BufferView {
    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    pub fn content_hash(&self) -> u64 {
        self.hash
    }

    pub fn is_stale(&self) -> bool {
        self.version != self.buffer.tracking.version()
    }
}

impl Drop for BufferView {
    fn drop(&mut self) {
        self.buffer.views.erase(self.hash, self as *const BufferView);
        self.factory.release_view(self.raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::testing::CountingFactory;
    use std::sync::atomic::Ordering;

    #[test]
    fn equal_descriptors_share_one_view() {
        let buffer = Arc::new(Buffer::new(
            BufferDesc::new_gpu_only(1024, vk::BufferUsageFlags::STORAGE_BUFFER),
            "test_buffer",
        ));
        let counters = Arc::new(CountingFactory::default());
        let factory: Arc<dyn ViewFactory> = counters.clone();

        let desc = BufferViewDesc::builder()
            .element_count(256)
            .element_size(4)
            .build()
            .unwrap();

        let a = Buffer::view(&buffer, &factory, &desc).unwrap();
        let b = Buffer::view(&buffer, &factory, &desc).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(counters.created.load(Ordering::SeqCst), 1);

        let other = BufferViewDesc::builder()
            .element_offset(256)
            .element_count(256)
            .element_size(4)
            .build()
            .unwrap();
        let c = Buffer::view(&buffer, &factory, &other).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(buffer.cached_view_count(), 2);
    }

    #[test]
    fn descriptor_hash_covers_every_field() {
        let base = BufferViewDesc::builder()
            .element_count(16)
            .element_size(4)
            .build()
            .unwrap();

        let same = BufferViewDesc::builder()
            .element_size(4)
            .element_count(16)
            .build()
            .unwrap();
        assert_eq!(base.content_hash(), same.content_hash());

        let ignored = BufferViewDesc::builder()
            .element_count(16)
            .element_size(4)
            .ignore_frame_attachment_validation(true)
            .build()
            .unwrap();
        assert_ne!(base.content_hash(), ignored.content_hash());
    }
}
