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
pub enum ImageType {
    Tex1d = 0,
    Tex1dArray = 1,
    Tex2d = 2,
    Tex2dArray = 3,
    Tex3d = 4,
    Cube = 5,
    CubeArray = 6,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct ImageDesc {
    pub image_type: ImageType,
    pub usage: vk::ImageUsageFlags,
    pub format: vk::Format,
    pub extent: [u32; 3],
    pub mip_levels: u16,
    pub array_elements: u32,
}

fn mip_count_1d(extent: u32) -> u16 {
    // floor(log2(extent)) + 1
    (32 - extent.leading_zeros()) as u16
}

impl ImageDesc {
    pub fn new(format: vk::Format, image_type: ImageType, extent: [u32; 3]) -> Self {
        Self {
            image_type,
            usage: vk::ImageUsageFlags::default(),
            format,
            extent,
            mip_levels: 1,
            array_elements: 1,
        }
    }

    pub fn new_1d(format: vk::Format, extent: u32) -> Self {
        Self::new(format, ImageType::Tex1d, [extent, 1, 1])
    }

    pub fn new_2d(format: vk::Format, extent: [u32; 2]) -> Self {
        let [width, height] = extent;
        Self::new(format, ImageType::Tex2d, [width, height, 1])
    }

    pub fn new_3d(format: vk::Format, extent: [u32; 3]) -> Self {
        Self::new(format, ImageType::Tex3d, extent)
    }

    pub fn new_cube(format: vk::Format, width: u32) -> Self {
        Self {
            image_type: ImageType::Cube,
            usage: vk::ImageUsageFlags::default(),
            format,
            extent: [width, width, 1],
            mip_levels: 1,
            array_elements: 6,
        }
    }

    pub fn usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage = usage;
        self
    }

    pub fn format(mut self, format: vk::Format) -> Self {
        self.format = format;
        self
    }

    pub fn mip_levels(mut self, mip_levels: u16) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    pub fn all_mip_levels(mut self) -> Self {
        self.mip_levels = mip_count_1d(self.extent[0])
            .max(mip_count_1d(self.extent[1]).max(mip_count_1d(self.extent[2])));
        self
    }

    pub fn array_elements(mut self, array_elements: u32) -> Self {
        self.array_elements = array_elements;
        self
    }

    pub fn extent_2d(&self) -> [u32; 2] {
        [self.extent[0], self.extent[1]]
    }
}

#[derive(Clone, Copy, Builder, Eq, PartialEq, Hash)]
#[builder(pattern = "owned", derive(Clone))]
pub struct ImageViewDesc {
    #[builder(setter(strip_option), default)]
    pub view_type: Option<vk::ImageViewType>,
    #[builder(setter(strip_option), default)]
    pub format: Option<vk::Format>,
    #[builder(default = "vk::ImageAspectFlags::COLOR")]
    pub aspect_mask: vk::ImageAspectFlags,
    #[builder(default = "0")]
    pub base_mip_level: u32,
    #[builder(default = "None")]
    pub level_count: Option<u32>,
    #[builder(default = "0")]
    pub base_array_layer: u32,
    #[builder(default = "None")]
    pub layer_count: Option<u32>,
    /// Opts the view out of scope-attachment cross-checking at command
    /// recording time. Meant for read-only pool resources that are never part
    /// of the frame graph, e.g. persistently bound lookup textures.
    #[builder(default)]
    pub ignore_frame_attachment_validation: bool,
}

impl ImageViewDesc {
    pub fn builder() -> ImageViewDescBuilder {
        Default::default()
    }

    /// Deterministic across processes; the per-resource view-cache key.
    pub fn content_hash(&self) -> u64 {
        fxhash::hash64(self)
    }
}

impl Default for ImageViewDesc {
    fn default() -> Self {
        Self::builder().build().unwrap()
    }
}

pub struct Image {
    pub desc: ImageDesc,
    pub(crate) tracking: ResourceTracking,
    pub(crate) views: ViewCache<ImageView>,
}

impl Image {
    pub fn new(desc: ImageDesc, name: impl Into<String>) -> Self {
        Self {
            desc,
            tracking: ResourceTracking::new(name),
            views: Default::default(),
        }
    }

    /// Returns the cached view for `desc`, creating it through `factory` on
    /// first request. Descriptors that compare equal share one view object
    /// for as long as any strong reference to it is outstanding.
    pub fn view(
        image: &Arc<Image>,
        factory: &Arc<dyn ViewFactory>,
        desc: &ImageViewDesc,
    ) -> Result<Arc<ImageView>, RhiError> {
        let hash = desc.content_hash();
        let version = image.tracking.version();

        image.views.get_or_create(hash, || {
            log::trace!("Creating an image view of {:?}", image.tracking.name());
            let raw = factory.create_image_view(image, desc)?;

            Ok(ImageView {
                image: image.clone(),
                desc: *desc,
                raw,
                hash,
                version,
                factory: factory.clone(),
            })
        })
    }

    /// Query-only; does not extend any view's lifetime.
    pub fn is_view_cached(&self, desc: &ImageViewDesc) -> bool {
        self.views.contains(desc.content_hash())
    }

    pub fn cached_view_count(&self) -> usize {
        self.views.live_view_count()
    }

    /// Called by the owning pool when the image's memory is (re)bound.
    /// Outstanding views keep working as objects but report `is_stale` and
    /// stop being handed out to new requests.
    pub fn invalidate_views(&self) {
        self.tracking.bump_version();
        self.views.clear();
    }
}

impl Resource for Image {
    type Desc = ImageDesc;

    fn desc(&self) -> &Self::Desc {
        &self.desc
    }

    fn tracking(&self) -> &ResourceTracking {
        &self.tracking
    }
}

pub struct ImageView {
    image: Arc<Image>,
    pub desc: ImageViewDesc,
    pub raw: RawResourceView,
    hash: u64,
    version: u32,
    factory: Arc<dyn ViewFactory>,
}

impl ImageView {
    pub fn image(&self) -> &Arc<Image> {
        &self.image
    }

    pub fn content_hash(&self) -> u64 {
        self.hash
    }

    /// True once the image was rebound after this view was created; a stale
    /// view must not be consumed without recompiling whatever captured it.
    pub fn is_stale(&self) -> bool {
        self.version != self.image.tracking.version()
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        self.image.views.erase(self.hash, self as *const ImageView);
        self.factory.release_view(self.raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::testing::CountingFactory;
    use std::{sync::atomic::Ordering, thread};

    fn test_image() -> Arc<Image> {
        Arc::new(Image::new(
            ImageDesc::new_2d(vk::Format::R8G8B8A8_UNORM, [64, 64]).all_mip_levels(),
            "test_image",
        ))
    }

    fn counting_factory() -> (Arc<CountingFactory>, Arc<dyn ViewFactory>) {
        let factory = Arc::new(CountingFactory::default());
        let as_dyn: Arc<dyn ViewFactory> = factory.clone();
        (factory, as_dyn)
    }

    #[test]
    fn equal_descriptors_share_one_view() {
        let image = test_image();
        let (counters, factory) = counting_factory();

        let desc = ImageViewDesc::builder().base_mip_level(1).build().unwrap();
        let a = Image::view(&image, &factory, &desc).unwrap();
        let b = Image::view(&image, &factory, &desc).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.raw, b.raw);
        assert_eq!(counters.created.load(Ordering::SeqCst), 1);
        assert_eq!(image.cached_view_count(), 1);
    }

    #[test]
    fn descriptor_hash_ignores_construction_order() {
        let a = ImageViewDesc::builder()
            .base_mip_level(2)
            .level_count(Some(1))
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .build()
            .unwrap();
        let b = ImageViewDesc::builder()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .level_count(Some(1))
            .base_mip_level(2)
            .build()
            .unwrap();

        assert!(a == b);
        assert_eq!(a.content_hash(), b.content_hash());

        let c = ImageViewDesc::builder().base_mip_level(3).build().unwrap();
        assert_ne!(a.content_hash(), c.content_hash());
    }

    #[test]
    fn view_is_erased_when_last_reference_drops() {
        let image = test_image();
        let (counters, factory) = counting_factory();
        let desc = ImageViewDesc::default();

        let view = Image::view(&image, &factory, &desc).unwrap();
        assert!(image.is_view_cached(&desc));

        drop(view);
        assert!(!image.is_view_cached(&desc));
        assert_eq!(image.cached_view_count(), 0);
        assert_eq!(counters.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalidate_views_makes_outstanding_views_stale() {
        let image = test_image();
        let (_counters, factory) = counting_factory();
        let desc = ImageViewDesc::default();

        let old = Image::view(&image, &factory, &desc).unwrap();
        assert!(!old.is_stale());

        image.invalidate_views();
        assert!(old.is_stale());
        assert!(!image.is_view_cached(&desc));

        let fresh = Image::view(&image, &factory, &desc).unwrap();
        assert!(!fresh.is_stale());
        assert!(!Arc::ptr_eq(&old, &fresh));

        // The old view's deferred destruction must not evict its replacement.
        drop(old);
        assert!(image.is_view_cached(&desc));
    }

    #[test]
    fn concurrent_requests_converge_on_one_view() {
        let image = test_image();
        let (_counters, factory) = counting_factory();
        let desc = ImageViewDesc::default();

        // Warm the cache so every thread hits the lookup path.
        let warm = Image::view(&image, &factory, &desc).unwrap();
        let expected_raw = warm.raw;

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let image = image.clone();
                let factory = factory.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        let view = Image::view(&image, &factory, &ImageViewDesc::default()).unwrap();
                        assert_eq!(view.raw, expected_raw);
                    }
                })
            })
            .collect();

        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(image.cached_view_count(), 1);
    }

    #[test]
    fn release_race_never_leaves_duplicates() {
        let image = test_image();
        let (_counters, factory) = counting_factory();

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let image = image.clone();
                let factory = factory.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        let view = Image::view(&image, &factory, &ImageViewDesc::default()).unwrap();
                        // Immediate release races other threads' lookups and
                        // exercises the erase-by-identity path.
                        drop(view);
                    }
                })
            })
            .collect();

        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(image.cached_view_count(), 0);
    }
}
