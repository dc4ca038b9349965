use crate::{
    buffer::{Buffer, BufferViewDesc},
    image::{Image, ImageViewDesc},
    RhiError,
};

/// Opaque token for a platform view object. Minted by the backend's
/// `ViewFactory`, carried by `ImageView`/`BufferView` for its lifetime.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct RawResourceView(pub u64);

/// The seam between resource bookkeeping and the platform backend: view
/// construction and teardown. Resources call `create_*` on a cache miss and
/// `release_view` when the last reference to a view goes away.
pub trait ViewFactory: Send + Sync {
    fn create_image_view(
        &self,
        image: &Image,
        desc: &ImageViewDesc,
    ) -> Result<RawResourceView, RhiError>;

    fn create_buffer_view(
        &self,
        buffer: &Buffer,
        desc: &BufferViewDesc,
    ) -> Result<RawResourceView, RhiError>;

    fn release_view(&self, _view: RawResourceView) {}
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    pub(crate) struct CountingFactory {
        pub(crate) created: AtomicU64,
        pub(crate) released: AtomicU64,
    }

    impl ViewFactory for CountingFactory {
        fn create_image_view(
            &self,
            _image: &Image,
            _desc: &ImageViewDesc,
        ) -> Result<RawResourceView, RhiError> {
            Ok(RawResourceView(
                self.created.fetch_add(1, Ordering::SeqCst) + 1,
            ))
        }

        fn create_buffer_view(
            &self,
            _buffer: &Buffer,
            _desc: &BufferViewDesc,
        ) -> Result<RawResourceView, RhiError> {
            Ok(RawResourceView(
                self.created.fetch_add(1, Ordering::SeqCst) + 1,
            ))
        }

        fn release_view(&self, _view: RawResourceView) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}
