mod error;
mod ffi;

use libc::c_void;
use std::fmt::{Debug, Display};
use std::ptr::NonNull;

use log::debug;

pub use error::ProviderError;
pub use ffi::VendorLibrary;

/// 16-bit identifier the vendor SDK uses to tell supported hardware variants apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProductId(pub u16);

impl ProductId {
    /// Every representable product ID, ascending.
    pub fn all() -> impl Iterator<Item = ProductId> {
        (0..=u16::MAX).map(ProductId)
    }

    /// Zero doubles as "no product" in the vendor API.
    pub fn is_unset(self) -> bool {
        self.0 == 0
    }
}

impl Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

impl From<ProductId> for i32 {
    fn from(id: ProductId) -> Self {
        id.0.into()
    }
}

/// Opaque, non-null handle returned by `xr_device_provider_create`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawHandle(NonNull<c_void>);

impl RawHandle {
    fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// The function set a glasses provider exposes.
///
/// Status codes are never interpreted, only carried in [`ProviderError::Status`].
pub trait DeviceProvider {
    type Handle: Copy + Debug;

    fn is_product_id_valid(&self, product_id: ProductId) -> bool;
    fn market_name(&self, product_id: ProductId) -> Result<String, ProviderError>;
    /// Returns `None` when the SDK hands back a null handle.
    fn create(&self, product_id: ProductId) -> Option<Self::Handle>;
    fn set_log_level(&self, level: i32);
    fn initialize(&self, handle: Self::Handle) -> Result<(), ProviderError>;
    fn device_type(&self, handle: Self::Handle) -> i32;
    fn glasses_version(&self, handle: Self::Handle) -> Result<String, ProviderError>;
    fn brightness_level(&self, handle: Self::Handle) -> Result<i32, ProviderError>;
    fn shutdown(&self, handle: Self::Handle);
    fn destroy(&self, handle: Self::Handle);
}

/// A created provider handle.
///
/// Dropping the session destroys the handle, shutting it down first if
/// [`Session::initialize`] succeeded.
pub struct Session<'p, P: DeviceProvider> {
    provider: &'p P,
    handle: P::Handle,
    product_id: ProductId,
    initialized: bool,
}

impl<'p, P: DeviceProvider> Session<'p, P> {
    pub fn create(provider: &'p P, product_id: ProductId) -> Result<Self, ProviderError> {
        let handle = provider
            .create(product_id)
            .ok_or(ProviderError::CreateFailed(product_id))?;

        debug!("created handle {handle:?} for {product_id}");

        Ok(Self {
            provider,
            handle,
            product_id,
            initialized: false,
        })
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn initialize(&mut self) -> Result<(), ProviderError> {
        self.provider.initialize(self.handle)?;
        self.initialized = true;
        Ok(())
    }

    pub fn device_type(&self) -> i32 {
        self.provider.device_type(self.handle)
    }

    pub fn glasses_version(&self) -> Result<String, ProviderError> {
        self.provider.glasses_version(self.handle)
    }

    pub fn brightness_level(&self) -> Result<i32, ProviderError> {
        self.provider.brightness_level(self.handle)
    }
}

impl<P: DeviceProvider> Drop for Session<'_, P> {
    fn drop(&mut self) {
        if self.initialized {
            self.provider.shutdown(self.handle);
        }
        self.provider.destroy(self.handle);
        debug!("destroyed handle {:?}", self.handle);
    }
}


#[cfg(test)]
mod tests {
    use super::mock::{status_code, MockProvider};
    use super::*;

    #[test]
    fn product_id_displays_as_padded_hex() {
        assert_eq!(ProductId(0x1101).to_string(), "0x1101");
        assert_eq!(ProductId(0x2a).to_string(), "0x002a");
    }

    #[test]
    fn all_product_ids_cover_the_u16_range() {
        let mut ids = ProductId::all();
        assert_eq!(ids.next(), Some(ProductId(0)));
        assert_eq!(ids.last(), Some(ProductId(u16::MAX)));
        assert_eq!(ProductId::all().count(), 65_536);
    }

    #[test]
    fn uninitialized_session_is_destroyed_without_shutdown() {
        let provider = MockProvider::with_products(&[(0x1101, None)]);
        {
            let _session = Session::create(&provider, ProductId(0x1101)).unwrap();
        }
        assert_eq!(provider.calls(), ["create 0x1101", "destroy"]);
    }

    #[test]
    fn initialized_session_shuts_down_before_destroy() {
        let provider = MockProvider::with_products(&[(0x1101, None)]);
        {
            let mut session = Session::create(&provider, ProductId(0x1101)).unwrap();
            session.initialize().unwrap();
        }
        assert_eq!(
            provider.calls(),
            ["create 0x1101", "initialize", "shutdown", "destroy"]
        );
    }

    #[test]
    fn failed_initialize_keeps_code_and_skips_shutdown() {
        let mut provider = MockProvider::with_products(&[(0x1101, None)]);
        provider.init_code = -3;
        {
            let mut session = Session::create(&provider, ProductId(0x1101)).unwrap();
            let err = session.initialize().unwrap_err();
            assert_eq!(status_code(&err), Some(-3));
        }
        assert_eq!(provider.calls(), ["create 0x1101", "initialize", "destroy"]);
    }

    #[test]
    fn null_handle_is_create_failure() {
        let mut provider = MockProvider::with_products(&[]);
        provider.create_fails = true;
        let err = Session::create(&provider, ProductId(7)).err().unwrap();
        assert!(matches!(err, ProviderError::CreateFailed(ProductId(7))));
        assert_eq!(provider.calls(), ["create 0x0007"]);
    }
}
