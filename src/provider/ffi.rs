use std::ffi::OsStr;
use std::ptr::NonNull;

use libc::{c_char, c_int, c_void};
use libloading::Library;
use log::debug;

use super::{DeviceProvider, ProductId, ProviderError, RawHandle};

/// Size of the caller-owned buffers handed to the string queries.
pub(super) const TEXT_BUF_LEN: usize = 256;

type IsProductIdValidFn = unsafe extern "C" fn(c_int) -> bool;
type GetMarketNameFn = unsafe extern "C" fn(c_int, *mut c_char, *mut c_int) -> c_int;
type CreateFn = unsafe extern "C" fn(c_int) -> *mut c_void;
type SetLogLevelFn = unsafe extern "C" fn(c_int);
type InitializeFn = unsafe extern "C" fn(*mut c_void, *mut c_void, *mut c_void) -> c_int;
type HandleQueryFn = unsafe extern "C" fn(*mut c_void) -> c_int;
type GetGlassesVersionFn = unsafe extern "C" fn(*mut c_void, *mut c_char, *mut c_int) -> c_int;
type DestroyFn = unsafe extern "C" fn(*mut c_void);

/// Entry points resolved from the vendor library.
struct VendorApi {
    is_product_id_valid: IsProductIdValidFn,
    get_market_name: GetMarketNameFn,
    create: CreateFn,
    set_log_level: SetLogLevelFn,
    initialize: InitializeFn,
    get_device_type: HandleQueryFn,
    get_glasses_version: GetGlassesVersionFn,
    get_brightness_level: HandleQueryFn,
    shutdown: HandleQueryFn,
    destroy: DestroyFn,
}

/// Resolves `name` (without the trailing NUL) to a function pointer of type `T`.
///
/// # Safety
/// `T` must match the C signature of the exported symbol.
unsafe fn symbol<T: Copy>(library: &Library, name: &'static str) -> Result<T, ProviderError> {
    let mut raw = Vec::with_capacity(name.len() + 1);
    raw.extend_from_slice(name.as_bytes());
    raw.push(0);

    library
        .get::<T>(&raw)
        .map(|sym| *sym)
        .map_err(|source| ProviderError::MissingSymbol { name, source })
}

impl VendorApi {
    fn resolve(library: &Library) -> Result<Self, ProviderError> {
        unsafe {
            Ok(Self {
                is_product_id_valid: symbol(library, "xr_device_provider_is_product_id_valid")?,
                get_market_name: symbol(library, "xr_device_provider_get_market_name")?,
                create: symbol(library, "xr_device_provider_create")?,
                set_log_level: symbol(library, "xr_device_provider_set_log_level")?,
                initialize: symbol(library, "xr_device_provider_initialize")?,
                get_device_type: symbol(library, "xr_device_provider_get_device_type")?,
                get_glasses_version: symbol(library, "xr_device_provider_get_glasses_version")?,
                get_brightness_level: symbol(library, "xr_device_provider_get_brightness_level")?,
                shutdown: symbol(library, "xr_device_provider_shutdown")?,
                destroy: symbol(library, "xr_device_provider_destroy")?,
            })
        }
    }
}

/// Decodes a C string written into `buf`, bounded by the length the callee reported.
pub(super) fn text_from_buffer(buf: &[u8], reported_len: c_int) -> String {
    let bound = usize::try_from(reported_len)
        .unwrap_or(0)
        .min(buf.len());
    let text = &buf[..bound];
    let end = text.iter().position(|&b| b == 0).unwrap_or(text.len());

    String::from_utf8_lossy(&text[..end]).into_owned()
}

/// Calls a vendor string query with a fresh [`TEXT_BUF_LEN`] buffer.
fn query_text(
    call: &'static str,
    f: impl FnOnce(*mut c_char, *mut c_int) -> c_int,
) -> Result<String, ProviderError> {
    let mut buf = [0_u8; TEXT_BUF_LEN];
    let mut len = TEXT_BUF_LEN as c_int;

    let code = f(buf.as_mut_ptr().cast(), &mut len);

    if code != 0 {
        return Err(ProviderError::Status { call, code });
    }

    Ok(text_from_buffer(&buf, len))
}

/// The vendor glasses provider, loaded at runtime.
pub struct VendorLibrary {
    api: VendorApi,
    _library: Library, // keeps `api` pointers valid
}

impl VendorLibrary {
    pub fn load(path: impl AsRef<OsStr>) -> Result<Self, ProviderError> {
        let path = path.as_ref();
        debug!("loading provider library {path:?}");

        let library = unsafe { Library::new(path) }.map_err(ProviderError::Load)?;
        let api = VendorApi::resolve(&library)?;

        Ok(Self {
            api,
            _library: library,
        })
    }
}

impl DeviceProvider for VendorLibrary {
    type Handle = RawHandle;

    fn is_product_id_valid(&self, product_id: ProductId) -> bool {
        unsafe { (self.api.is_product_id_valid)(product_id.into()) }
    }

    fn market_name(&self, product_id: ProductId) -> Result<String, ProviderError> {
        query_text("get_market_name", |buf, len| unsafe {
            (self.api.get_market_name)(product_id.into(), buf, len)
        })
    }

    fn create(&self, product_id: ProductId) -> Option<RawHandle> {
        let ptr = unsafe { (self.api.create)(product_id.into()) };
        NonNull::new(ptr).map(RawHandle)
    }

    fn set_log_level(&self, level: i32) {
        unsafe { (self.api.set_log_level)(level) }
    }

    fn initialize(&self, handle: RawHandle) -> Result<(), ProviderError> {
        let code = unsafe {
            (self.api.initialize)(
                handle.as_ptr(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };

        match code {
            0 => Ok(()),
            code => Err(ProviderError::Status {
                call: "initialize",
                code,
            }),
        }
    }

    fn device_type(&self, handle: RawHandle) -> i32 {
        unsafe { (self.api.get_device_type)(handle.as_ptr()) }
    }

    fn glasses_version(&self, handle: RawHandle) -> Result<String, ProviderError> {
        query_text("get_glasses_version", |buf, len| unsafe {
            (self.api.get_glasses_version)(handle.as_ptr(), buf, len)
        })
    }

    fn brightness_level(&self, handle: RawHandle) -> Result<i32, ProviderError> {
        let level = unsafe { (self.api.get_brightness_level)(handle.as_ptr()) };

        if level < 0 {
            Err(ProviderError::Status {
                call: "get_brightness_level",
                code: level,
            })
        } else {
            Ok(level)
        }
    }

    fn shutdown(&self, handle: RawHandle) {
        let code = unsafe { (self.api.shutdown)(handle.as_ptr()) };
        if code != 0 {
            debug!("shutdown returned {code}");
        }
    }

    fn destroy(&self, handle: RawHandle) {
        unsafe { (self.api.destroy)(handle.as_ptr()) }
    }
}
