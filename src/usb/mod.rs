mod init;

extern crate libusb1_sys as ffi;

use anyhow::{anyhow, Result};
use ffi::constants::LIBUSB_ERROR_ACCESS;
use ffi::*;
use std::fmt::Display;

use crate::provider::ProductId;

pub use init::error_name;

type LibusbDevice = *mut libusb_device;

/// Pushes a pointer of type `T` to the stack.
/// ### Does not allocate the space of T.
///
/// Returns a pointer to a mutable T that points to `null`
#[inline]
fn ffi_ptr_mut<T>() -> *mut T {
    std::ptr::null_mut()
}

/// Same as [`ffi_ptr_mut`], for const pointers.
#[inline]
fn ffi_ptr_const<T>() -> *const T {
    std::ptr::null()
}

/// Whether libusb could open a device with the current user's permissions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Granted,
    Denied(i32),
}

/// A device seen on the bus, copied out of libusb so it outlives the device list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachedDevice {
    pub vendor_id: u16,
    pub product_id: u16,
    pub bus: u8,
    pub address: u8,
    pub product: Option<String>,
    pub manufacturer: Option<String>,
    pub access: Access,
}

impl AttachedDevice {
    /// Opened by nobody but root: usually a missing udev rule.
    pub fn permission_denied(&self) -> bool {
        self.access == Access::Denied(LIBUSB_ERROR_ACCESS)
    }
}

impl Display for AttachedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let product = self.product.as_deref().unwrap_or("no product name");
        let manufacturer = self.manufacturer.as_deref().unwrap_or("no manufacturer name");

        write!(
            f,
            "bus {:03} device {:03}: {:04x}:{:04x} {manufacturer} / {product}",
            self.bus, self.address, self.vendor_id, self.product_id,
        )?;

        match self.access {
            Access::Granted => Ok(()),
            Access::Denied(code) => write!(f, " (cannot open: {})", error_name(code)),
        }
    }
}

/// Interface to FFI bindings for [libusb](https://libusb.info/), used only to
/// tell whether the glasses are on the bus and openable.
/// # Example
/// ```ignore
/// let bus = UsbBus::new()?;
/// for device in bus.find_product(ProductId(0x1101)) {
///     println!("{device}");
/// }
/// ```
pub struct UsbBus {
    context: *mut libusb_context, // must be released via `libusb_exit`
    devices_ptr: *const LibusbDevice, // must be freed via `libusb_free_device_list`
    devices_len: isize,
}

impl UsbBus {
    /// Initialize a private libusb context and snapshot the device list.
    pub fn new() -> Result<Self> {
        let context = init::init()
            .map_err(|code| anyhow!("libusb_init failed: {}", error_name(code)))?;

        let (devices_ptr, devices_len) = match init::get_libusb_devices(context) {
            Ok(list) => list,
            Err(code) => {
                unsafe { libusb_exit(context) };
                return Err(anyhow!("libusb_get_device_list failed: {}", error_name(code)));
            }
        };

        Ok(Self {
            context,
            devices_ptr,
            devices_len,
        })
    }

    /// Get the version of [libusb](https://libusb.info/) running under the hood.
    #[inline]
    pub fn libusb_version_string() -> String {
        let (major, minor, micro, nano) = unsafe {
            let v = libusb_get_version();
            ((*v).major, (*v).minor, (*v).micro, (*v).nano)
        };

        format!("libusb v{major}.{minor}.{micro}.{nano}")
    }

    fn devices(&self) -> impl Iterator<Item = LibusbDevice> + '_ {
        (0..self.devices_len).map(|i| unsafe { *self.devices_ptr.offset(i) })
    }

    /// All devices on the bus reporting `product_id`, whatever their vendor.
    pub fn find_product(&self, product_id: ProductId) -> Vec<AttachedDevice> {
        self.devices()
            .filter_map(|device| {
                let descriptor = init::get_descriptor(device).ok()?;
                (descriptor.idProduct == product_id.0).then(|| describe(device, &descriptor))
            })
            .collect()
    }
}

fn describe(device: LibusbDevice, descriptor: &libusb_device_descriptor) -> AttachedDevice {
    let (bus, address) = unsafe {
        (
            libusb_get_bus_number(device),
            libusb_get_device_address(device),
        )
    };

    let (access, product, manufacturer) = match init::get_handle(device) {
        Ok(handle) => {
            let product = init::descriptor_to_string_check(handle, descriptor.iProduct);
            let manufacturer = init::descriptor_to_string_check(handle, descriptor.iManufacturer);
            unsafe { libusb_close(handle) };
            (Access::Granted, product, manufacturer)
        }
        Err(code) => (Access::Denied(code), None, None),
    };

    AttachedDevice {
        vendor_id: descriptor.idVendor,
        product_id: descriptor.idProduct,
        bus,
        address,
        product,
        manufacturer,
        access,
    }
}

/// Cleanup logic for the `UsbBus`
impl Drop for UsbBus {
    fn drop(&mut self) {
        unsafe {
            libusb_free_device_list(self.devices_ptr, 1);
            libusb_exit(self.context);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glasses(access: Access) -> AttachedDevice {
        AttachedDevice {
            vendor_id: 0x35ca,
            product_id: 0x1101,
            bus: 1,
            address: 12,
            product: Some("One".into()),
            manufacturer: Some("VITURE".into()),
            access,
        }
    }

    #[test]
    fn display_open_device() {
        assert_eq!(
            glasses(Access::Granted).to_string(),
            "bus 001 device 012: 35ca:1101 VITURE / One"
        );
    }

    #[test]
    fn display_denied_device_names_error() {
        let mut device = glasses(Access::Denied(LIBUSB_ERROR_ACCESS));
        device.product = None;
        device.manufacturer = None;
        assert_eq!(
            device.to_string(),
            "bus 001 device 012: 35ca:1101 no manufacturer name / no product name \
             (cannot open: LIBUSB_ERROR_ACCESS)"
        );
        assert!(device.permission_denied());
    }

    #[test]
    fn other_open_errors_are_not_permission_problems() {
        assert!(!glasses(Access::Granted).permission_denied());
        assert!(!glasses(Access::Denied(-4)).permission_denied());
    }
}
