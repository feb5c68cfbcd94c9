use std::ffi::CStr;
use std::mem::MaybeUninit;

use libc::c_int;
use libusb1_sys::{
    libusb_context, libusb_device_descriptor, libusb_device_handle, libusb_error_name,
    libusb_get_device_descriptor, libusb_get_device_list, libusb_get_string_descriptor_ascii,
    libusb_init, libusb_open,
};

use super::{ffi_ptr_const, ffi_ptr_mut, LibusbDevice};

const STRING_BUF_LEN: usize = 255;

pub(super) fn init() -> Result<*mut libusb_context, i32> {
    let mut context = ffi_ptr_mut::<libusb_context>();
    let code = unsafe { libusb_init(&mut context) };
    if code < 0 {
        Err(code)
    } else {
        Ok(context)
    }
}

pub(super) fn get_libusb_devices(
    context: *mut libusb_context,
) -> Result<(*const LibusbDevice, isize), i32> {
    let mut devices = ffi_ptr_const::<LibusbDevice>();
    let devices_size = unsafe { libusb_get_device_list(context, &mut devices) };

    if devices_size < 0 {
        Err(devices_size as i32)
    } else {
        Ok((devices, devices_size))
    }
}

pub(super) fn get_descriptor(device: LibusbDevice) -> Result<libusb_device_descriptor, i32> {
    let mut descriptor = MaybeUninit::<libusb_device_descriptor>::uninit();
    let code = unsafe { libusb_get_device_descriptor(device, descriptor.as_mut_ptr()) };

    if code < 0 {
        Err(code)
    } else {
        Ok(unsafe { descriptor.assume_init() })
    }
}

/// Opens `device`. The caller owns the handle and must `libusb_close` it.
pub(super) fn get_handle(device: LibusbDevice) -> Result<*mut libusb_device_handle, i32> {
    let mut handle = ffi_ptr_mut::<libusb_device_handle>();
    let code = unsafe { libusb_open(device, &mut handle) };

    if code < 0 {
        Err(code)
    } else {
        Ok(handle)
    }
}

pub(super) fn descriptor_to_string_check(
    handle: *mut libusb_device_handle,
    descriptor_field: u8,
) -> Option<String> {
    if descriptor_field == 0 {
        return None;
    }

    descriptor_to_string(handle, descriptor_field).ok()
}

pub(super) fn descriptor_to_string(
    handle: *mut libusb_device_handle,
    descriptor_field: u8,
) -> Result<String, i32> {
    let mut raw_bytes = [0_u8; STRING_BUF_LEN];

    let code = unsafe {
        libusb_get_string_descriptor_ascii(
            handle,
            descriptor_field,
            raw_bytes.as_mut_ptr(),
            STRING_BUF_LEN as c_int,
        )
    };

    if code < 0 {
        Err(code)
    } else {
        // positive codes are the number of bytes written
        let len = (code as usize).min(STRING_BUF_LEN);
        Ok(String::from_utf8_lossy(&raw_bytes[..len]).into_owned())
    }
}

/// Symbolic libusb name for an error code, e.g. `LIBUSB_ERROR_ACCESS`.
pub fn error_name(code: i32) -> String {
    let name = unsafe { CStr::from_ptr(libusb_error_name(code)) };
    name.to_string_lossy().into_owned()
}
