use std::ffi::CStr;
use std::io;
use std::mem::MaybeUninit;
use std::os::raw::{c_int, c_uint};
use std::ptr;
use std::sync::Arc;
use std::time::Duration;

use libusb1_sys as libusb;
use libusb1_sys::constants::{
    LIBUSB_ERROR_ACCESS, LIBUSB_ERROR_BUSY, LIBUSB_ERROR_INTERRUPTED, LIBUSB_ERROR_NO_DEVICE,
    LIBUSB_ERROR_NOT_FOUND, LIBUSB_ERROR_PIPE, LIBUSB_ERROR_TIMEOUT,
};

use super::constants::duration_to_timeout;

/// RAII wrapper owning a libusb context.
///
/// All transfers on this driver are issued through the blocking libusb API,
/// which pumps events internally, so no event thread is attached here. The
/// context must outlive every handle opened from it; handles keep it alive
/// through an [`Arc`].
pub(crate) struct LibusbContext {
    pub(crate) ptr: *mut libusb::libusb_context,
}

impl LibusbContext {
    pub(crate) fn new() -> io::Result<Arc<Self>> {
        let mut ctx = ptr::null_mut();
        let rc = unsafe { libusb::libusb_init(&mut ctx) };
        if rc < 0 {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("libusb init failed: {rc}"),
            ));
        }
        Ok(Arc::new(LibusbContext { ptr: ctx }))
    }
}

impl Drop for LibusbContext {
    fn drop(&mut self) {
        unsafe { libusb::libusb_exit(self.ptr) };
    }
}

/// Wrapper around a libusb device handle with automatic close semantics.
pub(crate) struct LibusbDeviceHandle {
    _context: Arc<LibusbContext>,
    handle: *mut libusb::libusb_device_handle,
}

impl Drop for LibusbDeviceHandle {
    fn drop(&mut self) {
        unsafe { libusb::libusb_close(self.handle) };
    }
}

impl LibusbDeviceHandle {
    pub(crate) fn open(
        context: Arc<LibusbContext>,
        device: *mut libusb::libusb_device,
    ) -> io::Result<Self> {
        let mut handle = ptr::null_mut();
        let rc = unsafe { libusb::libusb_open(device, &mut handle) };
        if rc < 0 {
            return Err(map_libusb_error(rc));
        }
        Ok(Self {
            _context: context,
            handle,
        })
    }

    pub(crate) fn raw(&self) -> *mut libusb::libusb_device_handle {
        self.handle
    }

    pub(crate) fn kernel_driver_active(&self, interface: i32) -> io::Result<bool> {
        let rc = unsafe { libusb::libusb_kernel_driver_active(self.handle, interface) };
        if rc < 0 {
            return Err(map_libusb_error(rc));
        }
        Ok(rc == 1)
    }

    pub(crate) fn detach_kernel_driver(&self, interface: i32) -> io::Result<()> {
        let rc = unsafe { libusb::libusb_detach_kernel_driver(self.handle, interface) };
        // NOT_FOUND means no driver was attached, which is the desired state.
        if rc < 0 && rc != LIBUSB_ERROR_NOT_FOUND {
            return Err(map_libusb_error(rc));
        }
        Ok(())
    }

    pub(crate) fn set_configuration(&self, configuration: i32) -> io::Result<()> {
        let rc = unsafe { libusb::libusb_set_configuration(self.handle, configuration) };
        if rc < 0 {
            return Err(map_libusb_error(rc));
        }
        Ok(())
    }

    pub(crate) fn claim_interface(&self, interface: i32) -> io::Result<()> {
        let rc = unsafe { libusb::libusb_claim_interface(self.handle, interface) };
        if rc < 0 {
            return Err(map_libusb_error(rc));
        }
        Ok(())
    }

    pub(crate) fn release_interface(&self, interface: i32) -> io::Result<()> {
        let rc = unsafe { libusb::libusb_release_interface(self.handle, interface) };
        if rc < 0 {
            return Err(map_libusb_error(rc));
        }
        Ok(())
    }

    pub(crate) fn control_out_blocking(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        timeout: Duration,
    ) -> io::Result<usize> {
        let millis = duration_to_timeout(timeout);
        let rc = unsafe {
            libusb::libusb_control_transfer(
                self.handle,
                request_type,
                request,
                value,
                index,
                data.as_ptr() as *mut u8,
                data.len() as u16,
                millis,
            )
        };
        if rc < 0 {
            return Err(map_libusb_error(rc));
        }
        Ok(rc as usize)
    }

    pub(crate) fn bulk_read_blocking(
        &self,
        endpoint: u8,
        length: usize,
        timeout: Duration,
    ) -> io::Result<Vec<u8>> {
        let mut buffer = vec![0u8; length];
        let mut transferred: c_int = 0;
        let rc = unsafe {
            libusb::libusb_bulk_transfer(
                self.handle,
                endpoint,
                buffer.as_mut_ptr(),
                length as c_int,
                &mut transferred,
                duration_to_timeout(timeout) as c_uint,
            )
        };
        if rc < 0 {
            return Err(map_libusb_error(rc));
        }
        buffer.truncate(transferred as usize);
        Ok(buffer)
    }
}

pub(crate) fn libusb_error_string(code: i32) -> String {
    unsafe {
        let ptr = libusb::libusb_error_name(code);
        if ptr.is_null() {
            format!("libusb error {code}")
        } else {
            CStr::from_ptr(ptr).to_string_lossy().into_owned()
        }
    }
}

pub(crate) fn map_libusb_error(code: i32) -> io::Error {
    let kind = match code {
        LIBUSB_ERROR_TIMEOUT => io::ErrorKind::WouldBlock,
        LIBUSB_ERROR_PIPE => io::ErrorKind::BrokenPipe,
        LIBUSB_ERROR_NO_DEVICE => io::ErrorKind::NotConnected,
        LIBUSB_ERROR_NOT_FOUND => io::ErrorKind::NotFound,
        LIBUSB_ERROR_INTERRUPTED => io::ErrorKind::Interrupted,
        LIBUSB_ERROR_BUSY => io::ErrorKind::ResourceBusy,
        LIBUSB_ERROR_ACCESS => io::ErrorKind::PermissionDenied,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, libusb_error_string(code))
}

pub(crate) fn get_device_descriptor(
    device: *mut libusb::libusb_device,
) -> io::Result<libusb::libusb_device_descriptor> {
    let mut desc = MaybeUninit::<libusb::libusb_device_descriptor>::uninit();
    let rc = unsafe { libusb::libusb_get_device_descriptor(device, desc.as_mut_ptr()) };
    if rc < 0 {
        return Err(map_libusb_error(rc));
    }
    Ok(unsafe { desc.assume_init() })
}

pub(crate) fn read_string_descriptor(handle: &LibusbDeviceHandle, index: u8) -> Option<String> {
    if index == 0 {
        return None;
    }
    let mut buf = vec![0u8; 255];
    let len = unsafe {
        libusb::libusb_get_string_descriptor_ascii(
            handle.raw(),
            index,
            buf.as_mut_ptr(),
            buf.len() as c_int,
        )
    };
    if len < 0 {
        return None;
    }
    buf.truncate(len as usize);
    String::from_utf8(buf).ok()
}
