use std::io;
use std::ptr;
use std::sync::Arc;

use libusb1_sys as libusb;

use super::constants::{PRODUCT_ID, VENDOR_ID};
use super::context::{
    LibusbContext, LibusbDeviceHandle, get_device_descriptor, map_libusb_error,
    read_string_descriptor,
};

/// Find the first attached FLIR One Pro LT and open it.
///
/// Returns the open handle plus a human readable label for logging. The
/// driver supports exactly one device per process, so the first VID/PID
/// match wins.
pub(crate) fn open_device(
    context: &Arc<LibusbContext>,
) -> io::Result<(LibusbDeviceHandle, String)> {
    let mut list = ptr::null();
    let count = unsafe { libusb::libusb_get_device_list(context.ptr, &mut list) };
    if count < 0 {
        return Err(map_libusb_error(count as i32));
    }

    let mut result: Option<io::Result<(LibusbDeviceHandle, String)>> = None;

    for i in 0..count {
        let device = unsafe { *list.add(i as usize) };
        let desc = match get_device_descriptor(device) {
            Ok(d) => d,
            Err(e) => {
                result = Some(Err(e));
                break;
            }
        };

        if desc.idVendor != VENDOR_ID || desc.idProduct != PRODUCT_ID {
            continue;
        }

        result = Some(
            LibusbDeviceHandle::open(context.clone(), device).map(|handle| {
                let label = read_product_label(&handle, &desc);
                (handle, label)
            }),
        );
        break;
    }

    unsafe {
        libusb::libusb_free_device_list(list, 1);
    }

    result.unwrap_or_else(|| {
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no device matching {VENDOR_ID:04x}:{PRODUCT_ID:04x} attached"),
        ))
    })
}

fn read_product_label(
    handle: &LibusbDeviceHandle,
    desc: &libusb::libusb_device_descriptor,
) -> String {
    read_string_descriptor(handle, desc.iProduct)
        .or_else(|| read_string_descriptor(handle, desc.iSerialNumber))
        .unwrap_or_else(|| format!("{:04x}:{:04x}", desc.idVendor, desc.idProduct))
}
