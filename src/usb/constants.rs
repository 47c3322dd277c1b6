use std::time::Duration;

//
// USB identifiers
//
pub const VENDOR_ID: u16 = 0x09CB;
pub const PRODUCT_ID: u16 = 0x1996;

//
// Endpoints and transfer sizing
//
pub const EP_FRAME_IN: u8 = 0x85; // bulk IN carrying composite frames
pub const READ_CHUNK: usize = 16384;

//
// Configuration / interfaces
//
pub const USB_CONFIGURATION: i32 = 3;
pub const USB_INTERFACES: [u8; 3] = [0, 1, 2];

// wIndex values for the SET_INTERFACE handshake
pub const IFACE_FILEIO: u16 = 1;
pub const IFACE_FRAME: u16 = 2;

//
// Stream-start handshake
// bmRequestType 0x01 = host-to-device, standard, interface recipient
//
pub const REQUEST_TYPE_INTERFACE_OUT: u8 = 0x01;
pub const REQUEST_SET_INTERFACE: u8 = 0x0B;
pub const ALT_STOP: u16 = 0;
pub const ALT_START: u16 = 1;

//
// Default timeouts / delays
//
pub const CONTROL_TIMEOUT: Duration = Duration::from_millis(100);
pub const STREAM_START_DELAY: Duration = Duration::from_millis(100);

#[inline]
pub fn duration_to_timeout(duration: Duration) -> u32 {
    use std::os::raw::c_uint;
    if duration.is_zero() {
        return 0;
    }
    let millis = duration.as_millis();
    if millis == 0 {
        1
    } else if millis > c_uint::MAX as u128 {
        c_uint::MAX as u32
    } else {
        millis as u32
    }
}
