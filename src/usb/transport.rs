use std::io;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use super::constants::{
    ALT_START, ALT_STOP, CONTROL_TIMEOUT, EP_FRAME_IN, IFACE_FILEIO, IFACE_FRAME, READ_CHUNK,
    REQUEST_SET_INTERFACE, REQUEST_TYPE_INTERFACE_OUT, STREAM_START_DELAY, USB_CONFIGURATION,
    USB_INTERFACES,
};
use super::context::{LibusbContext, LibusbDeviceHandle};
use super::device::open_device;

/// Blocking bulk transport to the camera.
///
/// Owns the device handle for the lifetime of a streaming session:
/// `open` claims the device and runs the stream-start handshake, `read`
/// pulls one bulk chunk at a time, `close` stops the stream and releases
/// everything. One instance per process; the device is exclusive once
/// claimed.
pub struct UsbTransport {
    handle: Option<LibusbDeviceHandle>,
    claimed_interfaces: Vec<u8>,
}

impl UsbTransport {
    pub fn new() -> Self {
        Self {
            handle: None,
            claimed_interfaces: Vec::new(),
        }
    }

    /// Open the camera and switch it into streaming mode.
    ///
    /// Idempotent: an already-open transport is left untouched.
    pub fn open(&mut self) -> io::Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }

        let context = LibusbContext::new()?;
        let (handle, label) = open_device(&context)?;
        info!("Opened {label}");

        for &iface in USB_INTERFACES.iter() {
            match handle.kernel_driver_active(iface as i32) {
                Ok(true) => {
                    if let Err(e) = handle.detach_kernel_driver(iface as i32) {
                        warn!("Could not detach kernel driver from interface {iface}: {e}");
                    }
                }
                Ok(false) => {}
                Err(e) => debug!("Kernel driver query on interface {iface}: {e}"),
            }
        }

        if let Err(e) = handle.set_configuration(USB_CONFIGURATION) {
            // Fails with BUSY when the configuration is already active.
            debug!("set_configuration({USB_CONFIGURATION}): {e}");
        }

        self.claimed_interfaces.clear();
        for &iface in USB_INTERFACES.iter() {
            match handle.claim_interface(iface as i32) {
                Ok(()) => self.claimed_interfaces.push(iface),
                // Interface 0 is not required for streaming.
                Err(e) => warn!("Could not claim interface {iface}: {e}"),
            }
        }
        debug!("Claimed interfaces: {:?}", self.claimed_interfaces);

        start_stream(&handle)?;
        self.handle = Some(handle);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Read one bulk chunk from the frame endpoint.
    ///
    /// Returns `Ok(None)` on USB timeout or when the device has gone away;
    /// the caller decides whether to retry or reopen. Any other transfer
    /// failure is surfaced as an error.
    pub fn read(&mut self, timeout: Duration) -> io::Result<Option<Vec<u8>>> {
        let Some(handle) = self.handle.as_ref() else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "transport is not open",
            ));
        };

        match handle.bulk_read_blocking(EP_FRAME_IN, READ_CHUNK, timeout) {
            Ok(chunk) => Ok(Some(chunk)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Stop the stream and release the device. Best-effort: teardown errors
    /// are logged and swallowed.
    pub fn close(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        for &iface in [IFACE_FRAME, IFACE_FILEIO].iter() {
            if let Err(e) = handle.control_out_blocking(
                REQUEST_TYPE_INTERFACE_OUT,
                REQUEST_SET_INTERFACE,
                ALT_STOP,
                iface,
                &[],
                CONTROL_TIMEOUT,
            ) {
                debug!("Stop request for interface {iface} failed: {e}");
            }
        }

        for &iface in self.claimed_interfaces.iter() {
            if let Err(e) = handle.release_interface(iface as i32) {
                debug!("Could not release interface {iface}: {e}");
            }
        }
        self.claimed_interfaces.clear();
        // Dropping the handle closes the device; the libusb context follows.
    }
}

/// SET_INTERFACE sequence that makes the camera start producing frames.
///
/// The FRAME and FILEIO interfaces are stopped first so the sequence is
/// idempotent across unclean shutdowns, then FILEIO is restarted. After the
/// settle delay the device streams on EP 0x85.
fn start_stream(handle: &LibusbDeviceHandle) -> io::Result<()> {
    debug!("Stop interface {IFACE_FRAME} (FRAME)");
    handle.control_out_blocking(
        REQUEST_TYPE_INTERFACE_OUT,
        REQUEST_SET_INTERFACE,
        ALT_STOP,
        IFACE_FRAME,
        &[],
        CONTROL_TIMEOUT,
    )?;

    debug!("Stop interface {IFACE_FILEIO} (FILEIO)");
    handle.control_out_blocking(
        REQUEST_TYPE_INTERFACE_OUT,
        REQUEST_SET_INTERFACE,
        ALT_STOP,
        IFACE_FILEIO,
        &[],
        CONTROL_TIMEOUT,
    )?;

    debug!("Start interface {IFACE_FILEIO} (FILEIO)");
    handle.control_out_blocking(
        REQUEST_TYPE_INTERFACE_OUT,
        REQUEST_SET_INTERFACE,
        ALT_START,
        IFACE_FILEIO,
        &[],
        CONTROL_TIMEOUT,
    )?;

    thread::sleep(STREAM_START_DELAY);
    info!("Stream handshake complete, frames available on EP 0x{EP_FRAME_IN:02x}");
    Ok(())
}

impl Default for UsbTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        self.close();
    }
}
