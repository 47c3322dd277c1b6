//! USB transport for the FLIR One Pro LT camera.
mod constants;
mod context;
mod device;
mod transport;

pub use transport::UsbTransport;
