//! User-space driver for the FLIR One Pro LT thermal camera.
//!
//! The camera pairs an 80x60 microbolometer with a visible-light CMOS sensor
//! and streams composite frames (16-bit radiometric counts, a JPEG snapshot
//! and an opaque status block) over a USB bulk endpoint. This crate claims
//! the device, drives its stream-start handshake, reassembles frames from the
//! unaligned byte stream and converts raw counts to degrees Celsius.

pub mod camera;
pub mod error;
pub mod parser;
pub mod thermal;
pub mod usb;

pub use camera::{DecodedFrame, FlirCamera};
pub use error::Error;
pub use parser::{FrameParser, ParsedFrame};
pub use thermal::ThermalCalibration;
