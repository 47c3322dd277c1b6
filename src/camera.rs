//! High-level camera facade.

use std::time::{Duration, Instant};

use log::info;

use crate::error::Error;
use crate::parser::{FrameParser, ParsedFrame, THERMAL_WIDTH};
use crate::thermal::ThermalCalibration;
use crate::usb::UsbTransport;

/// A fully decoded composite frame.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// Raw 16-bit counts, row-major 60x80.
    pub thermal_raw: Vec<u16>,
    /// Per-pixel temperature in degrees Celsius, same layout.
    pub celsius: Vec<f32>,
    /// Embedded visible-camera JPEG, passed through undecoded.
    pub visible_jpeg: Option<Vec<u8>>,
    /// Opaque telemetry/status block.
    pub status_data: Option<Vec<u8>>,
    pub min_c: f32,
    pub max_c: f32,
    pub mean_c: f32,
    /// (column, row) of the coldest pixel.
    pub min_xy: (usize, usize),
    /// (column, row) of the hottest pixel.
    pub max_xy: (usize, usize),
    /// Monotonic timestamp taken when the frame was returned.
    pub timestamp: Instant,
}

impl DecodedFrame {
    fn from_parsed(parsed: ParsedFrame, calibration: &ThermalCalibration) -> Self {
        let celsius = calibration.raw_to_celsius_image(&parsed.thermal_raw);
        let stats = FrameStats::compute(&celsius);
        DecodedFrame {
            thermal_raw: parsed.thermal_raw,
            celsius,
            visible_jpeg: parsed.visible_jpeg,
            status_data: parsed.status_data,
            min_c: stats.min_c,
            max_c: stats.max_c,
            mean_c: stats.mean_c,
            min_xy: stats.min_xy,
            max_xy: stats.max_xy,
            timestamp: Instant::now(),
        }
    }

    /// Temperature at `(x, y)`; `x` is the column (0..79), `y` the row
    /// (0..59).
    pub fn celsius_at(&self, x: usize, y: usize) -> f32 {
        self.celsius[y * THERMAL_WIDTH + x]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct FrameStats {
    min_c: f32,
    max_c: f32,
    mean_c: f32,
    min_xy: (usize, usize),
    max_xy: (usize, usize),
}

impl FrameStats {
    /// Min/max/mean over the Celsius matrix. Row-major scan, strict
    /// comparisons: on ties the first pixel wins.
    fn compute(celsius: &[f32]) -> Self {
        let mut min_c = f32::INFINITY;
        let mut max_c = f32::NEG_INFINITY;
        let mut min_xy = (0, 0);
        let mut max_xy = (0, 0);
        let mut sum = 0.0f64;

        for (i, &c) in celsius.iter().enumerate() {
            let xy = (i % THERMAL_WIDTH, i / THERMAL_WIDTH);
            if c < min_c {
                min_c = c;
                min_xy = xy;
            }
            if c > max_c {
                max_c = c;
                max_xy = xy;
            }
            sum += f64::from(c);
        }

        FrameStats {
            min_c,
            max_c,
            mean_c: (sum / celsius.len() as f64) as f32,
            min_xy,
            max_xy,
        }
    }
}

/// Blocking interface to a single FLIR One Pro LT.
///
/// One owner drives `open -> read_frame* -> close`; nothing here is shared
/// between threads. Callers that fan frames out to several consumers should
/// broadcast the returned [`DecodedFrame`] values.
pub struct FlirCamera {
    transport: UsbTransport,
    parser: FrameParser,
    calibration: ThermalCalibration,
}

impl FlirCamera {
    pub fn new(calibration: ThermalCalibration) -> Self {
        Self {
            transport: UsbTransport::new(),
            parser: FrameParser::new(),
            calibration,
        }
    }

    /// Claim the device and start the frame stream.
    pub fn open(&mut self) -> Result<(), Error> {
        self.transport.open()?;
        self.parser.reset();
        info!("FLIR One Pro LT connected");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Stop the stream and release the device. Idempotent.
    pub fn close(&mut self) {
        if self.transport.is_open() {
            self.transport.close();
            self.parser.reset();
            info!("FLIR One Pro LT disconnected");
        }
    }

    pub fn calibration(&self) -> &ThermalCalibration {
        &self.calibration
    }

    /// Replace the calibration used for subsequent frames. Taking `&mut
    /// self` serializes this against `read_frame`, so updates land between
    /// frames.
    pub fn set_calibration(&mut self, calibration: ThermalCalibration) {
        self.calibration = calibration;
    }

    /// Read and decode the next frame, waiting at most `timeout`.
    ///
    /// Returns `Ok(None)` when the deadline passes without a complete frame;
    /// USB read timeouts inside the window are retried. Transport failures
    /// are fatal for the session: the caller should `close` and reopen.
    pub fn read_frame(&mut self, timeout: Duration) -> Result<Option<DecodedFrame>, Error> {
        let deadline = Instant::now() + timeout;

        // A second frame may already be buffered from the previous chunk.
        if let Some(parsed) = self.parser.add_chunk(&[]) {
            return Ok(Some(DecodedFrame::from_parsed(parsed, &self.calibration)));
        }

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let Some(chunk) = self.transport.read(deadline - now)? else {
                continue;
            };
            if let Some(parsed) = self.parser.add_chunk(&chunk) {
                return Ok(Some(DecodedFrame::from_parsed(parsed, &self.calibration)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::THERMAL_PIXELS;

    #[test]
    fn stats_locate_extremes_by_column_and_row() {
        let mut celsius = vec![20.0f32; THERMAL_PIXELS];
        celsius[17 * THERMAL_WIDTH + 63] = 85.5; // hottest at (63, 17)
        celsius[42 * THERMAL_WIDTH + 5] = -4.0; // coldest at (5, 42)

        let stats = FrameStats::compute(&celsius);
        assert_eq!(stats.max_c, 85.5);
        assert_eq!(stats.max_xy, (63, 17));
        assert_eq!(stats.min_c, -4.0);
        assert_eq!(stats.min_xy, (5, 42));
    }

    #[test]
    fn stats_mean_over_uniform_matrix() {
        let celsius = vec![36.6f32; THERMAL_PIXELS];
        let stats = FrameStats::compute(&celsius);
        assert!((stats.mean_c - 36.6).abs() < 1e-4);
        assert_eq!(stats.min_c, 36.6);
        assert_eq!(stats.max_c, 36.6);
    }

    #[test]
    fn stats_ties_resolve_to_first_pixel_row_major() {
        let mut celsius = vec![10.0f32; THERMAL_PIXELS];
        celsius[3] = 50.0;
        celsius[THERMAL_WIDTH + 3] = 50.0;

        let stats = FrameStats::compute(&celsius);
        assert_eq!(stats.max_xy, (3, 0));
        // Uniform remainder ties on the minimum too; first pixel wins.
        assert_eq!(stats.min_xy, (0, 0));
    }

    #[test]
    fn decoded_frame_carries_payloads_and_stats() {
        let mut thermal_raw = vec![4096u16; THERMAL_PIXELS];
        thermal_raw[9 * THERMAL_WIDTH + 31] = 9000; // hotter pixel at (31, 9)

        let parsed = ParsedFrame {
            thermal_raw,
            visible_jpeg: Some(vec![0xFF, 0xD8]),
            status_data: None,
            frame_size: (THERMAL_PIXELS * 2 + 2) as u32,
            thermal_size: (THERMAL_PIXELS * 2) as u32,
            jpeg_size: 2,
            status_size: 0,
        };

        let cal = ThermalCalibration::default();
        let frame = DecodedFrame::from_parsed(parsed, &cal);

        assert_eq!(frame.celsius.len(), THERMAL_PIXELS);
        assert_eq!(frame.max_xy, (31, 9));
        assert_eq!(frame.celsius_at(31, 9), frame.max_c);
        assert_eq!(frame.celsius_at(0, 0), cal.raw_to_celsius(4096));
        assert_eq!(frame.visible_jpeg.as_deref(), Some([0xFF, 0xD8].as_slice()));
        assert!(frame.min_c <= frame.mean_c && frame.mean_c <= frame.max_c);
    }
}
