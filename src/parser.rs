//! Composite-frame parser for the bulk byte stream.
//!
//! The camera emits frames as `magic | header | thermal | jpeg | status`
//! with no alignment between frame boundaries and bulk transfer boundaries,
//! so the parser is an incremental state machine over a fixed-capacity
//! linear buffer. It is either synced (buffer starts at a frame boundary)
//! or scanning for the next magic sequence; every transition consumes a
//! prefix, emits a frame, or explicitly resets. Malformed data never raises
//! an error, it only costs the bytes until the next magic.
//!
//! Wire layout (all header fields little-endian):
//!
//! ```text
//! offset 0  : magic = EF BE 00 00
//! offset 4  : reserved (4 bytes)
//! offset 8  : frame_size   (u32, payload bytes after the header)
//! offset 12 : thermal_size (u32)
//! offset 16 : jpeg_size    (u32)
//! offset 20 : status_size  (u32)
//! offset 24 : reserved (4 bytes)
//! offset 28 : thermal payload (u16 BE, row-major 60x80), then jpeg, then status
//! ```

use log::warn;
use memchr::memmem;

/// First four bytes of every composite frame.
pub const MAGIC: [u8; 4] = [0xEF, 0xBE, 0x00, 0x00];

/// Header bytes preceding the payload blocks (magic included).
pub const HEADER_SIZE: usize = 28;

/// Thermal matrix dimensions for the Pro LT (Gen 3) sensor.
pub const THERMAL_WIDTH: usize = 80;
pub const THERMAL_HEIGHT: usize = 60;
pub const THERMAL_PIXELS: usize = THERMAL_WIDTH * THERMAL_HEIGHT;

const THERMAL_BYTES: usize = THERMAL_PIXELS * 2;

/// Default parse-buffer capacity. Composite frames run well under 256 KiB
/// even with a large JPEG, so 1 MiB leaves headroom for resync garbage.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1 << 20;

/// One composite frame carved out of the stream.
///
/// Owns copies of its payload blocks; nothing aliases the parse buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFrame {
    /// Raw 16-bit counts, row-major 60x80.
    pub thermal_raw: Vec<u16>,
    /// Embedded visible-camera JPEG, passed through undecoded.
    pub visible_jpeg: Option<Vec<u8>>,
    /// Opaque telemetry/status block.
    pub status_data: Option<Vec<u8>>,
    /// Declared payload size (bytes after the header).
    pub frame_size: u32,
    pub thermal_size: u32,
    pub jpeg_size: u32,
    pub status_size: u32,
}

impl ParsedFrame {
    /// Raw count at `(x, y)`; `x` is the column (0..79), `y` the row (0..59).
    pub fn raw_at(&self, x: usize, y: usize) -> u16 {
        self.thermal_raw[y * THERMAL_WIDTH + x]
    }
}

/// Incremental parser over the unaligned bulk stream.
///
/// Feed chunks with [`add_chunk`](Self::add_chunk); each call returns at most
/// one frame, leaving any surplus bytes buffered for the next call. An empty
/// chunk is a valid input and just re-polls the buffered bytes, which is how
/// a second back-to-back frame already sitting in the buffer gets drained.
pub struct FrameParser {
    buf: Vec<u8>,
    capacity: usize,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    /// `capacity` bounds the buffered bytes and thereby the largest
    /// acceptable `frame_size`; it must hold at least one header plus frame.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append one bulk chunk and try to carve the next complete frame.
    pub fn add_chunk(&mut self, chunk: &[u8]) -> Option<ParsedFrame> {
        if self.buf.len() + chunk.len() > self.capacity {
            self.recover_from_overflow(chunk);
            return None;
        }
        self.buf.extend_from_slice(chunk);
        self.try_parse_frame()
    }

    /// Drop all buffered bytes; used after a device reopen.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    fn try_parse_frame(&mut self) -> Option<ParsedFrame> {
        if self.buf.len() < MAGIC.len() {
            return None;
        }

        if self.buf[..MAGIC.len()] != MAGIC && !self.resync() {
            return None;
        }

        // Header plus a little, so the size fields below are readable.
        if self.buf.len() < HEADER_SIZE + MAGIC.len() {
            return None;
        }

        let frame_size = read_u32_le(&self.buf, 8);
        let thermal_size = read_u32_le(&self.buf, 12);
        let jpeg_size = read_u32_le(&self.buf, 16);
        let status_size = read_u32_le(&self.buf, 20);

        if !self.header_plausible(frame_size, thermal_size, jpeg_size, status_size) {
            warn!(
                "Implausible frame header (frame={frame_size} thermal={thermal_size} \
                 jpeg={jpeg_size} status={status_size}), dropping buffer"
            );
            self.buf.clear();
            return None;
        }

        let total = HEADER_SIZE + frame_size as usize;
        if self.buf.len() < total {
            return None; // await more bytes
        }

        let frame = self.carve_frame(frame_size, thermal_size, jpeg_size, status_size);
        self.buf.drain(..total);
        Some(frame)
    }

    /// Scan past a broken prefix for the next magic sequence. Returns true
    /// when the buffer now starts with the magic.
    fn resync(&mut self) -> bool {
        match memmem::find(&self.buf[1..], &MAGIC) {
            Some(pos) => {
                self.buf.drain(..pos + 1);
                true
            }
            None => {
                // The magic may straddle the next chunk; keep a needle-sized
                // tail and discard the rest.
                let keep = self.buf.len().min(MAGIC.len() - 1);
                let cut = self.buf.len() - keep;
                self.buf.drain(..cut);
                false
            }
        }
    }

    fn header_plausible(
        &self,
        frame_size: u32,
        thermal_size: u32,
        jpeg_size: u32,
        status_size: u32,
    ) -> bool {
        if frame_size == 0 {
            return false;
        }
        let Some(total) = (frame_size as usize).checked_add(HEADER_SIZE) else {
            return false;
        };
        if total > self.capacity {
            return false;
        }
        let declared = thermal_size as u64 + jpeg_size as u64 + status_size as u64;
        declared <= frame_size as u64
    }

    fn carve_frame(
        &self,
        frame_size: u32,
        thermal_size: u32,
        jpeg_size: u32,
        status_size: u32,
    ) -> ParsedFrame {
        let thermal_start = HEADER_SIZE;
        let thermal_end = thermal_start + thermal_size as usize;

        let thermal_raw = if thermal_size as usize >= THERMAL_BYTES {
            decode_thermal(&self.buf[thermal_start..thermal_start + THERMAL_BYTES])
        } else {
            // Short radiometric block: deliver a zeroed matrix instead of
            // dropping the composite, so the JPEG and status blocks still
            // reach the caller.
            warn!("Thermal block is {thermal_size} bytes, expected {THERMAL_BYTES}; zero-filling");
            vec![0u16; THERMAL_PIXELS]
        };

        let jpeg_start = thermal_end;
        let jpeg_end = jpeg_start + jpeg_size as usize;
        let visible_jpeg = (jpeg_size > 0).then(|| self.buf[jpeg_start..jpeg_end].to_vec());

        let status_start = jpeg_end;
        let status_end = status_start + status_size as usize;
        let status_data = (status_size > 0).then(|| self.buf[status_start..status_end].to_vec());

        ParsedFrame {
            thermal_raw,
            visible_jpeg,
            status_data,
            frame_size,
            thermal_size,
            jpeg_size,
            status_size,
        }
    }

    /// Buffer would overflow: drop everything and restart from the incoming
    /// chunk, at the magic if it contains one, else keeping a tail that may
    /// be a magic prefix.
    fn recover_from_overflow(&mut self, chunk: &[u8]) {
        warn!(
            "Parse buffer overflow ({} buffered + {} incoming > {}), resyncing",
            self.buf.len(),
            chunk.len(),
            self.capacity
        );
        self.buf.clear();
        match memmem::find(chunk, &MAGIC) {
            Some(pos) => {
                let take = (chunk.len() - pos).min(self.capacity);
                self.buf.extend_from_slice(&chunk[pos..pos + take]);
            }
            None => {
                let keep = chunk.len().min(MAGIC.len() - 1);
                self.buf.extend_from_slice(&chunk[chunk.len() - keep..]);
            }
        }
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_thermal(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|px| u16::from_be_bytes([px[0], px[1]]))
        .collect()
}

#[inline]
fn read_u32_le(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}
