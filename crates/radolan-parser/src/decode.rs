//! Incremental decoder for radar composite byte streams.
//!
//! Input arrives in arbitrary chunks (network reads, decompressor
//! output). The decoder accumulates header bytes until the ETX
//! terminator shows up, which need not be in the first chunk, and
//! afterwards splits the payload into little-endian samples, carrying
//! leftover bytes shorter than the sample width over to the next chunk.

use tracing::debug;

use crate::error::{ParseError, Result};
use crate::grid::{GridValues, RadarGrid};
use crate::header::{parse_header, ProductHeader};
use crate::product::Product;

/// Sentinel for cells without a measurement. Out of band for every
/// product and shared by the WN and RV transforms; the dBZ transform
/// passes it through unchanged.
pub const NO_DATA: f32 = -9999.0;

/// Sentinel for cells whose value fell outside the measurable range
/// (byte composites only).
pub const OUT_OF_RANGE: f32 = -9998.0;

/// Header terminator byte.
const ETX: u8 = 0x03;

/// No-data pattern of a raw 2-byte word (error bit 13).
const WORD_ERROR: u16 = 0x2000;
/// Negative-sign bit of a raw 2-byte word.
const WORD_SIGN: u16 = 0x4000;
/// Clutter bit of a raw 2-byte word.
const WORD_CLUTTER: u16 = 0x8000;
/// Station-interpolation bit of a raw 2-byte word.
const WORD_STATION: u16 = 0x1000;
/// Magnitude bits of a raw 2-byte word.
const WORD_MAGNITUDE: u16 = 0x0FFF;

/// No-data sentinel byte of the 1-byte composites.
const BYTE_NO_DATA: u8 = 250;
/// Out-of-range sentinel byte of the 1-byte composites.
const BYTE_OUT_OF_RANGE: u8 = 249;

/// A fully decoded product: header plus sample grid.
#[derive(Debug, Clone)]
pub struct DecodedProduct {
    pub header: ProductHeader,
    pub grid: RadarGrid,
}

enum State {
    /// Accumulating header bytes until the terminator appears.
    Header { buf: Vec<u8> },
    /// Splitting payload bytes into raw samples.
    Payload {
        header: ProductHeader,
        sample_width: usize,
        carry: Vec<u8>,
        raw: Vec<u32>,
    },
    Finished,
}

/// Chunk-fed decoder state machine.
pub struct ProductDecoder {
    state: State,
}

impl ProductDecoder {
    pub fn new() -> Self {
        Self {
            state: State::Header { buf: Vec::new() },
        }
    }

    /// Feed the next chunk of the byte stream.
    pub fn push(&mut self, chunk: &[u8]) -> Result<()> {
        match &mut self.state {
            State::Header { buf } => {
                buf.extend_from_slice(chunk);
                let Some(pos) = buf.iter().position(|&b| b == ETX) else {
                    return Ok(());
                };
                // the tag-value block is defined as ASCII; anything else
                // is line noise and must not reach the offset-based
                // field slicing
                if !buf[..pos].is_ascii() {
                    return Err(ParseError::InvalidHeaderField {
                        field: "header",
                        reason: "non-ASCII bytes before terminator".to_string(),
                    });
                }
                let text = String::from_utf8_lossy(&buf[..pos]).into_owned();
                let header = parse_header(&text)?;
                debug!(
                    product = %header.product,
                    timestamp = %header.timestamp,
                    cells = header.sample_count(),
                    "header complete"
                );
                let rest = buf[pos + 1..].to_vec();
                let sample_width = header.product.sample_width();
                self.state = State::Payload {
                    header,
                    sample_width,
                    carry: Vec::new(),
                    raw: Vec::new(),
                };
                if !rest.is_empty() {
                    self.consume_payload(&rest);
                }
                Ok(())
            }
            State::Payload { .. } => {
                self.consume_payload(chunk);
                Ok(())
            }
            State::Finished => Err(ParseError::DecoderFinished),
        }
    }

    /// Finish the stream and produce the decoded product.
    pub fn finish(self) -> Result<DecodedProduct> {
        let State::Payload {
            header,
            sample_width: _,
            carry,
            raw,
        } = self.state
        else {
            return Err(ParseError::MissingTerminator);
        };

        if !carry.is_empty() {
            return Err(ParseError::TrailingBytes(carry.len()));
        }
        if raw.len() != header.sample_count() {
            return Err(ParseError::SampleCountMismatch {
                expected: header.sample_count(),
                actual: raw.len(),
            });
        }

        let grid = transform(&header, raw);
        Ok(DecodedProduct { header, grid })
    }

    fn consume_payload(&mut self, bytes: &[u8]) {
        let State::Payload {
            sample_width,
            carry,
            raw,
            ..
        } = &mut self.state
        else {
            unreachable!("consume_payload outside payload state");
        };

        carry.extend_from_slice(bytes);
        let complete = carry.len() / *sample_width * *sample_width;
        for sample in carry[..complete].chunks_exact(*sample_width) {
            raw.push(match *sample_width {
                1 => sample[0] as u32,
                2 => u16::from_le_bytes([sample[0], sample[1]]) as u32,
                _ => u32::from_le_bytes([sample[0], sample[1], sample[2], sample[3]]),
            });
        }
        carry.drain(..complete);
    }
}

impl Default for ProductDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a complete in-memory byte stream in one call.
pub fn decode_bytes(bytes: &[u8]) -> Result<DecodedProduct> {
    let mut decoder = ProductDecoder::new();
    decoder.push(bytes)?;
    decoder.finish()
}

/// Apply the per-product value transform to the raw samples.
fn transform(header: &ProductHeader, raw: Vec<u32>) -> RadarGrid {
    let factor = header.precision as f32;
    match header.product {
        Product::Hg => RadarGrid::new(GridValues::Category(raw), None, None),
        Product::Wn | Product::Rv => transform_words(header, raw, factor),
        Product::Rx | Product::Wx | Product::Ex => {
            let values = raw
                .into_iter()
                .map(|b| decode_byte(b as u8, factor))
                .collect();
            RadarGrid::new(GridValues::Class(values), None, None)
        }
    }
}

fn transform_words(header: &ProductHeader, raw: Vec<u32>, factor: f32) -> RadarGrid {
    let mut values = Vec::with_capacity(raw.len());
    let mut clutter = Vec::with_capacity(raw.len());
    let mut station = Vec::with_capacity(raw.len());

    for word in raw {
        let word = word as u16;
        clutter.push(word & WORD_CLUTTER != 0);
        station.push(word & WORD_STATION != 0);
        let mut value = decode_word(word, factor);
        if header.product == Product::Wn {
            value = to_dbz(value);
        }
        values.push(value);
    }

    let values = match header.product {
        Product::Wn => GridValues::Dbz(values),
        _ => GridValues::Rate(values),
    };
    // The clutter mark is only defined for the measurement itself,
    // not for forecast lead times.
    let clutter = (header.forecast_minutes == 0).then_some(clutter);
    RadarGrid::new(values, clutter, Some(station))
}

/// Decode a 2-byte sample word: bit 13 marks no-data, bit 14 the sign
/// over the 12-bit magnitude; the result is scaled by the accuracy
/// factor.
fn decode_word(word: u16, factor: f32) -> f32 {
    if word & WORD_ERROR != 0 {
        return NO_DATA;
    }
    let magnitude = (word & WORD_MAGNITUDE) as f32;
    let signed = if word & WORD_SIGN != 0 {
        -magnitude
    } else {
        magnitude
    };
    signed * factor
}

/// RVP6 units to dBZ. Sentinels pass through unchanged.
fn to_dbz(value: f32) -> f32 {
    if value == NO_DATA || value == OUT_OF_RANGE {
        value
    } else {
        0.5 * value - 32.5
    }
}

/// Decode a 1-byte sample: 250 and 249 are reserved, everything else is
/// scaled by the accuracy factor.
fn decode_byte(byte: u8, factor: f32) -> f32 {
    match byte {
        BYTE_NO_DATA => NO_DATA,
        BYTE_OUT_OF_RANGE => OUT_OF_RANGE,
        value => value as f32 * factor,
    }
}
