//! ASCII header parsing for radar composite products.
//!
//! The header is a run of ASCII text terminated by a single ETX byte.
//! It starts with a fixed-layout block (product code, issue time, WMO
//! number) followed by tag-value pairs. Each tag has a fixed value
//! width, except `MS` whose three-digit value is the length of a
//! trailing free-text block.

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{ParseError, Result};
use crate::product::Product;

/// Fixed prefix: code (2) + DD hh mm (6) + WMO (5) + MM YY (4).
const FIXED_LEN: usize = 17;

/// Known header tags with their value widths.
const HEADER_FIELDS: &[(&str, usize)] = &[
    ("BY", 10), // product length in bytes
    ("VS", 2),  // format version
    ("SW", 9),  // software version
    ("PR", 5),  // data accuracy, e.g. " E-02"
    ("INT", 4), // interval duration in minutes
    ("GP", 9),  // grid size, height x width
    ("VV", 4),  // forecast lead time in minutes
    ("MF", 9),  // module flags
    ("MS", 3),  // length prefix of the free-text trailer
];

/// Decoded product header.
#[derive(Debug, Clone)]
pub struct ProductHeader {
    pub product: Product,
    /// Issue time, UTC, minute resolution.
    pub timestamp: DateTime<Utc>,
    /// WMO originator number; 10000 for composite products.
    pub wmo_number: String,
    /// Format version (VS field).
    pub version: Option<u16>,
    /// Grid width in cells (second half of GP).
    pub width: usize,
    /// Grid height in cells (first half of GP).
    pub height: usize,
    /// Interval duration in minutes (INT field).
    pub interval_minutes: u32,
    /// Forecast lead time in minutes after measurement (VV field).
    pub forecast_minutes: u32,
    /// Accuracy factor derived from the PR field (power of ten).
    pub precision: f64,
    /// Declared product length in bytes (BY field).
    pub length_bytes: Option<u64>,
    /// Producing software version (SW field).
    pub software: Option<String>,
    /// Module flags (MF field).
    pub module_flags: Option<u64>,
    /// Raw free-text trailer (MS block).
    pub trailer: Option<String>,
}

impl ProductHeader {
    /// Number of cells the payload must carry.
    pub fn sample_count(&self) -> usize {
        self.width * self.height
    }

    /// Valid time of the data: issue time plus the forecast lead time.
    pub fn valid_time(&self) -> DateTime<Utc> {
        self.timestamp + chrono::Duration::minutes(self.forecast_minutes as i64)
    }
}

/// Parse the accumulated header text (everything before the ETX byte).
pub fn parse_header(text: &str) -> Result<ProductHeader> {
    if text.len() < FIXED_LEN {
        return Err(ParseError::TruncatedHeader {
            need: FIXED_LEN,
            got: text.len(),
        });
    }

    let product = Product::from_code(&text[0..2])?;
    let timestamp = parse_timestamp(text)?;
    let wmo_number = text[8..13].to_string();

    let mut header = ProductHeader {
        product,
        timestamp,
        wmo_number,
        version: None,
        // DE1200 dimensions, used when the GP field is absent
        width: 1100,
        height: 1200,
        interval_minutes: 5,
        forecast_minutes: 0,
        precision: 1.0,
        length_bytes: None,
        software: None,
        module_flags: None,
        trailer: None,
    };

    parse_fields(&text[FIXED_LEN..], &mut header)?;
    Ok(header)
}

/// Issue time from the fixed header block: DD hh mm at 2..8, MM YY at 13..17.
fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    let num = |range: std::ops::Range<usize>| -> Result<u32> {
        text[range.clone()]
            .trim()
            .parse::<u32>()
            .map_err(|_| ParseError::InvalidTimestamp(text[range].to_string()))
    };
    let day = num(2..4)?;
    let hour = num(4..6)?;
    let minute = num(6..8)?;
    let month = num(13..15)?;
    let year = 2000 + num(15..17)? as i32;

    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .ok_or_else(|| {
            ParseError::InvalidTimestamp(format!(
                "{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}Z"
            ))
        })
}

/// Walk the tag-value block, accumulating tag characters until a known
/// tag matches, then consuming its fixed-width value.
fn parse_fields(block: &str, header: &mut ProductHeader) -> Result<()> {
    let mut chars = block.chars();
    let mut tag = String::new();

    while let Some(c) = chars.next() {
        tag.push(c);
        let Some(&(name, width)) = HEADER_FIELDS.iter().find(|(n, _)| *n == tag) else {
            if tag.len() > 3 {
                return Err(ParseError::InvalidHeaderField {
                    field: "tag",
                    reason: format!("unrecognized header tag {tag:?}"),
                });
            }
            continue;
        };

        let value = take(&mut chars, width, name)?;
        apply_field(name, &value, header, &mut chars)?;
        tag.clear();
    }

    if !tag.is_empty() {
        return Err(ParseError::InvalidHeaderField {
            field: "tag",
            reason: format!("dangling header bytes {tag:?}"),
        });
    }
    Ok(())
}

fn take(
    chars: &mut std::str::Chars<'_>,
    width: usize,
    field: &'static str,
) -> Result<String> {
    let value: String = chars.by_ref().take(width).collect();
    if value.len() < width {
        return Err(ParseError::InvalidHeaderField {
            field,
            reason: format!("value truncated, expected {width} characters"),
        });
    }
    Ok(value)
}

fn apply_field(
    name: &'static str,
    value: &str,
    header: &mut ProductHeader,
    chars: &mut std::str::Chars<'_>,
) -> Result<()> {
    let int_value = |field: &'static str, v: &str| -> Result<i64> {
        v.trim().parse::<i64>().map_err(|_| ParseError::InvalidHeaderField {
            field,
            reason: format!("not an integer: {v:?}"),
        })
    };

    match name {
        "BY" => header.length_bytes = Some(int_value(name, value)? as u64),
        "VS" => header.version = Some(int_value(name, value)? as u16),
        "SW" => header.software = Some(value.trim().to_string()),
        "PR" => header.precision = parse_precision(value)?,
        "INT" => header.interval_minutes = int_value(name, value)? as u32,
        "GP" => {
            let (height, width) = parse_grid_size(value)?;
            header.height = height;
            header.width = width;
        }
        "VV" => header.forecast_minutes = int_value(name, value)?.max(0) as u32,
        "MF" => header.module_flags = Some(int_value(name, value)? as u64),
        "MS" => {
            // The three-digit value is the length of the free-text block.
            let trimmed = value.trim();
            if trimmed.chars().all(|c| c.is_ascii_digit()) && !trimmed.is_empty() {
                let len: usize = trimmed.parse().unwrap_or(0);
                header.trailer = Some(take(chars, len, "MS")?);
            } else {
                header.trailer = Some(value.to_string());
            }
        }
        _ => unreachable!("tag outside HEADER_FIELDS"),
    }
    Ok(())
}

/// Accuracy factor, e.g. `" E-02"` means 10^-2.
fn parse_precision(value: &str) -> Result<f64> {
    let trimmed = value.trim().trim_start_matches('+');
    let exponent = trimmed
        .strip_prefix('E')
        .and_then(|rest| rest.trim().parse::<i32>().ok())
        .ok_or_else(|| ParseError::InvalidHeaderField {
            field: "PR",
            reason: format!("expected E[-]digits, got {value:?}"),
        })?;
    Ok(10f64.powi(exponent))
}

/// Grid dimensions, e.g. `"1200x1100"`: height first, then width.
fn parse_grid_size(value: &str) -> Result<(usize, usize)> {
    let err = |reason: String| ParseError::InvalidHeaderField { field: "GP", reason };
    let (h, w) = value
        .split_once('x')
        .ok_or_else(|| err(format!("missing 'x' separator in {value:?}")))?;
    let height = h
        .trim()
        .parse::<usize>()
        .map_err(|_| err(format!("bad height {h:?}")))?;
    let width = w
        .trim()
        .parse::<usize>()
        .map_err(|_| err(format!("bad width {w:?}")))?;
    if height == 0 || width == 0 {
        return Err(err("zero-sized grid".to_string()));
    }
    Ok((height, width))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> String {
        // HG composite issued 2024-01-01T00:00Z by station 10000
        let mut h = String::from("HG010000100000124");
        h.push_str("BY0005280090"); // BY + 10 digits
        h.push_str("VS 5");
        h.push_str("SW   2.34.0");
        h.push_str("PR E-00");
        h.push_str("INT   5");
        h.push_str("GP1200x1100");
        h.push_str("MS");
        h.push_str("011<boo radar>");
        h
    }

    #[test]
    fn test_fixed_block() {
        let header = parse_header(&sample_header()).unwrap();
        assert_eq!(header.product, Product::Hg);
        assert_eq!(header.wmo_number, "10000");
        assert_eq!(
            header.timestamp,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_tagged_fields() {
        let header = parse_header(&sample_header()).unwrap();
        assert_eq!(header.version, Some(5));
        assert_eq!(header.length_bytes, Some(5_280_090));
        assert_eq!(header.software.as_deref(), Some("2.34.0"));
        assert_eq!(header.interval_minutes, 5);
        assert_eq!(header.height, 1200);
        assert_eq!(header.width, 1100);
        assert_eq!(header.precision, 1.0);
        assert_eq!(header.trailer.as_deref(), Some("<boo radar>"));
    }

    #[test]
    fn test_precision_exponent() {
        assert_eq!(parse_precision(" E-02").unwrap(), 0.01);
        assert_eq!(parse_precision(" E-01").unwrap(), 0.1);
        assert_eq!(parse_precision(" E-00").unwrap(), 1.0);
        assert!(parse_precision("XX-02").is_err());
    }

    #[test]
    fn test_grid_size_height_first() {
        assert_eq!(parse_grid_size("1200x1100").unwrap(), (1200, 1100));
        assert_eq!(parse_grid_size(" 010x 010").unwrap(), (10, 10));
        assert!(parse_grid_size("12001100").is_err());
    }

    #[test]
    fn test_forecast_lead_time() {
        let mut text = String::from("RV010000100000124");
        text.push_str("VS 5");
        text.push_str("GP1200x1100");
        text.push_str("VV 115");
        let header = parse_header(&text).unwrap();
        assert_eq!(header.product, Product::Rv);
        assert_eq!(header.forecast_minutes, 115);
        assert_eq!(
            header.valid_time(),
            Utc.with_ymd_and_hms(2024, 1, 1, 1, 55, 0).unwrap()
        );
    }

    #[test]
    fn test_truncated_header() {
        assert!(matches!(
            parse_header("HG0100"),
            Err(ParseError::TruncatedHeader { .. })
        ));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let mut text = String::from("HG010000100000124");
        text.push_str("QQQQ12345");
        assert!(parse_header(&text).is_err());
    }
}
