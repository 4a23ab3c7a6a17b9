//! Radar composite product codes.
//!
//! The product code is carried in the first two header bytes and decides
//! everything about the payload: element width, value transform and
//! whether the product arrives as a single file or a tar set of forecast
//! lead times.

use std::fmt;

use crate::error::{ParseError, Result};

/// Closed set of composite products handled by this parser.
///
/// `PG` is published in BUFR and deliberately not represented here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Product {
    /// Precipitation kind 2 m above ground, 4-byte categorical cells.
    Hg,
    /// Reflectivity composite with forecasts, 2-byte cells, dBZ.
    Wn,
    /// Precipitation rate composite with forecasts, 2-byte cells, mm/h.
    Rv,
    /// Reflectivity classes, 1-byte cells.
    Rx,
    /// Reflectivity classes over the extended domain, 1-byte cells.
    Wx,
    /// Reflectivity classes over the central-Europe domain, 1-byte cells.
    Ex,
}

impl Product {
    /// Look up a product from the two-letter header code.
    pub fn from_code(code: &str) -> Result<Self> {
        match code.to_ascii_uppercase().as_str() {
            "HG" => Ok(Product::Hg),
            "WN" => Ok(Product::Wn),
            "RV" => Ok(Product::Rv),
            "RX" => Ok(Product::Rx),
            "WX" => Ok(Product::Wx),
            "EX" => Ok(Product::Ex),
            other => Err(ParseError::UnknownProduct(other.to_string())),
        }
    }

    /// The two-letter code as it appears on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Product::Hg => "HG",
            Product::Wn => "WN",
            Product::Rv => "RV",
            Product::Rx => "RX",
            Product::Wx => "WX",
            Product::Ex => "EX",
        }
    }

    /// Payload element width in bytes, fixed per product.
    pub fn sample_width(&self) -> usize {
        match self {
            Product::Hg => 4,
            Product::Wn | Product::Rv => 2,
            Product::Rx | Product::Wx | Product::Ex => 1,
        }
    }

    /// Whether the PR accuracy factor applies to decoded samples.
    /// Categorical bit patterns are never scaled.
    pub fn scales_with_precision(&self) -> bool {
        self.sample_width() < 4
    }

    /// Whether the product is published as a tar set of forecast lead times.
    pub fn is_forecast_set(&self) -> bool {
        matches!(self, Product::Wn | Product::Rv)
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip() {
        for p in [
            Product::Hg,
            Product::Wn,
            Product::Rv,
            Product::Rx,
            Product::Wx,
            Product::Ex,
        ] {
            assert_eq!(Product::from_code(p.code()).unwrap(), p);
        }
    }

    #[test]
    fn test_sample_widths() {
        assert_eq!(Product::Hg.sample_width(), 4);
        assert_eq!(Product::Wn.sample_width(), 2);
        assert_eq!(Product::Rv.sample_width(), 2);
        assert_eq!(Product::Rx.sample_width(), 1);
    }

    #[test]
    fn test_unknown_product() {
        assert!(matches!(
            Product::from_code("PG"),
            Err(ParseError::UnknownProduct(_))
        ));
    }

    #[test]
    fn test_precision_scaling_skips_categorical() {
        assert!(!Product::Hg.scales_with_precision());
        assert!(Product::Wn.scales_with_precision());
        assert!(Product::Rx.scales_with_precision());
    }
}
