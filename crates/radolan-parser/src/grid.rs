//! Decoded sample grids.
//!
//! A `RadarGrid` is an immutable, row-major sequence of decoded cells
//! starting at the grid's southwest corner. Accessors return `None` for
//! sentinel cells and for queries against the wrong product kind: a
//! missing echo is never reported as a zero reading.

use crate::decode::{NO_DATA, OUT_OF_RANGE};
use crate::tables::PrecipKind;

/// Decoded cell values, one variant per payload encoding.
#[derive(Debug, Clone)]
pub enum GridValues {
    /// Raw 4-byte categorical bit patterns (HG).
    Category(Vec<u32>),
    /// Reflectivity in dBZ (WN); sentinel cells hold [`NO_DATA`].
    Dbz(Vec<f32>),
    /// Precipitation rate in mm/h (RV); sentinel cells hold [`NO_DATA`].
    Rate(Vec<f32>),
    /// Scaled reflectivity classes (RX/WX/EX byte composites).
    Class(Vec<f32>),
}

impl GridValues {
    pub fn len(&self) -> usize {
        match self {
            GridValues::Category(v) => v.len(),
            GridValues::Dbz(v) | GridValues::Rate(v) | GridValues::Class(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An immutable grid of decoded samples with optional per-cell masks.
#[derive(Debug, Clone)]
pub struct RadarGrid {
    values: GridValues,
    /// Clutter mask (2-byte products, "now" record only).
    clutter: Option<Vec<bool>>,
    /// Station-interpolation mask (2-byte products).
    station: Option<Vec<bool>>,
}

impl RadarGrid {
    pub(crate) fn new(
        values: GridValues,
        clutter: Option<Vec<bool>>,
        station: Option<Vec<bool>>,
    ) -> Self {
        Self {
            values,
            clutter,
            station,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &GridValues {
        &self.values
    }

    /// Raw categorical bit pattern of a cell, HG only.
    pub fn raw_category(&self, index: usize) -> Option<u32> {
        match &self.values {
            GridValues::Category(v) => v.get(index).copied(),
            _ => None,
        }
    }

    /// Precipitation kind of a cell, HG only.
    ///
    /// Bit patterns outside the published table yield `None`.
    pub fn category(&self, index: usize) -> Option<PrecipKind> {
        self.raw_category(index).and_then(PrecipKind::from_raw)
    }

    /// WMO present-weather code of a cell, HG only.
    pub fn wawa(&self, index: usize) -> Option<u8> {
        self.category(index).and_then(|kind| kind.wawa())
    }

    /// Reflectivity of a cell in dBZ, WN only. Sentinel cells are `None`.
    pub fn dbz(&self, index: usize) -> Option<f32> {
        match &self.values {
            GridValues::Dbz(v) => v.get(index).copied().filter(|x| !is_sentinel(*x)),
            _ => None,
        }
    }

    /// Precipitation rate of a cell in mm/h, RV only. Sentinel cells are `None`.
    pub fn rain_rate(&self, index: usize) -> Option<f32> {
        match &self.values {
            GridValues::Rate(v) => v.get(index).copied().filter(|x| !is_sentinel(*x)),
            _ => None,
        }
    }

    /// Scaled class value of a cell, byte composites only.
    pub fn class_value(&self, index: usize) -> Option<f32> {
        match &self.values {
            GridValues::Class(v) => v.get(index).copied().filter(|x| !is_sentinel(*x)),
            _ => None,
        }
    }

    /// Clutter flag of a cell, when the product carries the mask.
    pub fn clutter(&self, index: usize) -> Option<bool> {
        self.clutter.as_ref().and_then(|m| m.get(index).copied())
    }

    /// Station-interpolation flag of a cell, when the product carries the mask.
    pub fn station(&self, index: usize) -> Option<bool> {
        self.station.as_ref().and_then(|m| m.get(index).copied())
    }
}

fn is_sentinel(x: f32) -> bool {
    x == NO_DATA || x == OUT_OF_RANGE
}
