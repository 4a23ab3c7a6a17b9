//! Composite grid geometry and coordinate indexing.
//!
//! The DE1200 composite lives in a polar stereographic projection whose
//! parameters are fixed, externally published constants. The frame is
//! described by four named corner anchors, each given in projected
//! meters and geographic degrees. All location lookups happen in the
//! projected space; geographic coordinates are carried for reference
//! only.

use thiserror::Error;

use crate::header::ProductHeader;

/// Proj string of the DE1200 WGS84 stereographic reference frame.
pub const PROJ_DE1200_WGS84: &str = "+proj=stere +lat_0=90 +lat_ts=60 +lon_0=10 +a=6378137 \
     +b=6356752.3142451802 +no_defs +x_0=543196.83521776402 +y_0=3622588.8619310018";

/// Cell size of the composite grids in meters.
pub const CELL_SIZE_M: f64 = 1000.0;

/// A corner anchor: projected (easting, northing) plus geographic (lat, lon).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub easting: f64,
    pub northing: f64,
    pub lat: f64,
    pub lon: f64,
}

/// The four named corner anchors of a composite frame.
#[derive(Debug, Clone, Copy)]
pub struct CompositeFrame {
    pub nw: Anchor,
    pub no: Anchor,
    pub so: Anchor,
    pub sw: Anchor,
}

/// Corner anchors of the 1200x1100 DE1200 WGS84 frame (HG, WN, RV).
pub const DE1200_WGS84: CompositeFrame = CompositeFrame {
    nw: Anchor {
        easting: -500.0,
        northing: 500.0,
        lat: 55.86208711,
        lon: 1.463301510,
    },
    no: Anchor {
        easting: 1_099_500.0,
        northing: 500.0,
        lat: 55.84543856,
        lon: 18.73161645,
    },
    so: Anchor {
        easting: 1_099_500.0,
        northing: -1_199_500.0,
        lat: 45.68460578,
        lon: 16.58086935,
    },
    sw: Anchor {
        easting: -500.0,
        northing: -1_199_500.0,
        lat: 45.69642538,
        lon: 3.566994635,
    },
};

/// Coordinate lookup failure: a configuration mistake, never retried.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexError {
    #[error("easting outside grid coverage")]
    EastingOutOfRange,
    #[error("northing outside grid coverage")]
    NorthingOutOfRange,
}

/// Grid geometry: southwest origin plus cell counts.
///
/// Samples are stored row-major starting at the southwest corner, so
/// the flat index uses the row measured from the south edge directly.
#[derive(Debug, Clone, Copy)]
pub struct GridGeometry {
    origin_easting: f64,
    origin_northing: f64,
    width: usize,
    height: usize,
}

impl GridGeometry {
    pub fn new(frame: &CompositeFrame, width: usize, height: usize) -> Self {
        Self {
            origin_easting: frame.sw.easting,
            origin_northing: frame.sw.northing,
            width,
            height,
        }
    }

    /// Geometry for a decoded product header over the given frame.
    pub fn for_header(frame: &CompositeFrame, header: &ProductHeader) -> Self {
        Self::new(frame, header.width, header.height)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Flat sample index for a projected point.
    ///
    /// A coordinate that lands exactly on the upper boundary is pulled
    /// inward by a fraction of a cell (boundary-inclusive semantics).
    pub fn index(&self, easting: f64, northing: f64) -> Result<usize, IndexError> {
        let mut cx = (easting - self.origin_easting) / CELL_SIZE_M;
        let mut cy = (northing - self.origin_northing) / CELL_SIZE_M;

        if cx < 0.0 || cx > self.width as f64 {
            return Err(IndexError::EastingOutOfRange);
        }
        if cy < 0.0 || cy > self.height as f64 {
            return Err(IndexError::NorthingOutOfRange);
        }
        if cx == self.width as f64 {
            cx -= 0.1;
        }
        if cy == self.height as f64 {
            cy -= 0.1;
        }

        Ok(cy as usize * self.width + cx as usize)
    }
}
