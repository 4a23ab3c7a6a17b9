//! Category tables for the 4-byte precipitation-kind product.
//!
//! The cell value of an HG composite is a bit pattern, not a magnitude.
//! The mapping below is taken verbatim from the DWD format description;
//! it is an externally supplied constant table and must not be inferred
//! or extended from first principles.

use std::fmt;

/// Raw bit pattern meaning "no data available" in an HG cell.
pub const CATEGORY_NO_DATA: u32 = 0x8000_0000;

/// Raw bit pattern meaning "no radar echo" in an HG cell.
pub const CATEGORY_NO_ECHO: u32 = 0;

/// Precipitation kind reported by the HG composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrecipKind {
    NoEcho,
    NoData,
    Unclassified,
    NoPrecipitation,
    Hail,
    Graupel,
    Snow,
    Sleet,
    FreezingRain,
    Rain,
    FreezingDrizzle,
    Drizzle,
}

impl PrecipKind {
    /// Look up a kind from the raw 32-bit cell pattern.
    ///
    /// Patterns outside the published table yield `None`.
    pub fn from_raw(raw: u32) -> Option<PrecipKind> {
        match raw {
            CATEGORY_NO_ECHO => Some(PrecipKind::NoEcho),
            CATEGORY_NO_DATA => Some(PrecipKind::NoData),
            1 => Some(PrecipKind::Unclassified),
            16_777_216 => Some(PrecipKind::NoPrecipitation),
            8192 => Some(PrecipKind::Hail),
            4096 => Some(PrecipKind::Graupel),
            64 => Some(PrecipKind::Snow),
            80 => Some(PrecipKind::Sleet),
            20 => Some(PrecipKind::FreezingRain),
            16 => Some(PrecipKind::Rain),
            12 => Some(PrecipKind::FreezingDrizzle),
            8 => Some(PrecipKind::Drizzle),
            _ => None,
        }
    }

    /// The raw wire pattern for this kind.
    pub fn raw(&self) -> u32 {
        match self {
            PrecipKind::NoEcho => CATEGORY_NO_ECHO,
            PrecipKind::NoData => CATEGORY_NO_DATA,
            PrecipKind::Unclassified => 1,
            PrecipKind::NoPrecipitation => 16_777_216,
            PrecipKind::Hail => 8192,
            PrecipKind::Graupel => 4096,
            PrecipKind::Snow => 64,
            PrecipKind::Sleet => 80,
            PrecipKind::FreezingRain => 20,
            PrecipKind::Rain => 16,
            PrecipKind::FreezingDrizzle => 12,
            PrecipKind::Drizzle => 8,
        }
    }

    /// WMO present-weather (wawa) code for this kind.
    ///
    /// "No echo" and "no data" carry no weather statement and map to `None`.
    pub fn wawa(&self) -> Option<u8> {
        match self {
            PrecipKind::NoEcho | PrecipKind::NoData => None,
            PrecipKind::Unclassified => Some(40),
            PrecipKind::NoPrecipitation => Some(0),
            PrecipKind::Hail => Some(89),
            PrecipKind::Graupel => Some(74),
            PrecipKind::Snow => Some(70),
            PrecipKind::Sleet => Some(67),
            PrecipKind::FreezingRain => Some(64),
            PrecipKind::Rain => Some(60),
            PrecipKind::FreezingDrizzle => Some(54),
            PrecipKind::Drizzle => Some(50),
        }
    }

    /// Human-readable description, used in log output.
    pub fn description(&self) -> &'static str {
        match self {
            PrecipKind::NoEcho => "no echo",
            PrecipKind::NoData => "no data",
            PrecipKind::Unclassified => "precipitation of unknown kind",
            PrecipKind::NoPrecipitation => "no precipitation",
            PrecipKind::Hail => "hail",
            PrecipKind::Graupel => "graupel",
            PrecipKind::Snow => "snow",
            PrecipKind::Sleet => "sleet",
            PrecipKind::FreezingRain => "freezing rain",
            PrecipKind::Rain => "rain",
            PrecipKind::FreezingDrizzle => "freezing drizzle",
            PrecipKind::Drizzle => "drizzle",
        }
    }
}

impl fmt::Display for PrecipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_round_trip() {
        for kind in [
            PrecipKind::NoEcho,
            PrecipKind::NoData,
            PrecipKind::Unclassified,
            PrecipKind::NoPrecipitation,
            PrecipKind::Hail,
            PrecipKind::Graupel,
            PrecipKind::Snow,
            PrecipKind::Sleet,
            PrecipKind::FreezingRain,
            PrecipKind::Rain,
            PrecipKind::FreezingDrizzle,
            PrecipKind::Drizzle,
        ] {
            assert_eq!(PrecipKind::from_raw(kind.raw()), Some(kind));
        }
    }

    #[test]
    fn test_rain_wawa_is_60() {
        assert_eq!(PrecipKind::Rain.wawa(), Some(60));
    }

    #[test]
    fn test_no_data_has_no_wawa() {
        assert_eq!(PrecipKind::NoData.wawa(), None);
        assert_eq!(PrecipKind::NoEcho.wawa(), None);
    }

    #[test]
    fn test_unknown_pattern_is_none() {
        assert_eq!(PrecipKind::from_raw(0xDEAD_BEEF), None);
        assert_eq!(PrecipKind::from_raw(3), None);
    }
}
