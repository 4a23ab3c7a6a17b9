//! Parser for binary radar composite products published by the German
//! Weather Service (DWD) on its open data server.
//!
//! Supported products:
//! - `HG`: precipitation kind 2 m above ground (4-byte categorical cells)
//! - `WN`: radar reflectivity in dBZ (2-byte cells)
//! - `RV`: precipitation rate (2-byte cells)
//! - `RX`/`WX`/`EX`: reflectivity classes (1-byte cells)
//!
//! Every product starts with an ASCII tag-value header terminated by a
//! single ETX byte (0x03), followed by a little-endian sample payload
//! whose element width depends solely on the product code. The official
//! format descriptions (in German) are published by the DWD alongside
//! the data.

pub mod composite;
pub mod decode;
pub mod error;
pub mod grid;
pub mod header;
pub mod product;
pub mod tables;

pub use composite::{CompositeFrame, GridGeometry, IndexError, DE1200_WGS84};
pub use decode::{decode_bytes, DecodedProduct, ProductDecoder, NO_DATA, OUT_OF_RANGE};
pub use error::{ParseError, Result};
pub use grid::{GridValues, RadarGrid};
pub use header::ProductHeader;
pub use product::Product;
pub use tables::PrecipKind;
