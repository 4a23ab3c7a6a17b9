//! Decompression and archive handling for downloaded composites.
//!
//! HG is published as a single bzip2 file; WN and RV arrive as bzip2
//! tar sets containing one member per forecast lead time. Decompressor
//! output is fed to the parser in fixed-size chunks, so the chunked
//! header/payload handling of `ProductDecoder` is exercised on every
//! real download.

use std::io::Read;

use bzip2::read::BzDecoder;
use radolan_parser::{DecodedProduct, Product, ProductDecoder};
use tracing::debug;

use crate::error::{AcquireError, Result};

const READ_CHUNK: usize = 4096;

/// File names of the "latest" composites on the DWD open data server.
pub fn latest_url(base: &str, product: Product) -> Result<String> {
    let file = match product {
        Product::Hg => "HG_LATEST_000.bz2",
        Product::Rv => "DE1200_RV_LATEST.tar.bz2",
        Product::Wn => "WN_LATEST.tar.bz2",
        other => return Err(AcquireError::UnsupportedStream(other)),
    };
    Ok(format!(
        "{}/{}/{}",
        base.trim_end_matches('/'),
        product.code().to_ascii_lowercase(),
        file
    ))
}

/// Decode a single bzip2-compressed product.
pub fn decode_bz2(bytes: &[u8]) -> Result<DecodedProduct> {
    let mut reader = BzDecoder::new(bytes);
    decode_reader(&mut reader)
}

/// Decode a bzip2 tar set and return its members ordered by forecast
/// lead time (the measurement itself first).
pub fn decode_tar_bz2(bytes: &[u8]) -> Result<Vec<DecodedProduct>> {
    let reader = BzDecoder::new(bytes);
    let mut archive = tar::Archive::new(reader);

    let mut products = Vec::new();
    let entries = archive
        .entries()
        .map_err(|e| AcquireError::Archive(e.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| AcquireError::Archive(e.to_string()))?;
        let product = decode_reader(&mut entry)?;
        debug!(
            product = %product.header.product,
            lead_minutes = product.header.forecast_minutes,
            "decoded archive member"
        );
        products.push(product);
    }

    products.sort_by_key(|p| p.header.forecast_minutes);
    Ok(products)
}

/// Stream a reader into the chunk-fed product decoder.
fn decode_reader<R: Read>(reader: &mut R) -> Result<DecodedProduct> {
    let mut decoder = ProductDecoder::new();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        decoder.push(&buf[..n])?;
    }
    Ok(decoder.finish()?)
}
