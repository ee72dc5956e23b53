//! Run-length byte codec used by the software provider
//!
//! Bitstream is a sequence of `(run, value)` byte pairs with `run` in
//! `1..=255`.

use crate::error::{Error, Result};

/// Append the RLE form of `data` to `out`
pub fn encode(data: &[u8], out: &mut Vec<u8>) {
    let mut iter = data.iter().copied();
    let Some(mut current) = iter.next() else {
        return;
    };
    let mut run: u8 = 1;

    for byte in iter {
        if byte == current && run < u8::MAX {
            run += 1;
        } else {
            out.push(run);
            out.push(current);
            current = byte;
            run = 1;
        }
    }
    out.push(run);
    out.push(current);
}

/// Expand an RLE bitstream that must decode to exactly `expected` bytes
pub fn decode(data: &[u8], expected: usize) -> Result<Vec<u8>> {
    if data.len() % 2 != 0 {
        return Err(Error::Codec(format!(
            "RLE stream has odd length {}",
            data.len()
        )));
    }

    let mut out = Vec::with_capacity(expected);
    for pair in data.chunks_exact(2) {
        let (run, value) = (pair[0] as usize, pair[1]);
        if run == 0 {
            return Err(Error::Codec("RLE run of length zero".into()));
        }
        if out.len() + run > expected {
            return Err(Error::Codec(format!(
                "RLE stream expands past {} bytes",
                expected
            )));
        }
        out.resize(out.len() + run, value);
    }

    if out.len() != expected {
        return Err(Error::Codec(format!(
            "RLE stream decoded to {} bytes, expected {}",
            out.len(),
            expected
        )));
    }
    Ok(out)
}
