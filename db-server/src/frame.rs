//! Length-prefixed framing shared by both directions of the wire protocol
//! (spec §6): `u64` little-endian length followed by that many payload
//! bytes.

use db_kernel::error::IoError;
use std::io::{Read, Write};

pub fn write_frame<W: Write>(w: &mut W, payload: &[u8]) -> Result<(), IoError> {
    w.write_all(&(payload.len() as u64).to_le_bytes())?;
    w.write_all(payload)?;
    Ok(())
}

pub fn read_frame<R: Read>(r: &mut R) -> Result<Vec<u8>, IoError> {
    let mut len_buf = [0u8; 8];
    r.read_exact(&mut len_buf)?;
    let len = u64::from_le_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)?;
    Ok(payload)
}

/// Same as [`read_frame`] but returns `Ok(None)` on a clean EOF before any
/// byte of the length prefix is read, distinguishing "client hung up" from
/// a malformed frame truncated mid-payload.
pub fn read_frame_or_eof<R: Read>(r: &mut R) -> Result<Option<Vec<u8>>, IoError> {
    let mut len_buf = [0u8; 8];
    match r.read(&mut len_buf) {
        Ok(0) => return Ok(None),
        Ok(n) if n < 8 => {
            r.read_exact(&mut len_buf[n..])?;
        }
        Ok(_) => {}
        Err(e) => return Err(e.into()),
    }
    let len = u64::from_le_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)?;
    Ok(Some(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_frame() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").unwrap();
        let mut cursor = buf.as_slice();
        let payload = read_frame(&mut cursor).unwrap();
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn eof_before_any_byte_is_none() {
        let mut cursor: &[u8] = &[];
        assert!(read_frame_or_eof(&mut cursor).unwrap().is_none());
    }
}
