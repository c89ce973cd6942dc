//! Length-prefixed framing and in-frame padding for the bridge session.
//!
//! Wire frame: `len (u16 BE) || ciphertext`. The plaintext inside each
//! ciphertext is `payload_len (u16 BE) || payload || padding`, so frame sizes
//! on the wire do not reveal payload sizes.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use rand::{Rng, RngCore};
use smc_crypto::session_crypto::AEAD_TAG_LEN;
use thiserror::Error;

/// Largest application payload carried in one frame (16 KiB)
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024;

/// Largest random padding appended inside one frame
pub const MAX_PADDING_LEN: usize = 255;

/// Largest ciphertext that can follow a length prefix
pub const MAX_WIRE_FRAME_LEN: usize = 2 + MAX_PAYLOAD_LEN + MAX_PADDING_LEN + AEAD_TAG_LEN;

const LEN_PREFIX: usize = 2;

/// Framing error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    #[error("Frame too large: {0} bytes (max: {1})")]
    TooLarge(usize, usize),

    #[error("Incomplete frame: need {0} more bytes")]
    Incomplete(usize),

    #[error("Invalid frame format")]
    InvalidFormat,
}

/// Length-prefixed frame codec
pub struct LengthCodec {
    max_frame_size: usize,
}

impl LengthCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size: max_frame_size.min(u16::MAX as usize),
        }
    }

    /// Codec sized for encrypted session frames
    pub fn session() -> Self {
        Self::new(MAX_WIRE_FRAME_LEN)
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Encode data with length prefix
    /// Format: length (2 bytes BE) || data
    pub fn encode(&self, data: &[u8]) -> Result<Vec<u8>, FramingError> {
        if data.len() > self.max_frame_size {
            return Err(FramingError::TooLarge(data.len(), self.max_frame_size));
        }

        let mut encoded = Vec::with_capacity(LEN_PREFIX + data.len());
        encoded.put_u16(data.len() as u16);
        encoded.extend_from_slice(data);
        Ok(encoded)
    }

    /// Check a length prefix read off the wire.
    pub fn check_len(&self, len: usize) -> Result<usize, FramingError> {
        if len > self.max_frame_size {
            return Err(FramingError::TooLarge(len, self.max_frame_size));
        }
        Ok(len)
    }

    /// Streaming decoder for partial reads.
    /// Returns `Some(frame)` once a complete frame is buffered.
    pub fn decode_stream(&self, buf: &mut BytesMut) -> Result<Option<Bytes>, FramingError> {
        if buf.len() < LEN_PREFIX {
            return Ok(None);
        }

        let len = {
            let mut len_buf = &buf[..LEN_PREFIX];
            len_buf.get_u16() as usize
        };
        self.check_len(len)?;

        if buf.len() < LEN_PREFIX + len {
            return Ok(None);
        }

        buf.advance(LEN_PREFIX);
        Ok(Some(buf.split_to(len).freeze()))
    }
}

/// Wrap `payload` as `payload_len || payload || padding` with random padding.
pub fn pad_payload<R: RngCore>(payload: &[u8], rng: &mut R) -> Result<Vec<u8>, FramingError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(FramingError::TooLarge(payload.len(), MAX_PAYLOAD_LEN));
    }

    let pad_len = rng.gen_range(0..=MAX_PADDING_LEN);
    let mut out = Vec::with_capacity(LEN_PREFIX + payload.len() + pad_len);
    out.put_u16(payload.len() as u16);
    out.extend_from_slice(payload);

    let start = out.len();
    out.resize(start + pad_len, 0);
    rng.fill_bytes(&mut out[start..]);
    Ok(out)
}

/// Strip the length header and padding from a decrypted frame.
pub fn unpad_payload(plaintext: &[u8]) -> Result<&[u8], FramingError> {
    if plaintext.len() < LEN_PREFIX {
        return Err(FramingError::Incomplete(LEN_PREFIX - plaintext.len()));
    }
    let mut header = &plaintext[..LEN_PREFIX];
    let len = header.get_u16() as usize;

    if len > MAX_PAYLOAD_LEN {
        return Err(FramingError::TooLarge(len, MAX_PAYLOAD_LEN));
    }
    let body = &plaintext[LEN_PREFIX..];
    if body.len() < len {
        return Err(FramingError::InvalidFormat);
    }
    Ok(&body[..len])
}
