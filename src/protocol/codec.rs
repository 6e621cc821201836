//! The frame pipeline: AES/CFB8 encryption around the raw byte stream,
//! varint length framing inside it, and optional zlib compression of
//! each frame body.

use crate::protocol::{ConnectionState, DecodeError, Decoder, Encoder, ProtocolVersion};
use aes::{cipher::generic_array::GenericArray, Aes128};
use bytes::{Buf, Bytes, BytesMut};
use cfb8::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use flate2::Compression;
use std::{
    io::{self, Read, Write},
    slice,
};

/// Largest frame accepted or produced: a three byte varint.
pub const MAX_FRAME_LENGTH: usize = (1 << 21) - 1;

/// Largest accepted declared size of a compressed frame body.
pub const MAX_UNCOMPRESSED_LENGTH: usize = 8 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame length prefix is longer than three bytes")]
    BadLengthPrefix,
    #[error("frame of {0} bytes exceeds the maximum")]
    FrameTooLarge(usize),
    #[error("declared uncompressed size {declared} is below the threshold {threshold}")]
    BelowThreshold { declared: usize, threshold: usize },
    #[error("declared uncompressed size {0} exceeds the maximum")]
    UncompressedTooLarge(usize),
    #[error("inflated {actual} bytes but {declared} were declared")]
    SizeMismatch { declared: usize, actual: usize },
    #[error("failed to inflate frame: {0}")]
    Inflate(#[source] io::Error),
    #[error("failed to deflate frame: {0}")]
    Deflate(#[source] io::Error),
    #[error("encryption is already enabled")]
    EncryptionAlreadyEnabled,
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

pub type Result<T, E = FrameError> = std::result::Result<T, E>;

/// Key used for encryption. It doubles as the IV.
#[derive(Copy, Clone, Debug)]
pub struct EncryptionKey([u8; 16]);

impl EncryptionKey {
    pub fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

/// Compression settings as sent in SetCompression.
#[derive(Copy, Clone, Debug)]
pub struct CompressionSettings {
    pub threshold: usize,
    pub level: Compression,
}

struct EncryptionState {
    encryptor: cfb8::Encryptor<Aes128>,
    decryptor: cfb8::Decryptor<Aes128>,
}

/// Codec state of one connection.
///
/// Settings changed between two frames apply from the next frame on.
#[derive(Default)]
pub struct FrameCodec {
    /// Buffered incoming bytes, already decrypted.
    read_buffer: BytesMut,
    encryption_state: Option<EncryptionState>,
    compression: Option<CompressionSettings>,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption_state.is_some()
    }

    pub fn compression(&self) -> Option<CompressionSettings> {
        self.compression
    }

    /// Turns on encryption for the rest of the connection.
    ///
    /// Bytes already buffered but not yet framed arrived after the frame
    /// that triggered this call, so they are decrypted in place.
    pub fn enable_encryption(&mut self, key: EncryptionKey) -> Result<()> {
        if self.encryption_state.is_some() {
            return Err(FrameError::EncryptionAlreadyEnabled);
        }
        let mut state = EncryptionState {
            encryptor: cfb8::Encryptor::new(&key.0.into(), &key.0.into()),
            decryptor: cfb8::Decryptor::new(&key.0.into(), &key.0.into()),
        };
        for byte in self.read_buffer.iter_mut() {
            let slice = slice::from_mut(byte);
            state
                .decryptor
                .decrypt_block_mut(GenericArray::from_mut_slice(slice));
        }
        self.encryption_state = Some(state);
        Ok(())
    }

    /// Sets or clears compression. `None` disables it.
    pub fn set_compression(&mut self, compression: Option<CompressionSettings>) {
        self.compression = compression;
    }

    /// Frames a packet body (id and payload), compressing and
    /// encrypting it as configured.
    pub fn encode_frame(&mut self, body: &[u8]) -> Result<Bytes> {
        let mut buf = Vec::with_capacity(body.len() + 8);
        let mut encoder = Encoder::new(&mut buf, ProtocolVersion::MAXIMUM, ConnectionState::Play);

        match &self.compression {
            Some(CompressionSettings { threshold, level }) if body.len() >= *threshold => {
                let mut deflater = flate2::write::ZlibEncoder::new(Vec::new(), *level);
                deflater.write_all(body).map_err(FrameError::Deflate)?;
                let compressed = deflater.finish().map_err(FrameError::Deflate)?;
                let data_length = i32::try_from(body.len())
                    .map_err(|_| FrameError::FrameTooLarge(body.len()))?;
                let frame_length = var_int_size(data_length) + compressed.len();
                if frame_length > MAX_FRAME_LENGTH {
                    return Err(FrameError::FrameTooLarge(frame_length));
                }
                encoder.write_length(frame_length);
                encoder.write_var_int(data_length);
                encoder.write_slice(&compressed);
            }
            Some(_) => {
                if body.len() + 1 > MAX_FRAME_LENGTH {
                    return Err(FrameError::FrameTooLarge(body.len() + 1));
                }
                encoder.write_length(body.len() + 1);
                encoder.write_var_int(0);
                encoder.write_slice(body);
            }
            None => {
                if body.len() > MAX_FRAME_LENGTH {
                    return Err(FrameError::FrameTooLarge(body.len()));
                }
                encoder.write_length(body.len());
                encoder.write_slice(body);
            }
        }

        if let Some(EncryptionState { encryptor, .. }) = &mut self.encryption_state {
            for byte in &mut buf {
                let slice = slice::from_mut(byte);
                encryptor.encrypt_block_mut(GenericArray::from_mut_slice(slice));
            }
        }

        Ok(Bytes::from(buf))
    }

    /// Gives data to the internal read buffer.
    ///
    /// Call [`FrameCodec::next_frame`] to get frames.
    pub fn give_data(&mut self, data: &[u8]) {
        let start = self.read_buffer.len();
        self.read_buffer.extend_from_slice(data);
        if let Some(EncryptionState { decryptor, .. }) = &mut self.encryption_state {
            for byte in &mut self.read_buffer[start..] {
                let slice = slice::from_mut(byte);
                decryptor.decrypt_block_mut(GenericArray::from_mut_slice(slice));
            }
        }
    }

    /// Attempts to take one frame body out of the read buffer.
    ///
    /// * If not enough data is available, returns `Ok(None)`.
    /// * If a frame was read, returns `Ok(Some(body))`. More frames may be available.
    /// * If an error occurs, the stream can no longer be trusted.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            let Some((length, prefix)) = self.peek_length()? else {
                return Ok(None);
            };
            if self.read_buffer.len() < prefix + length {
                self.read_buffer.reserve(prefix + length - self.read_buffer.len());
                return Ok(None);
            }
            self.read_buffer.advance(prefix);
            let frame = self.read_buffer.split_to(length).freeze();
            if length == 0 {
                continue;
            }
            return self.decompress(frame).map(Some);
        }
    }

    fn peek_length(&self) -> Result<Option<(usize, usize)>> {
        let mut length = 0usize;
        for (i, byte) in self.read_buffer.iter().take(3).enumerate() {
            length |= usize::from(byte & 0x7F) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(Some((length, i + 1)));
            }
        }
        if self.read_buffer.len() >= 3 {
            Err(FrameError::BadLengthPrefix)
        } else {
            Ok(None)
        }
    }

    fn decompress(&self, frame: Bytes) -> Result<Bytes> {
        let Some(CompressionSettings { threshold, .. }) = self.compression else {
            return Ok(frame);
        };
        let mut decoder =
            Decoder::from_bytes(&frame, ProtocolVersion::MAXIMUM, ConnectionState::Play);
        let declared = decoder.read_length()?;
        if declared == 0 {
            return Ok(decoder.read_remaining());
        }
        if declared < threshold {
            return Err(FrameError::BelowThreshold {
                declared,
                threshold,
            });
        }
        if declared > MAX_UNCOMPRESSED_LENGTH {
            return Err(FrameError::UncompressedTooLarge(declared));
        }

        let mut inflated = Vec::with_capacity(declared);
        flate2::read::ZlibDecoder::new(decoder.buffer())
            .take(declared as u64 + 1)
            .read_to_end(&mut inflated)
            .map_err(FrameError::Inflate)?;
        if inflated.len() != declared {
            return Err(FrameError::SizeMismatch {
                declared,
                actual: inflated.len(),
            });
        }
        Ok(Bytes::from(inflated))
    }
}

pub fn var_int_size(x: i32) -> usize {
    let x = x as u32;
    match x {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        0x20_0000..=0xFFF_FFFF => 4,
        _ => 5,
    }
}
