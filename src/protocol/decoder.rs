use crate::protocol::{ConnectionState, ProtocolVersion};
use bytes::Bytes;
use std::{convert::Infallible, num::TryFromIntError, str::Utf8Error};
use uuid::Uuid;

/// An error while decoding packets.
///
/// Every variant means the frame cannot be trusted and is treated
/// as a corrupt frame by the connection.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("need at least {0} more bytes")]
    EndOfStream(usize),
    #[error("invalid boolean pattern {0} - expected either 0 or 1")]
    InvalidBool(u8),
    #[error("varint is too long")]
    VarIntTooLong,
    #[error("negative length {0}")]
    NegativeLength(i32),
    #[error("string of {actual} exceeds max allowed length {max}")]
    StringTooLong { max: usize, actual: usize },
    #[error("byte array of {actual} bytes exceeds max allowed length {max}")]
    ArrayTooLong { max: usize, actual: usize },
    #[error("invalid discriminant {0}")]
    InvalidDiscriminant(i64),
    #[error("invalid uuid: {0}")]
    InvalidUuid(#[from] uuid::Error),
    #[error("invalid nbt: {0}")]
    Nbt(String),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown argument parser {0}")]
    UnknownArgumentParser(String),
    #[error("{0} bytes left over after decoding {1}")]
    TrailingData(usize, &'static str),
    #[error(transparent)]
    Utf8(#[from] Utf8Error),
    #[error(transparent)]
    IntConversion(#[from] TryFromIntError),
    /// Special variant for derive macro integer conversions to work.
    /// Cannot occur.
    #[error(transparent)]
    Infallible(#[from] Infallible),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T, E = DecodeError> = std::result::Result<T, E>;

/// Default cap for strings whose length the protocol does not restrict further.
pub const DEFAULT_MAX_STRING_LENGTH: usize = 65536;

/// A raw decoder for a Minecraft bitstream.
///
/// Carries the protocol version and connection state of the frame
/// being decoded, since wire layouts depend on both.
#[derive(Debug)]
pub struct Decoder<'a> {
    buffer: &'a [u8],
    backing: Option<&'a Bytes>,
    version: ProtocolVersion,
    state: ConnectionState,
}

impl<'a> Decoder<'a> {
    /// Creates a decoder from the buffer it will read from.
    pub fn new(buffer: &'a [u8], version: ProtocolVersion, state: ConnectionState) -> Self {
        Self {
            buffer,
            backing: None,
            version,
            state,
        }
    }

    /// Creates a decoder over a shared buffer. Payloads taken with
    /// [`Decoder::read_remaining`] then reference the same allocation
    /// instead of being copied.
    pub fn from_bytes(bytes: &'a Bytes, version: ProtocolVersion, state: ConnectionState) -> Self {
        Self {
            buffer: bytes,
            backing: Some(bytes),
            version,
            state,
        }
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Gets the remaining buffer.
    pub fn buffer(&self) -> &'a [u8] {
        self.buffer
    }

    /// Returns if there is no data left in the buffer.
    pub fn is_finished(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Consumes `n` bytes from the buffer, returning them as a slice.
    pub fn consume_slice(&mut self, n: usize) -> Result<&'a [u8]> {
        if n <= self.buffer.len() {
            let (data, buffer) = self.buffer.split_at(n);
            self.buffer = buffer;
            Ok(data)
        } else {
            Err(DecodeError::EndOfStream(n - self.buffer.len()))
        }
    }

    /// Consumes `N` bytes into an array.
    pub fn consume<const N: usize>(&mut self) -> Result<[u8; N]> {
        let data = self.consume_slice(N)?;
        let mut array = [0; N];
        array.copy_from_slice(data);
        Ok(array)
    }

    /// Reads an unsigned byte from the stream.
    pub fn read_u8(&mut self) -> Result<u8> {
        self.consume::<1>().map(|[x]| x)
    }

    /// Reads a signed byte from the stream.
    pub fn read_i8(&mut self) -> Result<i8> {
        self.consume().map(i8::from_be_bytes)
    }

    /// Reads an unsigned short from the stream.
    pub fn read_u16(&mut self) -> Result<u16> {
        self.consume().map(u16::from_be_bytes)
    }

    /// Reads a signed short from the stream.
    pub fn read_i16(&mut self) -> Result<i16> {
        self.consume().map(i16::from_be_bytes)
    }

    /// Reads a signed int from the stream.
    pub fn read_i32(&mut self) -> Result<i32> {
        self.consume().map(i32::from_be_bytes)
    }

    /// Reads a signed long from the stream.
    pub fn read_i64(&mut self) -> Result<i64> {
        self.consume().map(i64::from_be_bytes)
    }

    /// Reads a float from the stream.
    pub fn read_f32(&mut self) -> Result<f32> {
        self.consume().map(f32::from_be_bytes)
    }

    /// Reads a double from the stream.
    pub fn read_f64(&mut self) -> Result<f64> {
        self.consume().map(f64::from_be_bytes)
    }

    /// Reads a boolean from the stream.
    pub fn read_bool(&mut self) -> Result<bool> {
        let x = self.read_u8()?;
        match x {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(DecodeError::InvalidBool(x)),
        }
    }

    /// Reads a VarInt from the stream.
    pub fn read_var_int(&mut self) -> Result<i32> {
        self.read_var_int_with_size().map(|(x, _)| x)
    }

    /// Reads a VarInt from the stream, additionally
    /// returning the number of bytes read.
    pub fn read_var_int_with_size(&mut self) -> Result<(i32, usize)> {
        let mut num_read = 0;
        let mut result = 0i32;

        loop {
            if num_read == 5 {
                return Err(DecodeError::VarIntTooLong);
            }
            let read = self.read_u8()?;
            let value = i32::from(read & 0b0111_1111);
            result |= value.overflowing_shl(7 * num_read).0;

            num_read += 1;

            if read & 0b1000_0000 == 0 {
                break;
            }
        }
        Ok((result, num_read as usize))
    }

    /// Reads a VarInt that must be a non-negative length.
    pub fn read_length(&mut self) -> Result<usize> {
        let length = self.read_var_int()?;
        usize::try_from(length).map_err(|_| DecodeError::NegativeLength(length))
    }

    /// Reads a string with the default length cap.
    pub fn read_string(&mut self) -> Result<&'a str> {
        self.read_string_bounded(DEFAULT_MAX_STRING_LENGTH)
    }

    /// Reads a string of at most `max` characters.
    ///
    /// The declared byte length is checked against the worst case
    /// encoding of `max` characters before anything is read.
    pub fn read_string_bounded(&mut self, max: usize) -> Result<&'a str> {
        let length = self.read_length()?;
        if length > max.saturating_mul(4) {
            return Err(DecodeError::StringTooLong {
                max,
                actual: length,
            });
        }

        let string = std::str::from_utf8(self.consume_slice(length)?)?;
        let characters = string.encode_utf16().count();
        if characters > max {
            return Err(DecodeError::StringTooLong {
                max,
                actual: characters,
            });
        }
        Ok(string)
    }

    /// Reads a length-prefixed byte array of at most `max` bytes.
    pub fn read_byte_array_bounded(&mut self, max: usize) -> Result<&'a [u8]> {
        let length = self.read_length()?;
        if length > max {
            return Err(DecodeError::ArrayTooLong {
                max,
                actual: length,
            });
        }
        self.consume_slice(length)
    }

    /// Reads a length-prefixed byte array with the default cap.
    pub fn read_byte_array(&mut self) -> Result<&'a [u8]> {
        self.read_byte_array_bounded(DEFAULT_MAX_STRING_LENGTH)
    }

    /// Reads a UUID stored as two big-endian longs.
    pub fn read_uuid(&mut self) -> Result<Uuid> {
        Ok(Uuid::from_bytes(self.consume::<16>()?))
    }

    /// Reads a UUID stored as a dashed string.
    pub fn read_uuid_string(&mut self) -> Result<Uuid> {
        Ok(Uuid::parse_str(self.read_string_bounded(36)?)?)
    }

    /// Takes everything left in the buffer.
    ///
    /// When the decoder was built over shared [`Bytes`], the result
    /// shares its allocation and stays valid after the frame is dropped.
    pub fn read_remaining(&mut self) -> Bytes {
        let rest = self.buffer;
        self.buffer = &[];
        match self.backing {
            Some(backing) => backing.slice_ref(rest),
            None => Bytes::copy_from_slice(rest),
        }
    }

    /// Runs `read` and returns the bytes it consumed.
    pub fn capture(&mut self, read: impl FnOnce(&mut Self) -> Result<()>) -> Result<Bytes> {
        let start = self.buffer;
        read(self)?;
        let consumed = &start[..start.len() - self.buffer.len()];
        Ok(match self.backing {
            Some(backing) => backing.slice_ref(consumed),
            None => Bytes::copy_from_slice(consumed),
        })
    }

    /// Fails if any bytes were left unread by a packet decoder.
    pub fn finish(&self, packet: &'static str) -> Result<()> {
        if self.buffer.is_empty() {
            Ok(())
        } else {
            Err(DecodeError::TrailingData(self.buffer.len(), packet))
        }
    }
}

/// A type that can be read from a [`Decoder`].
pub trait Decode: Sized {
    fn decode(decoder: &mut Decoder) -> Result<Self>;
}

impl Decode for u8 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_u8()
    }
}

impl Decode for i8 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_i8()
    }
}

impl Decode for u16 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_u16()
    }
}

impl Decode for i16 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_i16()
    }
}

impl Decode for i32 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_i32()
    }
}

impl Decode for i64 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_i64()
    }
}

impl Decode for f32 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_f32()
    }
}

impl Decode for f64 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_f64()
    }
}

impl Decode for bool {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_bool()
    }
}

impl Decode for String {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_string().map(str::to_owned)
    }
}

impl Decode for Uuid {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_uuid()
    }
}

impl Decode for Bytes {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        Ok(decoder.read_remaining())
    }
}

impl Decode for () {
    fn decode(_decoder: &mut Decoder) -> Result<Self> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Encoder;

    fn decoder(bytes: &[u8]) -> Decoder {
        Decoder::new(bytes, ProtocolVersion::MAXIMUM, ConnectionState::Play)
    }

    fn encoder(buf: &mut Vec<u8>) -> Encoder {
        Encoder::new(buf, ProtocolVersion::MAXIMUM, ConnectionState::Play)
    }

    #[test]
    fn var_int_round_trip_is_minimal() {
        for value in [0, 1, 127, 128, 255, 25565, 2097151, i32::MAX, -1, i32::MIN] {
            let mut buf = Vec::new();
            let written = encoder(&mut buf).write_var_int(value);
            assert_eq!(written, buf.len());
            assert!(written <= 5);
            assert_ne!(buf[buf.len() - 1] & 0x80, 0x80);
            assert_eq!(decoder(&buf).read_var_int().unwrap(), value);
        }
        let mut buf = Vec::new();
        encoder(&mut buf).write_var_int(127);
        assert_eq!(buf, [0x7f]);
    }

    #[test]
    fn var_int_without_terminator_is_rejected() {
        let bytes = [0xff, 0xff, 0xff, 0xff, 0xff, 0x01];
        assert!(matches!(
            decoder(&bytes).read_var_int(),
            Err(DecodeError::VarIntTooLong)
        ));
        assert!(matches!(
            decoder(&[0x80, 0x80]).read_var_int(),
            Err(DecodeError::EndOfStream(_))
        ));
    }

    #[test]
    fn string_over_cap_fails_before_reading() {
        // Claims 1000 bytes but carries none: the cap check fires first.
        let mut buf = Vec::new();
        encoder(&mut buf).write_var_int(1000);
        assert!(matches!(
            decoder(&buf).read_string_bounded(16),
            Err(DecodeError::StringTooLong { max: 16, actual: 1000 })
        ));
    }

    #[test]
    fn string_with_too_many_characters_is_rejected() {
        let mut buf = Vec::new();
        encoder(&mut buf).write_string("abcdefghijklmnopq");
        assert!(matches!(
            decoder(&buf).read_string_bounded(16),
            Err(DecodeError::StringTooLong { max: 16, actual: 17 })
        ));
        assert_eq!(
            decoder(&buf).read_string_bounded(17).unwrap(),
            "abcdefghijklmnopq"
        );
    }

    #[test]
    fn negative_array_length_is_rejected() {
        let mut buf = Vec::new();
        encoder(&mut buf).write_var_int(-5);
        assert!(matches!(
            decoder(&buf).read_byte_array(),
            Err(DecodeError::NegativeLength(-5))
        ));
    }

    #[test]
    fn remaining_bytes_share_backing_allocation() {
        let frame = Bytes::from_static(b"\x03abcpayload");
        let mut decoder =
            Decoder::from_bytes(&frame, ProtocolVersion::MAXIMUM, ConnectionState::Play);
        assert_eq!(decoder.read_string().unwrap(), "abc");
        let rest = decoder.read_remaining();
        assert_eq!(&rest[..], b"payload");
        assert_eq!(rest.as_ptr(), frame[4..].as_ptr());
        assert!(decoder.is_finished());
    }
}
