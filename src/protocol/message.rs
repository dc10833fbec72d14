use bytes::{BufMut, ByteOrder, Bytes, BytesMut};
use crc::crc32;
use nom::{self, IResult, be_i32, be_i64, be_i8, be_u32};

use compression::Compression;
use errors::{ErrorKind, Result};
use protocol::{Offset, ParseTag, parse_bytes};

pub const MAGIC_BYTE_V0: i8 = 0;
pub const COMPRESSION_CODEC_MASK: i8 = 0x07;

/// Fixed per-record wire overhead: offset, record size, crc, magic,
/// attributes and the two length prefixes.
pub const MSG_OVERHEAD: usize = 8 + 4 + 4 + 1 + 1 + 4 + 4;

/// Serialized size of one record with the given key and value sizes.
pub fn message_wire_size(key_len: usize, value_len: usize) -> usize {
    MSG_OVERHEAD + key_len + value_len
}

/// Serialized size of an uncompressed message-set over the given
/// key/value size pairs.
pub fn message_set_wire_size<I>(sizes: I) -> usize
    where I: IntoIterator<Item = (usize, usize)>
{
    sizes
        .into_iter()
        .map(|(key_len, value_len)| message_wire_size(key_len, value_len))
        .sum()
}

/// A single decoded record.
///
/// Message format (v0):
///
/// ```text
/// Message => Offset MessageSize Crc MagicByte Attributes Key Value
///   Offset => int64
///   MessageSize => int32
///   Crc => uint32
///   MagicByte => int8
///   Attributes => int8
///   Key => bytes
///   Value => bytes
/// ```
///
/// The CRC covers the bytes from the magic byte through the end of the
/// value.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub offset: Offset,
    pub compression: Compression,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
}

/// A sequence of records sharing one topic/partition slot of a produce
/// request.  On the wire this is a plain concatenation of records with no
/// count prefix; the enclosing frame bounds it.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageSet {
    pub messages: Vec<Message>,
}

pub struct MessageSetEncoder;

impl MessageSetEncoder {
    /// Append one v0 record.  The size and CRC slots are written after
    /// the body so the record is laid down in a single pass.
    pub fn encode_record<T: ByteOrder>(buf: &mut BytesMut,
                                       offset: Offset,
                                       compression: Compression,
                                       key: &[u8],
                                       value: &[u8]) {
        buf.put_i64::<T>(offset);
        let size_off = buf.len();
        buf.put_i32::<T>(0);
        let crc_off = buf.len();
        buf.put_u32::<T>(0);
        let data_off = buf.len();
        buf.put_i8(MAGIC_BYTE_V0);
        buf.put_i8(compression as i8 & COMPRESSION_CODEC_MASK);
        buf.put_i32::<T>(key.len() as i32);
        buf.put_slice(key);
        buf.put_i32::<T>(value.len() as i32);
        buf.put_slice(value);

        let size = buf.len() - crc_off;
        let crc = crc32::checksum_ieee(&buf[data_off..]);

        T::write_i32(&mut buf[size_off..], size as i32);
        T::write_u32(&mut buf[crc_off..], crc);
    }

    /// Append an uncompressed message-set; record offsets are assigned
    /// sequentially from zero (the broker reassigns them for produced
    /// sets).
    pub fn encode_set<T: ByteOrder>(buf: &mut BytesMut, message_set: &MessageSet) {
        for (idx, message) in message_set.messages.iter().enumerate() {
            Self::encode_record::<T>(buf,
                                     idx as Offset,
                                     message.compression,
                                     message.key.as_ref().map_or(&b""[..], |k| &k[..]),
                                     message.value.as_ref().map_or(&b""[..], |v| &v[..]));
        }
    }
}

named!(parse_record_frame<(Offset, &[u8])>,
    parse_tag!(ParseTag::Message,
        do_parse!(
            offset: be_i64
         >> body: length_bytes!(verify!(be_i32, |size: i32| size >= 14))
         >> ((offset, body))
        )
    )
);

/// Decode the sized body of one record (everything after the record size
/// field), verifying the CRC before any field is interpreted.
fn decode_record_body(offset: Offset, body: &[u8]) -> Result<Message> {
    let expected = BigEndianCrc::read(body);
    let computed = crc32::checksum_ieee(&body[4..]);

    if expected != computed {
        bail!(ErrorKind::CrcMismatch(expected, computed));
    }

    let parsed = do_parse!(&body[4..],
        _magic: add_return_error!(
            nom::ErrorKind::Custom(ParseTag::Message as u32),
            verify!(be_i8, |v: i8| v == MAGIC_BYTE_V0))
     >> attrs: be_i8
     >> key: parse_bytes
     >> value: parse_bytes
     >> ((attrs, key, value))
    );

    match parsed {
        IResult::Done(remaining, (attrs, key, value)) => {
            if !remaining.is_empty() {
                bail!(ErrorKind::BadLength(remaining.len() as i64));
            }

            Ok(Message {
                   offset: offset,
                   compression:
                       Compression::from_attributes((attrs & COMPRESSION_CODEC_MASK) as u8)?,
                   key: key.map(|k| Bytes::from(k.into_owned())),
                   value: value.map(|v| Bytes::from(v.into_owned())),
               })
        }
        IResult::Incomplete(_) => bail!(ErrorKind::TruncatedFrame),
        IResult::Error(err) => bail!(ErrorKind::ParseError(err.into_error_kind())),
    }
}

struct BigEndianCrc;

impl BigEndianCrc {
    fn read(body: &[u8]) -> u32 {
        match be_u32(body) {
            IResult::Done(_, crc) => crc,
            _ => 0,
        }
    }
}

/// Decode a message-set region without expanding compressed records.
pub fn parse_raw_message_set(input: &[u8]) -> Result<Vec<Message>> {
    let mut remaining = input;
    let mut messages = Vec::new();

    while !remaining.is_empty() {
        match parse_record_frame(remaining) {
            IResult::Done(rest, (offset, body)) => {
                messages.push(decode_record_body(offset, body)?);
                remaining = rest;
            }
            IResult::Incomplete(_) => bail!(ErrorKind::TruncatedFrame),
            IResult::Error(err) => bail!(ErrorKind::ParseError(err.into_error_kind())),
        }
    }

    Ok(messages)
}

/// Decode a message-set region, expanding a compressed wrapper record
/// into the records it carries.
///
/// A compressed record is only legal as the sole record of its set and
/// must have an empty key; the records inside it must themselves be
/// uncompressed.
pub fn parse_message_set(input: &[u8]) -> Result<MessageSet> {
    let messages = parse_raw_message_set(input)?;

    let compressed = messages
        .iter()
        .any(|message| message.compression != Compression::None);

    if !compressed {
        return Ok(MessageSet { messages: messages });
    }

    if messages.len() != 1 {
        bail!(ErrorKind::CodecError("compressed record must be the sole record of its set"));
    }

    let wrapper = &messages[0];

    if wrapper.key.as_ref().map_or(0, |k| k.len()) != 0 {
        bail!(ErrorKind::CodecError("compressed record must have an empty key"));
    }

    let decompressed = wrapper
        .compression
        .decompress(wrapper.value.as_ref().map_or(&b""[..], |v| &v[..]))?;
    let inner = parse_raw_message_set(&decompressed)?;

    if inner
           .iter()
           .any(|message| message.compression != Compression::None) {
        bail!(ErrorKind::CodecError("nested compressed message set"));
    }

    Ok(MessageSet { messages: inner })
}
