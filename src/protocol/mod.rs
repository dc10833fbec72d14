use std::str;
use std::borrow::{Cow, ToOwned};

use bytes::{BufMut, ByteOrder, BytesMut};
use nom::{IResult, be_i16, be_i32};

use errors::{ErrorKind, Result};

/// Tags identifying which structure a parser was working on when it
/// failed; carried as nom custom error codes so decode failures name the
/// offending frame element.
#[derive(Debug, Copy, Clone, PartialEq)]
#[repr(u32)]
pub enum ParseTag {
    ResponseHeader = 0,
    MessageSet,
    Message,
    MessageCrc,
    ProduceResponse,
    ProduceTopics,
    ProducePartitions,
    MetadataResponse,
    MetadataBroker,
    MetadataTopic,
    MetadataPartition,
    IngestFrame,
}

macro_rules! parse_tag {
    ($i:expr, $tag:expr, $submac:ident!( $($args:tt)* )) => (
        add_return_error!($i, ::nom::ErrorKind::Custom($tag as u32), $submac!($($args)*))
    );
    ($i:expr, $tag:expr, $f:expr) => (
        add_return_error!($i, ::nom::ErrorKind::Custom($tag as u32), call!($f))
    );
}

mod header;
mod message;
mod produce;
mod metadata;

pub use self::header::{RequestHeader, ResponseHeader, parse_response_header};
pub use self::message::{COMPRESSION_CODEC_MASK, MAGIC_BYTE_V0, MSG_OVERHEAD, Message,
                        MessageSet, MessageSetEncoder, message_set_wire_size,
                        message_wire_size, parse_message_set, parse_raw_message_set};
pub use self::produce::{PartitionAck, ProducePartitionData, ProduceRequest, ProduceResponse,
                        ProduceTopicData, TopicAck, parse_produce_response};
pub use self::metadata::{BrokerMetadata, MetadataRequest, MetadataResponseReader,
                         PartitionMetadata, TopicMetadataHeader};

/// Maximum length of a topic name on the wire (bounded by the i16 length
/// prefix).
pub const MAX_TOPIC_NAME_LEN: usize = i16::max_value() as usize;

pub type ApiVersion = i16;
pub type CorrelationId = i32;
pub type PartitionId = i32;
pub type Offset = i64;
pub type ErrorCode = i16;
pub type NodeId = i32;
pub type Timestamp = i64;

/// Numeric codes for the request types this engine issues.
#[derive(Debug, Copy, Clone, PartialEq)]
#[repr(i16)]
pub enum ApiKeys {
    Produce = 0,
    Metadata = 3,
}

impl ApiKeys {
    pub fn from_wire(v: i16) -> Result<ApiKeys> {
        match v {
            0 => Ok(ApiKeys::Produce),
            3 => Ok(ApiKeys::Metadata),
            _ => bail!(ErrorKind::BadApiKey(v)),
        }
    }
}

/// Possible choices on acknowledgement requirements when producing
/// messages to Kafka.
#[derive(Debug, Copy, Clone, PartialEq)]
#[repr(i16)]
pub enum RequiredAcks {
    /// Indicates to the receiving Kafka broker not to acknowlegde
    /// messages sent to it at all. Sending messages with this
    /// acknowledgement requirement translates into a fire-and-forget
    /// scenario which - of course - is very fast but not reliable.
    None = 0,
    /// Requires the receiving Kafka broker to wait until the sent
    /// messages are written to local disk.  Such messages can be
    /// regarded as acknowledged by one broker in the cluster.
    One = 1,
    /// Requires the sent messages to be acknowledged by all in-sync
    /// replicas of the targeted topic partitions.
    All = -1,
}

impl Default for RequiredAcks {
    fn default() -> Self {
        RequiredAcks::One
    }
}

/// Extension methods for writing the protocol's length-prefixed strings,
/// byte sequences and arrays.
///
/// Writers always emit `0` for an empty or absent string/byte sequence;
/// the parsers below additionally accept `-1`, which brokers use to
/// denote the same thing.
pub trait WriteExt {
    fn put_str<T: ByteOrder, S: AsRef<str>>(&mut self, s: Option<S>) -> Result<()>;

    fn put_bytes<T: ByteOrder, D: AsRef<[u8]>>(&mut self, d: Option<D>) -> Result<()>;

    fn put_array<T, E, F>(&mut self, items: Vec<E>, callback: F) -> Result<()>
        where T: ByteOrder,
              F: FnMut(&mut Self, E) -> Result<()>;
}

impl WriteExt for BytesMut {
    fn put_str<T: ByteOrder, S: AsRef<str>>(&mut self, s: Option<S>) -> Result<()> {
        let len = s.as_ref().map_or(0, |s| s.as_ref().len());

        if len > i16::max_value() as usize {
            bail!(ErrorKind::CodecError("string exceeds i16 length prefix"));
        }

        self.put_i16::<T>(len as i16);

        if let Some(s) = s {
            self.put_slice(s.as_ref().as_bytes());
        }

        Ok(())
    }

    fn put_bytes<T: ByteOrder, D: AsRef<[u8]>>(&mut self, d: Option<D>) -> Result<()> {
        let len = d.as_ref().map_or(0, |d| d.as_ref().len());

        if len > i32::max_value() as usize {
            bail!(ErrorKind::CodecError("byte sequence exceeds i32 length prefix"));
        }

        self.put_i32::<T>(len as i32);

        if let Some(d) = d {
            self.put_slice(d.as_ref());
        }

        Ok(())
    }

    fn put_array<T, E, F>(&mut self, items: Vec<E>, mut callback: F) -> Result<()>
        where T: ByteOrder,
              F: FnMut(&mut Self, E) -> Result<()>
    {
        if items.len() > i32::max_value() as usize {
            bail!(ErrorKind::CodecError("array exceeds i32 count prefix"));
        }

        self.put_i32::<T>(items.len() as i32);

        for item in items {
            callback(self, item)?;
        }

        Ok(())
    }
}

named!(pub parse_str<Option<Cow<str>>>,
    do_parse!(
        len: be_i16
     >> s: cond!(len > 0, map!(map_res!(take!(len), str::from_utf8), Cow::from))
     >> (s)
    )
);

named!(pub parse_string<String>,
    do_parse!(
        len: be_i16
     >> s: cond_reduce!(len >= 0, map!(map_res!(take!(len), str::from_utf8), ToOwned::to_owned))
     >> (s)
    )
);

named!(pub parse_opt_string<String>,
    do_parse!(
        len: be_i16
     >> s: cond!(len > 0, map!(map_res!(take!(len), str::from_utf8), ToOwned::to_owned))
     >> (s.unwrap_or_default())
    )
);

named!(pub parse_bytes<Option<Cow<[u8]>>>,
    do_parse!(
        len: be_i32
     >> s: cond!(len > 0, map!(take!(len), Cow::from))
     >> (s)
    )
);

/// Write a size-prefixed request frame: reserve the size slot, encode the
/// body through `encode_body`, then patch the size in.  The size field
/// counts the bytes that follow it, not itself.
pub fn frame_request<T, F>(dst: &mut BytesMut, encode_body: F) -> Result<()>
    where T: ByteOrder,
          F: FnOnce(&mut BytesMut) -> Result<()>
{
    let size_off = dst.len();
    dst.put_i32::<T>(0);

    encode_body(dst)?;

    let size = dst.len() - size_off - 4;

    if size > i32::max_value() as usize {
        bail!(ErrorKind::CodecError("request frame exceeds i32 size prefix"));
    }

    T::write_i32(&mut dst[size_off..], size as i32);

    Ok(())
}

/// Finish a parse of a complete frame, mapping nom outcomes to the crate
/// error taxonomy: leftover input and `Incomplete` are both framing
/// errors.
pub fn check_complete<T>(result: IResult<&[u8], T>) -> Result<T> {
    match result {
        IResult::Done(remaining, value) => {
            if remaining.is_empty() {
                Ok(value)
            } else {
                bail!(ErrorKind::CodecError("trailing bytes after frame"))
            }
        }
        IResult::Incomplete(_) => bail!(ErrorKind::TruncatedFrame),
        IResult::Error(err) => bail!(ErrorKind::ParseError(err.into_error_kind())),
    }
}
