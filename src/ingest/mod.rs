use std::str;
use std::sync::Arc;

use bytes::{BufMut, ByteOrder, BytesMut};

use discard::DiscardReason;
use errors::{Error, ErrorKind, Result};
use msg::{Msg, MsgRouting};
use pool::BufferPool;
use protocol::Timestamp;

pub const API_KEY_ANY_PARTITION: u8 = 0;
pub const API_KEY_PARTITION_KEY: u8 = 1;
pub const API_VERSION: u8 = 0;

/// Fixed bytes of an `AnyPartition` frame: size, api key, api version,
/// flags, topic size, timestamp, key size, value size.
pub const ANY_PARTITION_OVERHEAD: usize = 4 + 1 + 1 + 2 + 2 + 8 + 4 + 4;

/// A decoded local frame, borrowing from the datagram it came in.
///
/// ```text
/// Frame => Size ApiKey ApiVersion Flags [PartitionKey] Topic Timestamp Key Value
///   Size => int32 (covers the whole frame, size field included)
///   ApiKey => uint8
///   ApiVersion => uint8
///   Flags => uint16 (reserved)
///   PartitionKey => int32 (present iff ApiKey = 1)
///   Topic => int16-prefixed bytes, non-empty
///   Timestamp => int64 (milliseconds since epoch)
///   Key => int32-prefixed bytes
///   Value => int32-prefixed bytes
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct InputFrame<'a> {
    pub routing: MsgRouting,
    pub topic: &'a str,
    pub timestamp: Timestamp,
    pub key: &'a [u8],
    pub value: &'a [u8],
}

struct FrameCursor<'a> {
    remaining: &'a [u8],
}

impl<'a> FrameCursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining.len() < n {
            bail!(ErrorKind::TruncatedFrame);
        }

        let (bytes, rest) = self.remaining.split_at(n);
        self.remaining = rest;

        Ok(bytes)
    }

    fn take_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn take_u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;

        Ok((u16::from(bytes[0]) << 8) | u16::from(bytes[1]))
    }

    fn take_i16(&mut self) -> Result<i16> {
        Ok(self.take_u16()? as i16)
    }

    fn take_i32(&mut self) -> Result<i32> {
        let bytes = self.take(4)?;

        Ok((i32::from(bytes[0]) << 24) | (i32::from(bytes[1]) << 16) |
           (i32::from(bytes[2]) << 8) | i32::from(bytes[3]))
    }

    fn take_i64(&mut self) -> Result<i64> {
        let hi = i64::from(self.take_i32()?);
        let lo = i64::from(self.take_i32()?) & 0xffff_ffff;

        Ok((hi << 32) | lo)
    }
}

/// Decode one complete local frame.  The `size` field covers the whole
/// frame including itself and must match the byte count exactly; a frame
/// failing any check here is a single discard, never a pipeline error.
pub fn decode_frame(frame: &[u8]) -> Result<InputFrame> {
    let mut cursor = FrameCursor { remaining: frame };

    let size = cursor.take_i32()?;

    if size < 0 || size as usize != frame.len() {
        bail!(ErrorKind::BadLength(i64::from(size)));
    }

    let api_key = cursor.take_u8()?;

    if api_key != API_KEY_ANY_PARTITION && api_key != API_KEY_PARTITION_KEY {
        bail!(ErrorKind::BadApiKey(i16::from(api_key)));
    }

    let api_version = cursor.take_u8()?;

    if api_version != API_VERSION {
        bail!(ErrorKind::BadApiVersion(i16::from(api_version)));
    }

    // reserved
    let _flags = cursor.take_u16()?;

    let routing = if api_key == API_KEY_PARTITION_KEY {
        MsgRouting::PartitionKey(cursor.take_i32()? as u32)
    } else {
        MsgRouting::AnyPartition
    };

    let topic_size = cursor.take_i16()?;

    if topic_size <= 0 {
        bail!(ErrorKind::BadLength(i64::from(topic_size)));
    }

    let topic = str::from_utf8(cursor.take(topic_size as usize)?)
        .map_err(|_| Error::from(ErrorKind::CodecError("topic is not valid utf-8")))?;

    let timestamp = cursor.take_i64()?;

    let key_size = cursor.take_i32()?;

    if key_size < 0 {
        bail!(ErrorKind::BadLength(i64::from(key_size)));
    }

    let key = cursor.take(key_size as usize)?;

    let value_size = cursor.take_i32()?;

    if value_size < 0 {
        bail!(ErrorKind::BadLength(i64::from(value_size)));
    }

    let value = cursor.take(value_size as usize)?;

    if !cursor.remaining.is_empty() {
        bail!(ErrorKind::CodecError("trailing bytes after frame"));
    }

    Ok(InputFrame {
           routing: routing,
           topic: topic,
           timestamp: timestamp,
           key: key,
           value: value,
       })
}

/// The discard reason an undecodable frame is reported under.
pub fn discard_reason_for(err: &Error) -> DiscardReason {
    match *err.kind() {
        ErrorKind::BadApiKey(_) => DiscardReason::UnsupportedApiKey,
        ErrorKind::BadApiVersion(_) => DiscardReason::UnsupportedMsgVersion,
        _ => DiscardReason::MalformedMsg,
    }
}

impl<'a> InputFrame<'a> {
    /// Admit the frame into the pipeline, copying key and value into
    /// pool storage.  `None` means the pool is exhausted.
    pub fn to_msg(&self, pool: &Arc<BufferPool>) -> Option<Msg> {
        Msg::new(pool,
                 self.topic,
                 self.timestamp,
                 self.routing,
                 self.key,
                 self.value)
    }
}

/// Serialize one local frame; the producer-side counterpart of
/// `decode_frame`, also used by tests.
pub fn write_frame<T: ByteOrder>(dst: &mut BytesMut,
                                 routing: MsgRouting,
                                 topic: &str,
                                 timestamp: Timestamp,
                                 key: &[u8],
                                 value: &[u8])
                                 -> Result<()> {
    if topic.is_empty() || topic.len() > i16::max_value() as usize {
        bail!(ErrorKind::BadLength(topic.len() as i64));
    }

    let partition_key_size = match routing {
        MsgRouting::PartitionKey(_) => 4,
        MsgRouting::AnyPartition => 0,
    };
    let size = ANY_PARTITION_OVERHEAD + partition_key_size + topic.len() + key.len() +
               value.len();

    dst.put_i32::<T>(size as i32);
    dst.put_u8(match routing {
                   MsgRouting::AnyPartition => API_KEY_ANY_PARTITION,
                   MsgRouting::PartitionKey(_) => API_KEY_PARTITION_KEY,
               });
    dst.put_u8(API_VERSION);
    dst.put_u16::<T>(0);

    if let MsgRouting::PartitionKey(partition_key) = routing {
        dst.put_i32::<T>(partition_key as i32);
    }

    dst.put_i16::<T>(topic.len() as i16);
    dst.put_slice(topic.as_bytes());
    dst.put_i64::<T>(timestamp);
    dst.put_i32::<T>(key.len() as i32);
    dst.put_slice(key);
    dst.put_i32::<T>(value.len() as i32);
    dst.put_slice(value);

    Ok(())
}

#[cfg(test)]
mod tests {
    use bytes::BigEndian;

    use super::*;

    fn make_frame(routing: MsgRouting) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(128);

        write_frame::<BigEndian>(&mut buf, routing, "topic", 1234, b"key", b"value").unwrap();

        buf.to_vec()
    }

    #[test]
    fn test_any_partition_roundtrip() {
        let data = make_frame(MsgRouting::AnyPartition);
        let frame = decode_frame(&data).unwrap();

        assert_eq!(frame.routing, MsgRouting::AnyPartition);
        assert_eq!(frame.topic, "topic");
        assert_eq!(frame.timestamp, 1234);
        assert_eq!(frame.key, b"key");
        assert_eq!(frame.value, b"value");
    }

    #[test]
    fn test_partition_key_roundtrip() {
        let data = make_frame(MsgRouting::PartitionKey(0xdead_beef));
        let frame = decode_frame(&data).unwrap();

        assert_eq!(frame.routing, MsgRouting::PartitionKey(0xdead_beef));
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let mut data = make_frame(MsgRouting::AnyPartition);

        // size field one less than the actual byte count
        let actual = data.len() as i32 - 1;
        data[0] = (actual >> 24) as u8;
        data[1] = (actual >> 16) as u8;
        data[2] = (actual >> 8) as u8;
        data[3] = actual as u8;

        let err = decode_frame(&data).unwrap_err();

        assert_eq!(discard_reason_for(&err), DiscardReason::MalformedMsg);
    }

    #[test]
    fn test_unsupported_api_key() {
        let mut data = make_frame(MsgRouting::AnyPartition);
        data[4] = 9;

        let err = decode_frame(&data).unwrap_err();

        assert_eq!(discard_reason_for(&err), DiscardReason::UnsupportedApiKey);
    }

    #[test]
    fn test_unsupported_api_version() {
        let mut data = make_frame(MsgRouting::AnyPartition);
        data[5] = 3;

        let err = decode_frame(&data).unwrap_err();

        assert_eq!(discard_reason_for(&err), DiscardReason::UnsupportedMsgVersion);
    }

    #[test]
    fn test_empty_topic_rejected() {
        let mut buf = BytesMut::with_capacity(64);

        assert!(write_frame::<BigEndian>(&mut buf,
                                         MsgRouting::AnyPartition,
                                         "",
                                         0,
                                         b"",
                                         b"")
                        .is_err());
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let data = make_frame(MsgRouting::AnyPartition);

        for cut in 1..data.len() {
            assert!(decode_frame(&data[..data.len() - cut]).is_err());
        }
    }

    #[test]
    fn test_to_msg_copies_into_pool() {
        let pool = ::pool::BufferPool::new(64, 2);
        let data = make_frame(MsgRouting::PartitionKey(3));
        let frame = decode_frame(&data).unwrap();

        let msg = frame.to_msg(&pool).unwrap();

        assert_eq!(msg.topic(), "topic");
        assert_eq!(msg.key(), b"key");
        assert_eq!(msg.value(), b"value");
        assert_eq!(msg.routing(), MsgRouting::PartitionKey(3));
        assert!(pool.blocks_in_use() > 0);
    }
}
