use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder};
use hexplay::HexViewBuilder;

use errors::{ErrorKind, Result};

/// Client-visible state of a stream message reader.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReaderState {
    /// More data needs to be read.
    ReadNeeded,
    /// A message is ready; access it with `ready_msg()`, then call
    /// `consume_ready_msg()`.
    MsgReady,
    /// The stream carried invalid message data; recovery is impossible.
    /// The buffered bytes stay available through `data()`.
    DataInvalid,
    /// End of input with every message consumed.  Any partial trailing
    /// data stays available through `data()`.
    AtEnd,
}

/// What the framing protocol concluded about the buffered bytes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MsgDisposition {
    /// A message spans `[offset, offset + size)` of the buffer, followed
    /// by `trailing` framing bytes (a terminator, for instance).
    MsgReady {
        offset: usize,
        size: usize,
        trailing: usize,
    },
    NoMsgReady,
    Invalid,
}

/// Framing discipline hook for `StreamMsgReader`.  Implementations never
/// touch the fd; they only look at buffered bytes.
pub trait MsgReadProtocol {
    /// How many bytes the reader should try to read next, given the
    /// current buffer contents.
    fn next_read_size(&self, data: &[u8]) -> usize;

    /// Whether the buffer currently holds a complete message.
    fn next_msg(&self, data: &[u8]) -> MsgDisposition;
}

/// Reads a sequence of framed messages from any byte stream (TCP or UNIX
/// stream socket, pipe), one `read(2)`-sized step at a time.
///
/// Interrupted reads are retried in place; `WouldBlock` is surfaced to
/// the caller with the state unchanged, so the same reader works on
/// nonblocking fds driven by readiness notification and on blocking fds
/// with receive timeouts.
pub struct StreamMsgReader<P> {
    protocol: P,
    buf: Vec<u8>,
    state: ReaderState,
    end_of_input: bool,
    ready: Option<(usize, usize, usize)>,
}

impl<P> StreamMsgReader<P>
    where P: MsgReadProtocol
{
    pub fn new(protocol: P) -> StreamMsgReader<P> {
        StreamMsgReader {
            protocol: protocol,
            buf: Vec::new(),
            state: ReaderState::ReadNeeded,
            end_of_input: false,
            ready: None,
        }
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Buffered bytes, including framing and any partial trailing
    /// message.
    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    /// The ready message body; valid only in `MsgReady`.
    pub fn ready_msg(&self) -> &[u8] {
        let (offset, size, _) = self.ready.expect("ready_msg outside MsgReady");

        &self.buf[offset..offset + size]
    }

    /// Drop all buffered state and start over on a fresh stream.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.state = ReaderState::ReadNeeded;
        self.end_of_input = false;
        self.ready = None;
    }

    /// Perform one read step.  Valid only in `ReadNeeded`; a zero-byte
    /// read marks end of input.  `Interrupted` is retried; any other
    /// error (including `WouldBlock`) is returned with the reader state
    /// unchanged.
    pub fn read<R: Read>(&mut self, reader: &mut R) -> io::Result<ReaderState> {
        if self.state != ReaderState::ReadNeeded {
            return Ok(self.state);
        }

        let read_size = self.protocol.next_read_size(&self.buf);

        if read_size == 0 {
            return Ok(self.state);
        }

        let start = self.buf.len();
        self.buf.resize(start + read_size, 0);

        loop {
            match reader.read(&mut self.buf[start..]) {
                Ok(0) => {
                    self.buf.truncate(start);
                    self.end_of_input = true;
                    self.evaluate();
                    break;
                }
                Ok(n) => {
                    self.buf.truncate(start + n);
                    self.evaluate();
                    break;
                }
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.buf.truncate(start);
                    return Err(err);
                }
            }
        }

        Ok(self.state)
    }

    /// Advance past the ready message (and its trailing framing bytes).
    /// Valid only in `MsgReady`.
    pub fn consume_ready_msg(&mut self) -> ReaderState {
        let (offset, size, trailing) = self.ready
            .take()
            .expect("consume_ready_msg outside MsgReady");

        self.buf.drain(..offset + size + trailing);
        self.evaluate();
        self.state
    }

    fn evaluate(&mut self) {
        match self.protocol.next_msg(&self.buf) {
            MsgDisposition::MsgReady {
                offset,
                size,
                trailing,
            } => {
                self.ready = Some((offset, size, trailing));
                self.state = ReaderState::MsgReady;
            }
            MsgDisposition::NoMsgReady => {
                self.ready = None;
                self.state = if self.end_of_input {
                    ReaderState::AtEnd
                } else {
                    ReaderState::ReadNeeded
                };
            }
            MsgDisposition::Invalid => {
                self.ready = None;
                self.state = ReaderState::DataInvalid;
            }
        }
    }
}

/// Framing for messages preceded by a big-endian signed 32-bit size
/// field.  Negative sizes and bodies over `max_msg_body_size` are
/// invalid; `size_includes_field` covers formats whose size field counts
/// itself.
#[derive(Debug, Clone)]
pub struct SizePrefixedProtocol {
    pub size_includes_field: bool,
    pub max_msg_body_size: usize,
}

pub const SIZE_FIELD_WIDTH: usize = 4;

impl SizePrefixedProtocol {
    fn body_size(&self, data: &[u8]) -> Option<i64> {
        if data.len() < SIZE_FIELD_WIDTH {
            return None;
        }

        let size = i64::from(BigEndian::read_i32(&data[..SIZE_FIELD_WIDTH]));

        Some(if self.size_includes_field {
                 size - SIZE_FIELD_WIDTH as i64
             } else {
                 size
             })
    }
}

impl MsgReadProtocol for SizePrefixedProtocol {
    fn next_read_size(&self, data: &[u8]) -> usize {
        match self.body_size(data) {
            None => SIZE_FIELD_WIDTH - data.len(),
            Some(body) if body < 0 || body as usize > self.max_msg_body_size => 0,
            Some(body) => {
                let total = SIZE_FIELD_WIDTH + body as usize;

                if data.len() < total {
                    total - data.len()
                } else {
                    0
                }
            }
        }
    }

    fn next_msg(&self, data: &[u8]) -> MsgDisposition {
        match self.body_size(data) {
            None => MsgDisposition::NoMsgReady,
            Some(body) if body < 0 || body as usize > self.max_msg_body_size => {
                MsgDisposition::Invalid
            }
            Some(body) => {
                if data.len() >= SIZE_FIELD_WIDTH + body as usize {
                    MsgDisposition::MsgReady {
                        offset: SIZE_FIELD_WIDTH,
                        size: body as usize,
                        trailing: 0,
                    }
                } else {
                    MsgDisposition::NoMsgReady
                }
            }
        }
    }
}

pub type SizePrefixedReader = StreamMsgReader<SizePrefixedProtocol>;

/// One broker connection: a blocking TCP stream with send/receive
/// deadlines and size-prefixed framing in both directions.
pub struct KafkaConnection {
    stream: TcpStream,
    reader: SizePrefixedReader,
    addr: String,
}

impl KafkaConnection {
    pub fn connect(addr: &str, timeout: Duration, max_frame: usize) -> Result<KafkaConnection> {
        let sock_addr = addr.to_socket_addrs()?
            .next()
            .ok_or_else(|| ErrorKind::ConnectionLost(addr.to_owned()))?;

        let stream = TcpStream::connect_timeout(&sock_addr, timeout)?;

        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;

        debug!("connected to broker {}", addr);

        Ok(KafkaConnection {
               stream: stream,
               reader: StreamMsgReader::new(SizePrefixedProtocol {
                                                size_includes_field: false,
                                                max_msg_body_size: max_frame,
                                            }),
               addr: addr.to_owned(),
           })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send one already-framed request (the size prefix is part of
    /// `frame`).
    pub fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        trace!("sending {} byte frame to {}:\n{}",
               frame.len(),
               self.addr,
               HexViewBuilder::new(frame).row_width(16).finish());

        loop {
            match self.stream.write_all(frame) {
                Ok(()) => return Ok(()),
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Receive one response frame body (the bytes after the size field).
    pub fn recv_frame(&mut self) -> Result<Vec<u8>> {
        loop {
            match self.reader.state() {
                ReaderState::MsgReady => {
                    let frame = self.reader.ready_msg().to_vec();

                    self.reader.consume_ready_msg();

                    trace!("received {} byte frame from {}", frame.len(), self.addr);

                    return Ok(frame);
                }
                ReaderState::ReadNeeded => {
                    self.reader.read(&mut self.stream)?;
                }
                ReaderState::DataInvalid => {
                    bail!(ErrorKind::CodecError("invalid response frame size"));
                }
                ReaderState::AtEnd => {
                    bail!(ErrorKind::ConnectionLost(self.addr.clone()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn proto(includes: bool) -> SizePrefixedProtocol {
        SizePrefixedProtocol {
            size_includes_field: includes,
            max_msg_body_size: 1024,
        }
    }

    fn frame(body: &[u8]) -> Vec<u8> {
        let mut data = vec![0u8; 4];
        BigEndian::write_i32(&mut data, body.len() as i32);
        data.extend_from_slice(body);
        data
    }

    /// Reader handing out one byte per read call, exercising re-buffering.
    struct TrickleReader {
        data: Vec<u8>,
        pos: usize,
    }

    impl Read for TrickleReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pos >= self.data.len() || buf.is_empty() {
                return Ok(0);
            }

            buf[0] = self.data[self.pos];
            self.pos += 1;

            Ok(1)
        }
    }

    #[test]
    fn test_single_message() {
        let mut reader = StreamMsgReader::new(proto(false));
        let mut stream = Cursor::new(frame(b"hello"));

        while reader.state() == ReaderState::ReadNeeded {
            reader.read(&mut stream).unwrap();
        }

        assert_eq!(reader.state(), ReaderState::MsgReady);
        assert_eq!(reader.ready_msg(), b"hello");
        assert_eq!(reader.consume_ready_msg(), ReaderState::ReadNeeded);

        // end of stream with no partial data
        assert_eq!(reader.read(&mut stream).unwrap(), ReaderState::AtEnd);
        assert!(reader.data().is_empty());
    }

    #[test]
    fn test_back_to_back_messages_one_byte_at_a_time() {
        let mut data = frame(b"one");
        data.extend_from_slice(&frame(b"three"));

        let mut stream = TrickleReader {
            data: data,
            pos: 0,
        };
        let mut reader = StreamMsgReader::new(proto(false));
        let mut seen = Vec::new();

        loop {
            match reader.state() {
                ReaderState::ReadNeeded => {
                    reader.read(&mut stream).unwrap();
                }
                ReaderState::MsgReady => {
                    seen.push(reader.ready_msg().to_vec());
                    reader.consume_ready_msg();
                }
                ReaderState::AtEnd => break,
                ReaderState::DataInvalid => panic!("unexpected invalid data"),
            }
        }

        assert_eq!(seen, vec![b"one".to_vec(), b"three".to_vec()]);
    }

    #[test]
    fn test_negative_size_is_invalid() {
        let mut data = vec![0u8; 4];
        BigEndian::write_i32(&mut data, -5);

        let mut reader = StreamMsgReader::new(proto(false));
        let mut stream = Cursor::new(data);

        while reader.state() == ReaderState::ReadNeeded {
            reader.read(&mut stream).unwrap();
        }

        assert_eq!(reader.state(), ReaderState::DataInvalid);
    }

    #[test]
    fn test_oversized_body_is_invalid() {
        let mut data = vec![0u8; 4];
        BigEndian::write_i32(&mut data, 4096);

        let mut reader = StreamMsgReader::new(proto(false));
        let mut stream = Cursor::new(data);

        while reader.state() == ReaderState::ReadNeeded {
            reader.read(&mut stream).unwrap();
        }

        assert_eq!(reader.state(), ReaderState::DataInvalid);
    }

    #[test]
    fn test_partial_trailing_data_at_end() {
        let mut data = frame(b"whole");
        data.extend_from_slice(&[0, 0, 0, 9, 1, 2]);

        let mut stream = Cursor::new(data);
        let mut reader = StreamMsgReader::new(proto(false));

        while reader.state() == ReaderState::ReadNeeded {
            reader.read(&mut stream).unwrap();
        }

        assert_eq!(reader.ready_msg(), b"whole");
        reader.consume_ready_msg();

        while reader.state() == ReaderState::ReadNeeded {
            reader.read(&mut stream).unwrap();
        }

        assert_eq!(reader.state(), ReaderState::AtEnd);
        assert_eq!(reader.data(), &[0, 0, 0, 9, 1, 2][..]);
    }

    #[test]
    fn test_size_including_field() {
        // the 4-byte size field counts itself: a 9-byte frame has a
        // 5-byte body
        let mut data = vec![0u8; 4];
        BigEndian::write_i32(&mut data, 9);
        data.extend_from_slice(b"hello");

        let mut stream = Cursor::new(data);
        let mut reader = StreamMsgReader::new(proto(true));

        while reader.state() == ReaderState::ReadNeeded {
            reader.read(&mut stream).unwrap();
        }

        assert_eq!(reader.state(), ReaderState::MsgReady);
        assert_eq!(reader.ready_msg(), b"hello");
    }

    #[test]
    fn test_size_including_field_smaller_than_field_is_invalid() {
        let mut data = vec![0u8; 4];
        BigEndian::write_i32(&mut data, 3);

        let mut stream = Cursor::new(data);
        let mut reader = StreamMsgReader::new(proto(true));

        while reader.state() == ReaderState::ReadNeeded {
            reader.read(&mut stream).unwrap();
        }

        assert_eq!(reader.state(), ReaderState::DataInvalid);
    }

    #[test]
    fn test_reset() {
        let mut reader = StreamMsgReader::new(proto(false));
        let mut stream = Cursor::new(frame(b"x"));

        while reader.state() == ReaderState::ReadNeeded {
            reader.read(&mut stream).unwrap();
        }

        assert_eq!(reader.state(), ReaderState::MsgReady);

        reader.reset();

        assert_eq!(reader.state(), ReaderState::ReadNeeded);
        assert!(reader.data().is_empty());
    }

    #[test]
    fn test_empty_message_body() {
        let mut stream = Cursor::new(frame(b""));
        let mut reader = StreamMsgReader::new(proto(false));

        while reader.state() == ReaderState::ReadNeeded {
            reader.read(&mut stream).unwrap();
        }

        assert_eq!(reader.state(), ReaderState::MsgReady);
        assert_eq!(reader.ready_msg(), b"");
    }
}
