use std::borrow::Cow;

use bytes::{BufMut, ByteOrder, BytesMut};
use nom::be_i32;

use errors::Result;
use protocol::{ApiVersion, CorrelationId, ParseTag, WriteExt};

/// Header common to every request this engine sends.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestHeader<'a> {
    pub api_key: i16,
    pub api_version: ApiVersion,
    pub correlation_id: CorrelationId,
    pub client_id: Option<Cow<'a, str>>,
}

impl<'a> RequestHeader<'a> {
    pub fn encode<T: ByteOrder>(self, dst: &mut BytesMut) -> Result<()> {
        dst.put_i16::<T>(self.api_key);
        dst.put_i16::<T>(self.api_version);
        dst.put_i32::<T>(self.correlation_id);
        dst.put_str::<T, _>(self.client_id)
    }
}

/// Header common to every response frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseHeader {
    pub correlation_id: CorrelationId,
}

named!(pub parse_response_header<ResponseHeader>,
    parse_tag!(ParseTag::ResponseHeader,
        do_parse!(
            correlation_id: be_i32
         >> (ResponseHeader {
                correlation_id: correlation_id,
            })
        )
    )
);
