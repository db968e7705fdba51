//! DNS wire format: header, question, resource record, and full message
//! encode/decode, including name compression.

mod common;
mod enums;
mod header;
pub mod message;
mod question;
mod rdata;
mod resource;

pub use common::{read_name, write_name};
pub use enums::{DNSResourceClass, DNSResourceType};
pub use header::DNSHeader;
pub use message::Message;
pub use question::DNSQuestion;
pub use rdata::RData;
pub use resource::ResourceRecord;

/// Maximum label length per RFC 1035 (one octet length prefix, top two bits
/// reserved for compression pointers).
pub const MAX_LABEL_LEN: usize = 63;
/// Maximum encoded domain name length per RFC 1035.
pub const MAX_NAME_LEN: usize = 255;
/// Upper bound on pointer hops followed while decoding a compressed name;
/// guards against pointer loops without needing cycle detection.
pub const MAX_COMPRESSION_JUMPS: usize = 16;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected end of packet")]
    UnexpectedEof,
    #[error("invalid label encoding")]
    InvalidLabel,
    #[error("domain name exceeds {MAX_NAME_LEN} octets")]
    NameTooLong,
    #[error("label exceeds {MAX_LABEL_LEN} octets")]
    LabelTooLong,
    #[error("compression pointer references an invalid offset")]
    BadPointer,
    #[error("too many compression pointer jumps")]
    CompressionLoop,
    #[error("malformed resource record data")]
    InvalidRdata,
    #[error("section record count does not match header count")]
    CountMismatch,
}

impl From<std::io::Error> for ParseError {
    fn from(_: std::io::Error) -> Self {
        ParseError::UnexpectedEof
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("domain name exceeds {MAX_NAME_LEN} octets")]
    NameTooLong,
    #[error("label exceeds {MAX_LABEL_LEN} octets")]
    LabelTooLong,
    #[error("too many records for a u16 section count")]
    TooManyRecords,
}
