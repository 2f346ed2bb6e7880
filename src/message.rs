//! Utilities for encoding queries and decoding responses.
//!
//! Everything read from a response comes from an unauthenticated UDP peer,
//! so all reads go through `MsgReader`, which checks the remaining length
//! before touching the buffer and reports `DecodeError` instead of reading
//! past the end.

use std::net::Ipv4Addr;

use bytes::Bytes;
use thiserror::Error;

use crate::idna;
use crate::record::{Class, Record, RecordType, A};

/// Maximum size of a DNS message, in bytes.
pub const MESSAGE_LIMIT: usize = 512;

/// Maximum length of a name segment (i.e. a `.`-separated identifier).
pub const LABEL_LIMIT: usize = 63;

/// Maximum total length of a name, in encoded format.
pub const NAME_LIMIT: usize = 255;

/// Represents an error in decoding a DNS message.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum DecodeError {
    /// Message end was encountered before expected
    #[error("short message")]
    ShortMessage,
    /// Unable to decode invalid data
    #[error("invalid message")]
    InvalidMessage,
    /// An invalid name was encountered
    #[error("invalid name")]
    InvalidName,
}

/// Represents an error in encoding a DNS message.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum EncodeError {
    /// A name or label was too long or contained invalid characters
    #[error("invalid name value")]
    InvalidName,
    /// Message exceeded `MESSAGE_LIMIT` bytes
    #[error("message too long")]
    TooLong,
}

/// Reads a single DNS message from a series of bytes.
///
/// Every read checks the remaining length first.
pub struct MsgReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> MsgReader<'a> {
    /// Constructs a new message reader.
    pub fn new(data: &'a [u8]) -> MsgReader<'a> {
        MsgReader { data, pos: 0 }
    }

    /// Returns the number of bytes remaining in the message.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns the current read offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns the next `n` bytes and advances past them.
    /// Returns `Err(ShortMessage)` if there are not enough bytes remaining.
    pub fn read_slice(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if n > self.remaining() {
            return Err(DecodeError::ShortMessage);
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Advances past `n` bytes without looking at them.
    pub fn skip(&mut self, n: usize) -> Result<(), DecodeError> {
        self.read_slice(n).map(|_| ())
    }

    /// Reads a single byte from the message.
    pub fn read_byte(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_slice(1)?[0])
    }

    /// Reads a big-endian unsigned 16 bit integer.
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.read_slice(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Reads a big-endian unsigned 32 bit integer.
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.read_slice(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a name from the message.
    ///
    /// Labels are collected until the terminating zero-length label. A
    /// compression pointer is consumed but not followed; the labels read
    /// before it are returned and the name ends there.
    pub fn read_name(&mut self) -> Result<String, DecodeError> {
        let mut res = String::new();
        let mut total_read = 0;

        loop {
            let len = self.read_byte()?;

            if len & 0b1100_0000 == 0b1100_0000 {
                // Second byte of the pointer; the target is never visited.
                self.read_byte()?;
                break;
            } else if len & 0b1100_0000 != 0 {
                return Err(DecodeError::InvalidMessage);
            }

            if len == 0 {
                break;
            }

            total_read += 1 + len as usize;
            if total_read + 1 > NAME_LIMIT {
                return Err(DecodeError::InvalidName);
            }

            let seg = self.read_slice(len as usize)?;
            res.push_str(&String::from_utf8_lossy(seg));
            res.push('.');
        }

        if res.is_empty() {
            res.push('.');
        }

        Ok(res)
    }

    /// Advances past a name without collecting its labels.
    pub fn skip_name(&mut self) -> Result<(), DecodeError> {
        loop {
            let len = self.read_byte()?;

            match len & 0b1100_0000 {
                0b1100_0000 => return self.skip(1),
                0 if len == 0 => return Ok(()),
                0 => self.skip(len as usize)?,
                _ => return Err(DecodeError::InvalidMessage),
            }
        }
    }

    /// Reads a message header
    fn read_header(&mut self) -> Result<FullHeader, DecodeError> {
        let id = self.read_u16()?;
        let flags0 = self.read_byte()?;
        let flags1 = self.read_byte()?;

        // 1 bit: query or response flag
        let qr = flags0 & 0b1000_0000;
        // 4 bits: opcode
        let op = (flags0 & 0b0111_1000) >> 3;
        // 1 bit: authoritative answer flag
        let aa = flags0 & 0b0000_0100;
        // 1 bit: truncation flag
        let tc = flags0 & 0b0000_0010;
        // 1 bit: recursion desired flag
        let rd = flags0 & 0b0000_0001;

        // 1 bit: recursion available flag
        let ra = flags1 & 0b1000_0000;
        // 4 bits: response code
        let rc = flags1 & 0b0000_1111;

        let qd_count = self.read_u16()?;
        let an_count = self.read_u16()?;
        // Authority and additional counts; those sections are never read.
        self.skip(4)?;

        Ok(FullHeader {
            header: Header {
                id,
                qr: if qr == 0 { Qr::Query } else { Qr::Response },
                op: OpCode::from_u8(op),
                authoritative: aa != 0,
                truncated: tc != 0,
                recursion_desired: rd != 0,
                recursion_available: ra != 0,
                rcode: RCode::from_u8(rc),
            },
            qd_count,
            an_count,
        })
    }

    /// Reads a question item
    fn read_question(&mut self) -> Result<Question, DecodeError> {
        let name = self.read_name()?;
        let q_type = self.read_u16()?;
        let q_class = self.read_u16()?;

        Ok(Question {
            name,
            q_type: RecordType::from_u16(q_type),
            q_class: Class::from_u16(q_class),
        })
    }

    /// Reads an answer record. Only `A` records of class `IN` have their
    /// data interpreted; anything else is skipped by its advertised length.
    fn read_answer(&mut self) -> Result<Answer, DecodeError> {
        self.skip_name()?;

        let r_type = RecordType::from_u16(self.read_u16()?);
        let r_class = Class::from_u16(self.read_u16()?);
        let ttl = self.read_u32()?;
        let length = self.read_u16()? as usize;

        let data = self.read_slice(length)?;

        let address = if r_type == RecordType::A && r_class == Class::Internet {
            let mut r = MsgReader::new(data);
            let a = A::decode(&mut r)?;
            if r.remaining() != 0 {
                return Err(DecodeError::InvalidMessage);
            }
            Some(a.address)
        } else {
            None
        };

        Ok(Answer {
            r_type,
            r_class,
            ttl,
            address,
        })
    }
}

/// Writes a single DNS message as a series of bytes.
#[derive(Debug, Default)]
pub struct MsgWriter {
    data: Vec<u8>,
}

impl MsgWriter {
    /// Constructs a new, empty message writer.
    pub fn new() -> MsgWriter {
        MsgWriter {
            data: Vec::with_capacity(MESSAGE_LIMIT),
        }
    }

    /// Returns the number of bytes written so far.
    pub fn written(&self) -> usize {
        self.data.len()
    }

    /// Consumes the writer and returns the bytes written.
    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.data)
    }

    /// Writes a series of bytes to the message. Returns `Err(TooLong)` if the
    /// message would grow past `MESSAGE_LIMIT`.
    pub fn write(&mut self, data: &[u8]) -> Result<(), EncodeError> {
        if self.written() + data.len() > MESSAGE_LIMIT {
            return Err(EncodeError::TooLong);
        }
        self.data.extend_from_slice(data);
        Ok(())
    }

    /// Writes a single byte to the message.
    pub fn write_byte(&mut self, data: u8) -> Result<(), EncodeError> {
        self.write(&[data])
    }

    /// Writes an unsigned 16 bit integer in big-endian format.
    pub fn write_u16(&mut self, data: u16) -> Result<(), EncodeError> {
        self.write(&data.to_be_bytes())
    }

    /// Writes an unsigned 32 bit integer in big-endian format.
    pub fn write_u32(&mut self, data: u32) -> Result<(), EncodeError> {
        self.write(&data.to_be_bytes())
    }

    /// Writes a name to the message.
    pub fn write_name(&mut self, name: &str) -> Result<(), EncodeError> {
        if !is_valid_name(name) {
            return Err(EncodeError::InvalidName);
        }
        if name == "." {
            return self.write_byte(0);
        }

        let mut total_len = 0;

        for seg in name.trim_end_matches('.').split('.') {
            let seg = idna::to_ascii(seg).map_err(|_| EncodeError::InvalidName)?;

            if !is_valid_segment(&seg) || seg.len() > LABEL_LIMIT {
                return Err(EncodeError::InvalidName);
            }

            // Add the size octet and the segment length
            total_len += 1 + seg.len();

            if total_len + 1 > NAME_LIMIT {
                return Err(EncodeError::InvalidName);
            }

            self.write_byte(seg.len() as u8)?;
            self.write(seg.as_bytes())?;
        }

        self.write_byte(0)
    }

    /// Writes a message header with the given section counts.
    pub fn write_header(
        &mut self,
        header: &Header,
        counts: [u16; 4],
    ) -> Result<(), EncodeError> {
        let mut flags0 = 0;
        let mut flags1 = 0;

        // 1 bit: query or response flag
        flags0 |= (header.qr as u8 & 1) << 7;
        // 4 bits: opcode
        flags0 |= (header.op.to_u8() & 0b1111) << 3;
        // 1 bit: authoritative answer flag
        flags0 |= (header.authoritative as u8) << 2;
        // 1 bit: truncation flag
        flags0 |= (header.truncated as u8) << 1;
        // 1 bit: recursion desired flag
        flags0 |= header.recursion_desired as u8;

        // 1 bit: recursion available flag
        flags1 |= (header.recursion_available as u8) << 7;
        // 4 bits: response code
        flags1 |= header.rcode.to_u8() & 0b1111;

        self.write_u16(header.id)?;
        self.write_byte(flags0)?;
        self.write_byte(flags1)?;
        for count in counts {
            self.write_u16(count)?;
        }
        Ok(())
    }

    /// Writes a question item
    pub fn write_question(&mut self, question: &Question) -> Result<(), EncodeError> {
        self.write_name(&question.name)?;
        self.write_u16(question.q_type.to_u16())?;
        self.write_u16(question.q_class.to_u16())
    }
}

/// Encodes a standard query for a single name.
///
/// The header carries the given transaction id, has recursion desired set
/// and a question count of one; all other counts are zero.
pub fn encode_query(
    id: u16,
    name: &str,
    q_type: RecordType,
    q_class: Class,
) -> Result<Bytes, EncodeError> {
    let mut w = MsgWriter::new();
    let header = Header {
        recursion_desired: true,
        ..Header::with_id(id)
    };

    w.write_header(&header, [1, 0, 0, 0])?;
    w.write_question(&Question::new(name.to_owned(), q_type, q_class))?;
    Ok(w.into_bytes())
}

/// Decodes the parts of a response needed for address resolution: the
/// header, the question section and the answer section. Authority and
/// additional records are left unread.
pub fn decode_response(data: &[u8]) -> Result<Response, DecodeError> {
    let mut r = MsgReader::new(data);
    let full = r.read_header()?;

    // Counts come from the peer; allocation grows with what actually parses.
    let mut question = Vec::new();
    for _ in 0..full.qd_count {
        question.push(r.read_question()?);
    }

    let mut answer = Vec::new();
    for _ in 0..full.an_count {
        answer.push(r.read_answer()?);
    }

    Ok(Response {
        header: full.header,
        question,
        answer,
    })
}

/// Returns whether the given string appears to be a valid hostname.
/// The contents of the name (i.e. characters in labels) are not checked here;
/// only the structure of the name is validated.
fn is_valid_name(name: &str) -> bool {
    let len = name.len();
    len != 0 && (len == 1 || !name.starts_with('.')) && !name.contains("..")
}

/// Returns whether the given string constitutes a valid name segment.
/// This check is not as strict as internet DNS servers will be. It only checks
/// for basic sanity of input. If an invalid name is given, a DNS server will
/// respond that it doesn't exist, anyway.
fn is_valid_segment(s: &str) -> bool {
    !(s.is_empty() || s.starts_with('-') || s.ends_with('-'))
        && s.chars().all(|c| !(c.is_whitespace() || c.is_control()))
}

/// A decoded response.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Response {
    /// Message header
    pub header: Header,
    /// Question section
    pub question: Vec<Question>,
    /// Answer section
    pub answer: Vec<Answer>,
}

impl Response {
    /// Returns the IPv4 addresses carried by `A`/`IN` answer records, in
    /// the order they appear.
    pub fn addresses(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.answer.iter().filter_map(|a| a.address)
    }
}

/// Represents a message header.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Header {
    /// Transaction ID; corresponding replies will have the same ID.
    pub id: u16,
    /// Query or response
    pub qr: Qr,
    /// Kind of query
    pub op: OpCode,
    /// In a response, indicates that the responding name server is an authority
    /// for the domain name in question section.
    pub authoritative: bool,
    /// Indicates whether the message was truncated due to length greater than
    /// that permitted on the transmission channel.
    pub truncated: bool,
    /// In a query, directs the name server to pursue the query recursively.
    pub recursion_desired: bool,
    /// In a response, indicates whether recursive queries are available on the
    /// name server.
    pub recursion_available: bool,
    /// Response code
    pub rcode: RCode,
}

impl Header {
    /// Constructs a new `Header` with the given id value.
    pub fn with_id(id: u16) -> Header {
        Header {
            id,
            ..Default::default()
        }
    }
}

impl Default for Header {
    fn default() -> Header {
        Header {
            id: 0,
            qr: Qr::Query,
            op: OpCode::Query,
            authoritative: false,
            truncated: false,
            recursion_desired: false,
            recursion_available: false,
            rcode: RCode::NoError,
        }
    }
}

/// Header plus the section counts, which are only meaningful while reading.
struct FullHeader {
    header: Header,
    qd_count: u16,
    an_count: u16,
}

/// Represents a question item.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Question {
    /// Query name
    pub name: String,
    /// Query type
    pub q_type: RecordType,
    /// Query class
    pub q_class: Class,
}

impl Question {
    /// Constructs a new `Question`.
    pub fn new(name: String, q_type: RecordType, q_class: Class) -> Question {
        Question {
            name,
            q_type,
            q_class,
        }
    }

    /// Returns whether this question names `candidate`, ignoring case and a
    /// trailing root dot.
    pub fn names(&self, candidate: &str) -> bool {
        let a = self.name.trim_end_matches('.');
        let b = candidate.trim_end_matches('.');
        if a.eq_ignore_ascii_case(b) {
            return true;
        }
        // Unicode candidates go out as punycode.
        match idna::to_ascii(b) {
            Ok(b) => a.eq_ignore_ascii_case(&b),
            Err(_) => false,
        }
    }
}

/// An answer record.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Answer {
    /// Record type
    pub r_type: RecordType,
    /// Record class
    pub r_class: Class,
    /// Time-to-live
    pub ttl: u32,
    /// Host address, for `A`/`IN` records only
    pub address: Option<Ipv4Addr>,
}

/// Indicates a message is either a query or response.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Qr {
    /// Query
    Query = 0,
    /// Response
    Response = 1,
}

/// Represents the kind of message query.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OpCode {
    /// Query
    Query,
    /// Status
    Status,
    /// Notify
    Notify,
    /// Update
    Update,
    /// Unrecognized opcode
    Other(u8),
}

impl OpCode {
    /// Converts a `u8` to an `OpCode`.
    pub fn from_u8(u: u8) -> OpCode {
        match u {
            0 => OpCode::Query,
            2 => OpCode::Status,
            4 => OpCode::Notify,
            5 => OpCode::Update,
            n => OpCode::Other(n),
        }
    }

    /// Converts an `OpCode` to a `u8`.
    pub fn to_u8(self) -> u8 {
        match self {
            OpCode::Query => 0,
            OpCode::Status => 2,
            OpCode::Notify => 4,
            OpCode::Update => 5,
            OpCode::Other(n) => n,
        }
    }
}

/// Represents the response code of a message
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RCode {
    /// No error condition.
    NoError,
    /// The server was unable to interpret the query.
    FormatError,
    /// The name server was unable to process the query due to a failure of
    /// the name server.
    ServerFailure,
    /// Name referenced in query does not exist.
    NameError,
    /// Requested query kind is not supported by name server.
    NotImplemented,
    /// The name server refuses to perform the specified operation for policy
    /// reasons.
    Refused,
    /// Unknown response code.
    Other(u8),
}

impl RCode {
    /// Returns a description of the response code.
    pub fn description(self) -> &'static str {
        match self {
            RCode::NoError => "no error",
            RCode::FormatError => "format error",
            RCode::ServerFailure => "server failure",
            RCode::NameError => "no such name",
            RCode::NotImplemented => "not implemented",
            RCode::Refused => "refused",
            RCode::Other(_) => "unknown response code",
        }
    }

    /// Converts a `u8` to an `RCode`.
    pub fn from_u8(u: u8) -> RCode {
        match u {
            0 => RCode::NoError,
            1 => RCode::FormatError,
            2 => RCode::ServerFailure,
            3 => RCode::NameError,
            4 => RCode::NotImplemented,
            5 => RCode::Refused,
            n => RCode::Other(n),
        }
    }

    /// Converts an `RCode` to a `u8`.
    pub fn to_u8(self) -> u8 {
        match self {
            RCode::NoError => 0,
            RCode::FormatError => 1,
            RCode::ServerFailure => 2,
            RCode::NameError => 3,
            RCode::NotImplemented => 4,
            RCode::Refused => 5,
            RCode::Other(n) => n,
        }
    }
}

#[cfg(test)]
mod test {
    use std::net::Ipv4Addr;

    use super::{decode_response, encode_query, is_valid_name, NAME_LIMIT};
    use super::{DecodeError, EncodeError, Header, MsgReader, MsgWriter, Qr, RCode};
    use crate::record::{Class, RecordType};

    fn response_header(id: u16, rcode: RCode) -> Header {
        Header {
            qr: Qr::Response,
            recursion_desired: true,
            recursion_available: true,
            rcode,
            ..Header::with_id(id)
        }
    }

    #[test]
    fn test_encode_query() {
        let bytes = encode_query(0xabcd, "foo.bar.com", RecordType::A, Class::Internet).unwrap();

        assert_eq!(
            &bytes[..],
            &[
                0xab, 0xcd, 0b0000_0001, 0b0000_0000, 0, 1, 0, 0, 0, 0, 0, 0, 3, b'f', b'o',
                b'o', 3, b'b', b'a', b'r', 3, b'c', b'o', b'm', 0, 0, 1, 0, 1
            ][..]
        );
    }

    #[test]
    fn test_query_round_trip() {
        let bytes = encode_query(0x1234, "example.com", RecordType::A, Class::Internet).unwrap();
        let msg = decode_response(&bytes).unwrap();

        assert_eq!(msg.header.id, 0x1234);
        assert_eq!(msg.header.qr, Qr::Query);
        assert!(msg.header.recursion_desired);
        assert_eq!(msg.question.len(), 1);
        assert_eq!(msg.question[0].name, "example.com.");
        assert_eq!(msg.question[0].q_type, RecordType::A);
        assert_eq!(msg.question[0].q_class, Class::Internet);
        assert!(msg.question[0].names("EXAMPLE.com"));
        assert!(msg.answer.is_empty());
    }

    #[test]
    fn test_idna_name() {
        let bytes = encode_query(1, "bücher.de", RecordType::A, Class::Internet).unwrap();

        assert_eq!(&bytes[12..], &b"\x0dxn--bcher-kva\x02de\x00\x00\x01\x00\x01"[..]);

        let msg = decode_response(&bytes).unwrap();
        assert!(msg.question[0].names("bücher.de"));
    }

    #[test]
    fn test_decode_answers() {
        let mut w = MsgWriter::new();
        w.write_header(&response_header(7, RCode::NoError), [1, 3, 0, 0]).unwrap();
        w.write_name("www.example.com").unwrap();
        w.write_u16(1).unwrap();
        w.write_u16(1).unwrap();

        // CNAME pointing elsewhere, name compressed back to the question
        w.write(&[0xc0, 12]).unwrap();
        w.write_u16(5).unwrap();
        w.write_u16(1).unwrap();
        w.write_u32(300).unwrap();
        w.write_u16(6).unwrap();
        w.write(&[3, b'f', b'o', b'o', 0xc0, 16]).unwrap();

        // Two A records
        for last in [1, 2] {
            w.write(&[0xc0, 12]).unwrap();
            w.write_u16(1).unwrap();
            w.write_u16(1).unwrap();
            w.write_u32(60).unwrap();
            w.write_u16(4).unwrap();
            w.write(&[192, 0, 2, last]).unwrap();
        }

        let bytes = w.into_bytes();
        let msg = decode_response(&bytes).unwrap();

        assert_eq!(msg.header.id, 7);
        assert_eq!(msg.header.qr, Qr::Response);
        assert_eq!(msg.answer.len(), 3);
        assert_eq!(msg.answer[0].r_type, RecordType::CName);
        assert_eq!(msg.answer[0].address, None);
        assert_eq!(msg.answer[1].ttl, 60);
        assert_eq!(
            msg.addresses().collect::<Vec<_>>(),
            [Ipv4Addr::new(192, 0, 2, 1), Ipv4Addr::new(192, 0, 2, 2)]
        );
    }

    #[test]
    fn test_short_header() {
        for n in 0..12 {
            assert_eq!(
                decode_response(&[0u8; 12][..n]),
                Err(DecodeError::ShortMessage)
            );
        }
    }

    #[test]
    fn test_authority_sections_unread() {
        let mut w = MsgWriter::new();
        w.write_header(&response_header(3, RCode::NameError), [1, 0, 2, 5]).unwrap();
        w.write_name("gone.example").unwrap();
        w.write_u16(1).unwrap();
        w.write_u16(1).unwrap();
        // Truncated authority record, never looked at
        w.write(&[0xc0, 12, 0, 6]).unwrap();

        let bytes = w.into_bytes();
        let msg = decode_response(&bytes).unwrap();

        assert_eq!(msg.header.id, 3);
        assert_eq!(msg.header.rcode, RCode::NameError);
        assert_eq!(msg.question[0].name, "gone.example.");
        assert!(msg.answer.is_empty());
    }

    #[test]
    fn test_rdlength_past_end() {
        let mut w = MsgWriter::new();
        w.write_header(&response_header(9, RCode::NoError), [0, 1, 0, 0]).unwrap();
        w.write_name("a.example").unwrap();
        w.write_u16(1).unwrap();
        w.write_u16(1).unwrap();
        w.write_u32(60).unwrap();
        w.write_u16(200).unwrap();
        w.write(&[10, 0, 0, 1]).unwrap();

        let bytes = w.into_bytes();
        assert_eq!(decode_response(&bytes), Err(DecodeError::ShortMessage));
    }

    #[test]
    fn test_bad_a_length() {
        let mut w = MsgWriter::new();
        w.write_header(&response_header(9, RCode::NoError), [0, 1, 0, 0]).unwrap();
        w.write_name("a.example").unwrap();
        w.write_u16(1).unwrap();
        w.write_u16(1).unwrap();
        w.write_u32(60).unwrap();
        w.write_u16(5).unwrap();
        w.write(&[10, 0, 0, 1, 9]).unwrap();

        let bytes = w.into_bytes();
        assert_eq!(decode_response(&bytes), Err(DecodeError::InvalidMessage));
    }

    #[test]
    fn test_counts_beyond_data() {
        let mut w = MsgWriter::new();
        w.write_header(&response_header(3, RCode::NoError), [0, 0xffff, 0, 0]).unwrap();

        let bytes = w.into_bytes();
        assert_eq!(decode_response(&bytes), Err(DecodeError::ShortMessage));
    }

    #[test]
    fn test_label_past_end() {
        let mut data = vec![0, 1, 0x81, 0x80, 0, 1, 0, 0, 0, 0, 0, 0];
        data.extend_from_slice(&[40, b'a', b'b']);

        assert_eq!(decode_response(&data), Err(DecodeError::ShortMessage));
    }

    #[test]
    fn test_reserved_label_bits() {
        let mut r = MsgReader::new(&[0b0100_0001, b'a', 0]);
        assert_eq!(r.read_name(), Err(DecodeError::InvalidMessage));

        let mut r = MsgReader::new(&[0b1000_0001, b'a', 0]);
        assert_eq!(r.skip_name(), Err(DecodeError::InvalidMessage));
    }

    #[test]
    fn test_primitives() {
        let mut w = MsgWriter::new();

        w.write_byte(0x11).unwrap();
        w.write_u16(0x2233).unwrap();
        w.write_u32(0x44556677).unwrap();
        w.write_name("alpha.bravo.charlie").unwrap();
        w.write_name("delta.echo.foxtrot.").unwrap();
        w.write_name(".").unwrap();

        assert_eq!(w.write_name(""), Err(EncodeError::InvalidName));
        assert_eq!(
            w.write_name("ohmyglobhowdidthisgethereiamnotgoodwithcomputerrrrrrrrrrrrrrrrrr.org"),
            Err(EncodeError::InvalidName)
        );

        let bytes = w.into_bytes();

        assert_eq!(
            &bytes[..],
            &b"\
            \x11\
            \x22\x33\
            \x44\x55\x66\x77\
            \x05alpha\x05bravo\x07charlie\x00\
            \x05delta\x04echo\x07foxtrot\x00\
            \x00"[..]
        );

        let mut r = MsgReader::new(&bytes);

        assert_eq!(r.read_byte(), Ok(0x11));
        assert_eq!(r.read_u16(), Ok(0x2233));
        assert_eq!(r.read_u32(), Ok(0x44556677));
        assert_eq!(r.read_name().as_deref(), Ok("alpha.bravo.charlie."));
        assert_eq!(r.read_name().as_deref(), Ok("delta.echo.foxtrot."));
        assert_eq!(r.read_name().as_deref(), Ok("."));
        assert_eq!(r.remaining(), 0);
        assert_eq!(r.read_byte(), Err(DecodeError::ShortMessage));
    }

    const LONGEST_NAME: &str = "aaaaaaaaaaaaaaaaaaaaaaaa.aaaaaaaaaaaaaaaaaaaaaaaaa\
         aaaaaaaaaaaaaaaaaaaaaaaa.aaaaaaaaaaaaaaaaaaaaaaaaa\
         aaaaaaaaaaaaaaaaaaaaaaaa.aaaaaaaaaaaaaaaaaaaaaaaaa\
         aaaaaaaaaaaaaaaaaaaaaaaa.aaaaaaaaaaaaaaaaaaaaaaaaa\
         aaaaaaaaaaaaaaaaaaaaaaaa.aaaaaaaaaaaaaaaaaaaaaaaa\
         .com";
    const TOO_LONG_NAME: &str = "aaaaaaaaaaaaaaaaaaaaaaaa.aaaaaaaaaaaaaaaaaaaaaaaaa\
         aaaaaaaaaaaaaaaaaaaaaaaa.aaaaaaaaaaaaaaaaaaaaaaaaa\
         aaaaaaaaaaaaaaaaaaaaaaaa.aaaaaaaaaaaaaaaaaaaaaaaaa\
         aaaaaaaaaaaaaaaaaaaaaaaa.aaaaaaaaaaaaaaaaaaaaaaaaa\
         aaaaaaaaaaaaaaaaaaaaaaaa.aaaaaaaaaaaaaaaaaaaaaaaaa\
         .com";

    #[test]
    fn test_encode_name_limits() {
        let mut w = MsgWriter::new();
        w.write_name(LONGEST_NAME).unwrap();
        assert_eq!(w.written(), NAME_LIMIT);

        let bytes = w.into_bytes();
        let mut r = MsgReader::new(&bytes);
        assert_eq!(r.read_name().map(|s| s.len()), Ok(LONGEST_NAME.len() + 1));

        let mut w = MsgWriter::new();
        assert_eq!(w.write_name(TOO_LONG_NAME), Err(EncodeError::InvalidName));
        assert_eq!(
            encode_query(1, TOO_LONG_NAME, RecordType::A, Class::Internet),
            Err(EncodeError::InvalidName)
        );
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("."));
        assert!(is_valid_name("foo.com."));
        assert!(is_valid_name("foo-123.com."));
        assert!(is_valid_name("FOO-BAR.COM"));

        assert!(!is_valid_name(""));
        assert!(!is_valid_name(".foo.com"));
        assert!(!is_valid_name("foo..bar.com"));
    }
}
