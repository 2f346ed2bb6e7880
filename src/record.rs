//! DNS resource record types

use std::net::Ipv4Addr;

use crate::message::{DecodeError, EncodeError, MsgReader, MsgWriter};

/// Represents the class of data in a message.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Class {
    /// Internet (`IN`)
    Internet,
    /// Any (`*`)
    Any,
    /// An unrecognized class
    Other(u16),
}

impl Class {
    /// Converts a `u16` to a `Class`.
    pub fn from_u16(u: u16) -> Class {
        match u {
            1 => Class::Internet,
            255 => Class::Any,
            n => Class::Other(n),
        }
    }

    /// Converts a `Class` to a `u16`.
    pub fn to_u16(self) -> u16 {
        match self {
            Class::Internet => 1,
            Class::Any => 255,
            Class::Other(n) => n,
        }
    }
}

/// Represents the type of data in a message.
///
/// Only `A` records are interpreted; the other named types exist so that
/// logs and decoded answers can say what was skipped.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RecordType {
    /// An IPv4 host address
    A,
    /// An IPv6 host address
    AAAA,
    /// Canonical name for an alias
    CName,
    /// Authoritative name server
    Ns,
    /// Start of authority
    Soa,
    /// Unrecognized record type
    Other(u16),
}

macro_rules! record_types {
    ( $( $name:ident => $code:expr , )+ ) => {
        impl RecordType {
            /// Converts a `u16` to a `RecordType`.
            pub fn from_u16(u: u16) -> RecordType {
                match u {
                    $( $code => RecordType::$name , )+
                    n => RecordType::Other(n),
                }
            }

            /// Converts a `RecordType` to a `u16`.
            pub fn to_u16(self) -> u16 {
                match self {
                    $( RecordType::$name => $code , )+
                    RecordType::Other(n) => n,
                }
            }
        }
    }
}

record_types! {
    A => 1,
    AAAA => 28,
    CName => 5,
    Ns => 2,
    Soa => 6,
}

/// Represents resource record data.
pub trait Record: Sized {
    /// Decodes the `Record` from resource rdata.
    fn decode(data: &mut MsgReader) -> Result<Self, DecodeError>;

    /// Encodes the `Record` to resource rdata.
    fn encode(&self, data: &mut MsgWriter) -> Result<(), EncodeError>;

    /// Returns the `RecordType` of queries for this record.
    fn record_type() -> RecordType;
}

/// An IPv4 host address
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct A {
    /// The host address
    pub address: Ipv4Addr,
}

impl Record for A {
    fn decode(data: &mut MsgReader) -> Result<Self, DecodeError> {
        let buf = data.read_slice(4)?;
        Ok(A {
            address: Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]),
        })
    }

    fn encode(&self, data: &mut MsgWriter) -> Result<(), EncodeError> {
        data.write(&self.address.octets())
    }

    fn record_type() -> RecordType {
        RecordType::A
    }
}

#[cfg(test)]
mod test {
    use std::net::Ipv4Addr;

    use super::{Class, Record, RecordType, A};
    use crate::message::{DecodeError, MsgReader, MsgWriter};

    #[test]
    fn test_codes() {
        assert_eq!(RecordType::from_u16(1), RecordType::A);
        assert_eq!(RecordType::from_u16(28), RecordType::AAAA);
        assert_eq!(RecordType::from_u16(99), RecordType::Other(99));
        assert_eq!(RecordType::CName.to_u16(), 5);

        assert_eq!(Class::from_u16(1), Class::Internet);
        assert_eq!(Class::from_u16(3), Class::Other(3));
        assert_eq!(Class::Any.to_u16(), 255);
    }

    #[test]
    fn test_a() {
        let mut w = MsgWriter::new();
        A { address: Ipv4Addr::new(1, 2, 3, 4) }.encode(&mut w).unwrap();
        let bytes = w.into_bytes();

        assert_eq!(&bytes[..], &[1, 2, 3, 4]);
        assert_eq!(A::record_type(), RecordType::A);

        let mut r = MsgReader::new(&bytes[..3]);
        assert_eq!(A::decode(&mut r), Err(DecodeError::ShortMessage));
    }
}
