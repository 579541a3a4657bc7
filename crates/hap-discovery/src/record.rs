//! Resource records and their typed rdata.

use std::net::{Ipv4Addr, Ipv6Addr};

/// Internet class.
pub const CLASS_IN: u16 = 1;

/// mDNS reuses the class top bit for cache-flush / unicast-response.
pub const CLASS_MASK: u16 = 0x7FFF;

/// Record types known to the codec.
///
/// Anything else is carried as [`RecordType::Other`] in questions and
/// skipped when it appears in an answer section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    Ns,
    Cname,
    Soa,
    Ptr,
    Mx,
    Txt,
    Aaaa,
    Srv,
    Dname,
    Any,
    Other(u16),
}

impl RecordType {
    pub fn code(&self) -> u16 {
        match self {
            Self::A => 1,
            Self::Ns => 2,
            Self::Cname => 5,
            Self::Soa => 6,
            Self::Ptr => 12,
            Self::Mx => 15,
            Self::Txt => 16,
            Self::Aaaa => 28,
            Self::Srv => 33,
            Self::Dname => 39,
            Self::Any => 255,
            Self::Other(code) => *code,
        }
    }

    pub fn from_code(code: u16) -> Self {
        match code {
            1 => Self::A,
            2 => Self::Ns,
            5 => Self::Cname,
            6 => Self::Soa,
            12 => Self::Ptr,
            15 => Self::Mx,
            16 => Self::Txt,
            28 => Self::Aaaa,
            33 => Self::Srv,
            39 => Self::Dname,
            255 => Self::Any,
            other => Self::Other(other),
        }
    }

    /// True for types whose rdata the codec can read and write.
    pub fn has_rdata_codec(&self) -> bool {
        !matches!(self, Self::Any | Self::Other(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Soa {
    pub mname: String,
    pub rname: String,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Srv {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    pub target: String,
}

/// Typed rdata of a supported record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Cname(String),
    Dname(String),
    Ns(String),
    Ptr(String),
    Soa(Soa),
    Mx { preference: u16, exchange: String },
    /// Character strings, each at most 255 bytes on the wire.
    Txt(Vec<String>),
    Srv(Srv),
}

impl RData {
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::A(_) => RecordType::A,
            Self::Aaaa(_) => RecordType::Aaaa,
            Self::Cname(_) => RecordType::Cname,
            Self::Dname(_) => RecordType::Dname,
            Self::Ns(_) => RecordType::Ns,
            Self::Ptr(_) => RecordType::Ptr,
            Self::Soa(_) => RecordType::Soa,
            Self::Mx { .. } => RecordType::Mx,
            Self::Txt(_) => RecordType::Txt,
            Self::Srv(_) => RecordType::Srv,
        }
    }
}

/// One entry of any message section.
///
/// Questions carry no ttl or rdata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub name: String,
    pub rtype: RecordType,
    pub class: u16,
    pub ttl: u32,
    pub rdata: Option<RData>,
    pub question: bool,
}

impl ResourceRecord {
    pub fn question(name: impl Into<String>, rtype: RecordType, class: u16) -> Self {
        Self {
            name: name.into(),
            rtype,
            class,
            ttl: 0,
            rdata: None,
            question: true,
        }
    }

    pub fn new(name: impl Into<String>, class: u16, ttl: u32, rdata: RData) -> Self {
        Self {
            name: name.into(),
            rtype: rdata.record_type(),
            class,
            ttl,
            rdata: Some(rdata),
            question: false,
        }
    }

    /// Name comparison ignoring case and a trailing dot.
    pub fn name_matches(&self, other: &str) -> bool {
        self.name
            .trim_end_matches('.')
            .eq_ignore_ascii_case(other.trim_end_matches('.'))
    }

    pub fn class_matches(&self, class: u16) -> bool {
        self.class & CLASS_MASK == class & CLASS_MASK
    }
}
