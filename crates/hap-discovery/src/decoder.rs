//! DNS wire decoding.
//!
//! Parsing state lives in a [`Cursor`]; every step reads from it and leaves
//! it positioned after what it consumed.

use crate::header::{Header, HEADER_LEN};
use crate::message::Message;
use crate::record::{RData, RecordType, ResourceRecord, Soa, Srv};
use hap_core::error::{Error, Result};
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::trace;

/// Compression pointers followed before a name is considered looping.
const MAX_POINTER_HOPS: usize = 32;

/// Read position over a complete message.
///
/// Compression pointers are offsets into the whole message, so rdata is
/// read through the same cursor rather than a sub-slice.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    fn truncated(&self, what: &str) -> Error {
        Error::invalid_argument(format!(
            "Message truncated while reading {} at offset {}",
            what, self.pos
        ))
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let b = *self.data.get(self.pos).ok_or_else(|| self.truncated("u8"))?;
        self.pos += 1;
        Ok(b)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(self.truncated("bytes"));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Read a possibly compressed domain name.
    ///
    /// Returns `"."` for the root, otherwise labels joined with a trailing dot.
    pub fn read_name(&mut self) -> Result<String> {
        let mut name = String::new();
        let mut pos = self.pos;
        let mut resume_at = None;
        let mut hops = 0;

        loop {
            let len = *self.data.get(pos).ok_or_else(|| self.truncated("name"))? as usize;

            match len & 0xC0 {
                0x00 => {
                    pos += 1;
                    if len == 0 {
                        break;
                    }
                    let label = self
                        .data
                        .get(pos..pos + len)
                        .ok_or_else(|| self.truncated("label"))?;
                    name.push_str(&String::from_utf8_lossy(label));
                    name.push('.');
                    pos += len;
                }
                0xC0 => {
                    let low = *self.data.get(pos + 1).ok_or_else(|| self.truncated("pointer"))?;
                    hops += 1;
                    if hops > MAX_POINTER_HOPS {
                        return Err(Error::invalid_argument("Compression pointer loop"));
                    }
                    resume_at.get_or_insert(pos + 2);
                    pos = ((len & 0x3F) << 8) | low as usize;
                }
                _ => {
                    return Err(Error::invalid_argument(format!(
                        "Unsupported label type 0x{:02x}",
                        len
                    )))
                }
            }
        }

        self.pos = resume_at.unwrap_or(pos);

        if name.is_empty() {
            name.push('.');
        }
        Ok(name)
    }
}

pub fn decode_message(data: &[u8]) -> Result<Message> {
    let mut cursor = Cursor::new(data);
    let header = decode_header(&mut cursor)?;

    let questions = decode_records(&mut cursor, header.question_count, true)?;
    let answers = decode_records(&mut cursor, header.answer_count, false)?;
    let authorities = decode_records(&mut cursor, header.authority_count, false)?;
    let additionals = decode_records(&mut cursor, header.additional_count, false)?;

    Message::new(header, questions, answers, authorities, additionals)
}

pub fn decode_header(cursor: &mut Cursor<'_>) -> Result<Header> {
    if cursor.remaining() < HEADER_LEN {
        return Err(Error::invalid_state("Header could not be decoded"));
    }

    let mut header = Header {
        id: cursor.read_u16()?,
        ..Default::default()
    };
    header.set_flags(cursor.read_u16()?);
    header.question_count = cursor.read_u16()?;
    header.answer_count = cursor.read_u16()?;
    header.authority_count = cursor.read_u16()?;
    header.additional_count = cursor.read_u16()?;

    Ok(header)
}

/// Decode a standalone domain name.
pub fn decode_domain_name(data: &[u8]) -> Result<String> {
    Cursor::new(data).read_name()
}

/// Decode `count` records, dropping the ones whose rdata cannot be read.
pub fn decode_records(
    cursor: &mut Cursor<'_>,
    count: u16,
    question: bool,
) -> Result<Vec<ResourceRecord>> {
    let mut records = Vec::with_capacity(count as usize);

    for _ in 0..count {
        let name = cursor.read_name()?;
        let rtype = RecordType::from_code(cursor.read_u16()?);
        let class = cursor.read_u16()?;

        if question {
            records.push(ResourceRecord::question(name, rtype, class));
            continue;
        }

        let ttl = cursor.read_u32()?;
        let rdlen = cursor.read_u16()? as usize;
        let rdata_start = cursor.position();
        let rdata_end = rdata_start + rdlen;

        if cursor.remaining() < rdlen {
            return Err(Error::invalid_argument(format!(
                "Record {} declares {} rdata bytes, only {} left",
                name,
                rdlen,
                cursor.remaining()
            )));
        }

        let decoded = decode_rdata(cursor, rtype, rdlen);
        cursor.seek(rdata_end);

        match decoded {
            Ok(rdata) => records.push(ResourceRecord {
                name,
                rtype,
                class,
                ttl,
                rdata: Some(rdata),
                question: false,
            }),
            Err(e) if e.is_unsupported_type() => {
                trace!(name = %name, rtype = rtype.code(), "Skipping unsupported record type");
            }
            Err(e) => {
                trace!(name = %name, error = %e, "Skipping malformed record");
            }
        }
    }

    Ok(records)
}

/// Decode rdata starting at the cursor position.
pub fn decode_rdata(cursor: &mut Cursor<'_>, rtype: RecordType, rdlen: usize) -> Result<RData> {
    let end = cursor.position() + rdlen;

    let rdata = match rtype {
        RecordType::A => {
            let b = cursor.read_bytes(4)?;
            RData::A(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
        }
        RecordType::Aaaa => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(cursor.read_bytes(16)?);
            RData::Aaaa(Ipv6Addr::from(octets))
        }
        RecordType::Cname => RData::Cname(cursor.read_name()?),
        RecordType::Dname => RData::Dname(cursor.read_name()?),
        RecordType::Ns => RData::Ns(cursor.read_name()?),
        RecordType::Ptr => RData::Ptr(cursor.read_name()?),
        RecordType::Soa => RData::Soa(Soa {
            mname: cursor.read_name()?,
            rname: cursor.read_name()?,
            serial: cursor.read_u32()?,
            refresh: cursor.read_u32()?,
            retry: cursor.read_u32()?,
            expire: cursor.read_u32()?,
            minimum: cursor.read_u32()?,
        }),
        RecordType::Mx => RData::Mx {
            preference: cursor.read_u16()?,
            exchange: cursor.read_name()?,
        },
        RecordType::Txt => {
            let mut strings = Vec::new();
            while cursor.position() < end {
                let len = cursor.read_u8()? as usize;
                let bytes = cursor.read_bytes(len)?;
                if !bytes.is_empty() {
                    strings.push(String::from_utf8_lossy(bytes).into_owned());
                }
            }
            RData::Txt(strings)
        }
        RecordType::Srv => RData::Srv(Srv {
            priority: cursor.read_u16()?,
            weight: cursor.read_u16()?,
            port: cursor.read_u16()?,
            target: cursor.read_name()?,
        }),
        RecordType::Any | RecordType::Other(_) => {
            return Err(Error::UnsupportedType(format!(
                "Record type {} is not a supported type",
                rtype.code()
            )))
        }
    };

    if cursor.position() > end {
        return Err(Error::invalid_argument("Record data overruns declared length"));
    }

    Ok(rdata)
}
