//! DNS wire encoding.
//!
//! Names are always written uncompressed.

use crate::header::{Header, HEADER_LEN};
use crate::message::Message;
use crate::record::{RData, ResourceRecord};
use hap_core::error::{Error, Result};

const MAX_LABEL_LEN: usize = 63;
const MAX_TXT_STRING_LEN: usize = 255;

pub fn encode_message(message: &Message) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(512);
    encode_header(message.header(), &mut out);

    for section in [
        message.questions(),
        message.answers(),
        message.authorities(),
        message.additionals(),
    ] {
        for record in section {
            encode_record(record, &mut out)?;
        }
    }

    Ok(out)
}

pub fn encode_header(header: &Header, out: &mut Vec<u8>) {
    let start = out.len();
    for word in [
        header.id,
        header.flags(),
        header.question_count,
        header.answer_count,
        header.authority_count,
        header.additional_count,
    ] {
        out.extend_from_slice(&word.to_be_bytes());
    }
    debug_assert_eq!(out.len() - start, HEADER_LEN);
}

/// Encode a domain name as length-prefixed labels.
///
/// A trailing dot is optional; `"."` is the root and encodes to one zero byte.
pub fn encode_domain_name(name: &str) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(name.len() + 2);
    write_domain_name(name, &mut out)?;
    Ok(out)
}

fn write_domain_name(name: &str, out: &mut Vec<u8>) -> Result<()> {
    let trimmed = name.trim_end_matches('.');

    if !trimmed.is_empty() {
        for label in trimmed.split('.') {
            if label.is_empty() || label.len() > MAX_LABEL_LEN {
                return Err(Error::invalid_argument(format!(
                    "Domain name {:?} has an invalid label",
                    name
                )));
            }
            out.push(label.len() as u8);
            out.extend_from_slice(label.as_bytes());
        }
    }

    out.push(0);
    Ok(())
}

pub fn encode_record(record: &ResourceRecord, out: &mut Vec<u8>) -> Result<()> {
    write_domain_name(&record.name, out)?;
    out.extend_from_slice(&record.rtype.code().to_be_bytes());
    out.extend_from_slice(&record.class.to_be_bytes());

    if record.question {
        return Ok(());
    }

    let rdata = match &record.rdata {
        Some(rdata) => encode_rdata(rdata)?,
        None => Vec::new(),
    };

    if rdata.len() > u16::MAX as usize {
        return Err(Error::invalid_argument("Record data exceeds 65535 bytes"));
    }

    out.extend_from_slice(&record.ttl.to_be_bytes());
    out.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
    out.extend_from_slice(&rdata);
    Ok(())
}

pub fn encode_rdata(rdata: &RData) -> Result<Vec<u8>> {
    let mut out = Vec::new();

    match rdata {
        RData::A(addr) => out.extend_from_slice(&addr.octets()),
        RData::Aaaa(addr) => out.extend_from_slice(&addr.octets()),
        RData::Cname(name) | RData::Dname(name) | RData::Ns(name) | RData::Ptr(name) => {
            write_domain_name(name, &mut out)?
        }
        RData::Soa(soa) => {
            write_domain_name(&soa.mname, &mut out)?;
            write_domain_name(&soa.rname, &mut out)?;
            for value in [soa.serial, soa.refresh, soa.retry, soa.expire, soa.minimum] {
                out.extend_from_slice(&value.to_be_bytes());
            }
        }
        RData::Mx {
            preference,
            exchange,
        } => {
            out.extend_from_slice(&preference.to_be_bytes());
            write_domain_name(exchange, &mut out)?;
        }
        RData::Txt(strings) => {
            for s in strings {
                let bytes = truncate_utf8(s, MAX_TXT_STRING_LEN);
                out.push(bytes.len() as u8);
                out.extend_from_slice(bytes);
            }
            // An empty TXT record still carries one empty string.
            if strings.is_empty() {
                out.push(0);
            }
        }
        RData::Srv(srv) => {
            out.extend_from_slice(&srv.priority.to_be_bytes());
            out.extend_from_slice(&srv.weight.to_be_bytes());
            out.extend_from_slice(&srv.port.to_be_bytes());
            write_domain_name(&srv.target, &mut out)?;
        }
    }

    Ok(out)
}

fn truncate_utf8(s: &str, max: usize) -> &[u8] {
    if s.len() <= max {
        return s.as_bytes();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s.as_bytes()[..end]
}
