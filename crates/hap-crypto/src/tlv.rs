//! TLV8 encoding/decoding for HomeKit pairing messages.
//!
//! TLV8 format: [Type: 1 byte][Length: 1 byte][Value: 0-255 bytes]
//! Values longer than 255 bytes are fragmented across consecutive items
//! sharing the same type. A stream may hold several records split by a
//! zero-length separator item.

use hap_core::error::{Error, Result};

/// Largest value carried by a single item.
const MAX_CHUNK: usize = 255;

/// TLV type codes used by pair-setup, pair-verify and pairings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TlvType {
    Method = 0x00,
    Identifier = 0x01,
    Salt = 0x02,
    PublicKey = 0x03,
    Proof = 0x04,
    EncryptedData = 0x05,
    State = 0x06,
    Error = 0x07,
    RetryDelay = 0x08,
    Certificate = 0x09,
    Signature = 0x0A,
    Permissions = 0x0B,
    FragmentData = 0x0C,
    FragmentLast = 0x0D,
    Separator = 0xFF,
}

/// How the value of a type is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlvKind {
    /// Single byte unsigned integer.
    Integer,
    /// UTF-8 text.
    Text,
    Bytes,
    Separator,
}

/// Typed TLV value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlvValue {
    Integer(u8),
    Text(String),
    Bytes(Vec<u8>),
}

/// Pairing methods carried in [`TlvType::Method`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TlvMethod {
    Reserved = 0,
    PairSetup = 1,
    PairVerify = 2,
    AddPairing = 3,
    RemovePairing = 4,
    ListPairings = 5,
}

/// Protocol steps carried in [`TlvType::State`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum TlvState {
    M1 = 1,
    M2 = 2,
    M3 = 3,
    M4 = 4,
    M5 = 5,
    M6 = 6,
}

/// Error codes carried in [`TlvType::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TlvError {
    Unknown = 0x01,
    Authentication = 0x02,
    Backoff = 0x03,
    MaxPeers = 0x04,
    MaxTries = 0x05,
    Unavailable = 0x06,
    Busy = 0x07,
}

/// One decoded TLV8 record, items kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tlv8 {
    items: Vec<(TlvType, TlvValue)>,
}

impl TlvType {
    /// Convert from raw byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Self::Method),
            0x01 => Some(Self::Identifier),
            0x02 => Some(Self::Salt),
            0x03 => Some(Self::PublicKey),
            0x04 => Some(Self::Proof),
            0x05 => Some(Self::EncryptedData),
            0x06 => Some(Self::State),
            0x07 => Some(Self::Error),
            0x08 => Some(Self::RetryDelay),
            0x09 => Some(Self::Certificate),
            0x0A => Some(Self::Signature),
            0x0B => Some(Self::Permissions),
            0x0C => Some(Self::FragmentData),
            0x0D => Some(Self::FragmentLast),
            0xFF => Some(Self::Separator),
            _ => None,
        }
    }

    pub fn kind(&self) -> TlvKind {
        match self {
            Self::Method | Self::State | Self::Error | Self::RetryDelay | Self::Permissions => {
                TlvKind::Integer
            }
            Self::Identifier => TlvKind::Text,
            Self::Separator => TlvKind::Separator,
            _ => TlvKind::Bytes,
        }
    }
}

impl TlvValue {
    fn kind(&self) -> TlvKind {
        match self {
            Self::Integer(_) => TlvKind::Integer,
            Self::Text(_) => TlvKind::Text,
            Self::Bytes(_) => TlvKind::Bytes,
        }
    }

    fn as_wire_bytes(&self) -> Vec<u8> {
        match self {
            Self::Integer(v) => vec![*v],
            Self::Text(s) => s.as_bytes().to_vec(),
            Self::Bytes(b) => b.clone(),
        }
    }
}

impl TlvMethod {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Reserved),
            1 => Some(Self::PairSetup),
            2 => Some(Self::PairVerify),
            3 => Some(Self::AddPairing),
            4 => Some(Self::RemovePairing),
            5 => Some(Self::ListPairings),
            _ => None,
        }
    }
}

impl TlvState {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::M1),
            2 => Some(Self::M2),
            3 => Some(Self::M3),
            4 => Some(Self::M4),
            5 => Some(Self::M5),
            6 => Some(Self::M6),
            _ => None,
        }
    }
}

impl TlvError {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::Unknown),
            0x02 => Some(Self::Authentication),
            0x03 => Some(Self::Backoff),
            0x04 => Some(Self::MaxPeers),
            0x05 => Some(Self::MaxTries),
            0x06 => Some(Self::Unavailable),
            0x07 => Some(Self::Busy),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Authentication => "Authentication",
            Self::Backoff => "Backoff (rate limited)",
            Self::MaxPeers => "MaxPeers",
            Self::MaxTries => "MaxTries",
            Self::Unavailable => "Unavailable",
            Self::Busy => "Busy",
        }
    }
}

impl Tlv8 {
    /// Create empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a stream and return its last record.
    ///
    /// Request bodies carry a single record; when several are present the
    /// final one wins.
    pub fn parse(data: &[u8]) -> Result<Self> {
        Ok(decode(data)?.pop().unwrap_or_default())
    }

    /// Encode this record on its own.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(std::slice::from_ref(self))
    }

    /// Set a value, replacing an existing item of the same type in place.
    pub fn set(&mut self, typ: TlvType, value: TlvValue) {
        match self.items.iter_mut().find(|(t, _)| *t == typ) {
            Some(slot) => slot.1 = value,
            None => self.items.push((typ, value)),
        }
    }

    /// Builder form of [`Tlv8::set`].
    pub fn with(mut self, typ: TlvType, value: TlvValue) -> Self {
        self.set(typ, value);
        self
    }

    pub fn with_state(self, state: TlvState) -> Self {
        self.with(TlvType::State, TlvValue::Integer(state as u8))
    }

    pub fn with_error(self, error: TlvError) -> Self {
        self.with(TlvType::Error, TlvValue::Integer(error as u8))
    }

    pub fn with_bytes(self, typ: TlvType, bytes: impl Into<Vec<u8>>) -> Self {
        self.with(typ, TlvValue::Bytes(bytes.into()))
    }

    pub fn with_text(self, typ: TlvType, text: impl Into<String>) -> Self {
        self.with(typ, TlvValue::Text(text.into()))
    }

    pub fn with_integer(self, typ: TlvType, value: u8) -> Self {
        self.with(typ, TlvValue::Integer(value))
    }

    /// Get value for type.
    pub fn get(&self, typ: TlvType) -> Option<&TlvValue> {
        self.items.iter().find(|(t, _)| *t == typ).map(|(_, v)| v)
    }

    pub fn get_integer(&self, typ: TlvType) -> Option<u8> {
        match self.get(typ) {
            Some(TlvValue::Integer(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_text(&self, typ: TlvType) -> Option<&str> {
        match self.get(typ) {
            Some(TlvValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn get_bytes(&self, typ: TlvType) -> Option<&[u8]> {
        match self.get(typ) {
            Some(TlvValue::Bytes(b)) => Some(b.as_slice()),
            _ => None,
        }
    }

    /// Check if type is present.
    pub fn contains(&self, typ: TlvType) -> bool {
        self.get(typ).is_some()
    }

    pub fn state(&self) -> Option<u8> {
        self.get_integer(TlvType::State)
    }

    pub fn method(&self) -> Option<u8> {
        self.get_integer(TlvType::Method)
    }

    pub fn error(&self) -> Option<u8> {
        self.get_integer(TlvType::Error)
    }

    /// Get error description string.
    pub fn error_description(&self) -> Option<String> {
        let code = self.error()?;
        let name = TlvError::from_byte(code)
            .map(|e| e.description())
            .unwrap_or("Unknown error code");

        let mut desc = format!("Error 0x{:02x}: {}", code, name);

        if let Some(delay) = self.get_integer(TlvType::RetryDelay) {
            if delay > 0 {
                desc.push_str(&format!(" (retry after {} seconds)", delay));
            }
        }

        Some(desc)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(TlvType, TlvValue)> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Encode records, inserting a separator between consecutive records.
pub fn encode(records: &[Tlv8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();

    for (index, record) in records.iter().enumerate() {
        if index > 0 {
            out.push(TlvType::Separator as u8);
            out.push(0);
        }

        for (typ, value) in &record.items {
            if typ.kind() != value.kind() {
                return Err(Error::invalid_argument(format!(
                    "Provided TLV value does not match code 0x{:02x}",
                    *typ as u8
                )));
            }

            write_item(&mut out, *typ as u8, &value.as_wire_bytes());
        }
    }

    Ok(out)
}

fn write_item(out: &mut Vec<u8>, code: u8, value: &[u8]) {
    if value.len() <= MAX_CHUNK {
        out.push(code);
        out.push(value.len() as u8);
        out.extend_from_slice(value);
        return;
    }

    for chunk in value.chunks(MAX_CHUNK) {
        out.push(code);
        out.push(chunk.len() as u8);
        out.extend_from_slice(chunk);
    }

    // A full last chunk would read as "more to come", mark the end explicitly.
    if value.len() % MAX_CHUNK == 0 {
        out.push(code);
        out.push(0);
    }
}

/// Decode a TLV8 stream into its records.
///
/// Consecutive items of the same type are concatenated into one value.
pub fn decode(data: &[u8]) -> Result<Vec<Tlv8>> {
    let mut records = Vec::new();
    let mut current = Tlv8::new();
    let mut pending: Option<(TlvType, Vec<u8>)> = None;
    let mut i = 0;

    while i < data.len() {
        let typ = TlvType::from_byte(data[i])
            .ok_or_else(|| Error::invalid_argument("Provided TLV code in data is not valid"))?;
        i += 1;

        let len = *data
            .get(i)
            .ok_or_else(|| Error::invalid_argument("Provided data are not valid TLV data"))?
            as usize;
        i += 1;

        if i + len > data.len() {
            return Err(Error::invalid_argument(format!(
                "Provided data are not valid TLV data: expected {} bytes, got {}",
                len,
                data.len() - i
            )));
        }

        let value = &data[i..i + len];
        i += len;

        if typ == TlvType::Separator {
            if len != 0 {
                return Err(Error::invalid_argument(format!(
                    "TLV separator must be empty, got {} bytes",
                    len
                )));
            }
            flush(&mut current, pending.take())?;
            records.push(std::mem::take(&mut current));
            continue;
        }

        if typ.kind() == TlvKind::Integer && len != 1 {
            return Err(Error::invalid_argument(
                "Only short (1-byte length) integers is supported",
            ));
        }

        match pending.as_mut() {
            Some((pending_typ, buffer))
                if *pending_typ == typ && typ.kind() != TlvKind::Integer =>
            {
                buffer.extend_from_slice(value);
            }
            _ => {
                flush(&mut current, pending.take())?;
                pending = Some((typ, value.to_vec()));
            }
        }
    }

    flush(&mut current, pending.take())?;

    if !current.is_empty() || !records.is_empty() {
        records.push(current);
    }

    Ok(records)
}

fn flush(record: &mut Tlv8, pending: Option<(TlvType, Vec<u8>)>) -> Result<()> {
    let Some((typ, raw)) = pending else {
        return Ok(());
    };

    let value = match typ.kind() {
        TlvKind::Integer => TlvValue::Integer(raw[0]),
        TlvKind::Text => TlvValue::Text(
            String::from_utf8(raw)
                .map_err(|_| Error::invalid_argument("Unable to decode string from bytes"))?,
        ),
        TlvKind::Bytes => TlvValue::Bytes(raw),
        TlvKind::Separator => return Ok(()),
    };

    record.set(typ, value);
    Ok(())
}
