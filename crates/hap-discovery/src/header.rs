//! DNS message header.

/// Header length on the wire.
pub const HEADER_LEN: usize = 12;

/// The fixed 12-byte header of a DNS message.
///
/// The section counts are owned by [`crate::Message`], which rewrites them
/// from its record lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    pub id: u16,
    /// QR bit, set on responses.
    pub response: bool,
    pub opcode: u8,
    pub authoritative: bool,
    pub truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    pub z: u8,
    pub rcode: u8,
    pub question_count: u16,
    pub answer_count: u16,
    pub authority_count: u16,
    pub additional_count: u16,
}

impl Header {
    /// Pack the flag bits into the second header word.
    pub fn flags(&self) -> u16 {
        (self.response as u16) << 15
            | (self.opcode as u16 & 0xF) << 11
            | (self.authoritative as u16) << 10
            | (self.truncated as u16) << 9
            | (self.recursion_desired as u16) << 8
            | (self.recursion_available as u16) << 7
            | (self.z as u16 & 0x7) << 4
            | (self.rcode as u16 & 0xF)
    }

    /// Unpack the flag word into this header.
    pub fn set_flags(&mut self, flags: u16) {
        self.response = flags >> 15 & 0x1 == 1;
        self.opcode = (flags >> 11 & 0xF) as u8;
        self.authoritative = flags >> 10 & 0x1 == 1;
        self.truncated = flags >> 9 & 0x1 == 1;
        self.recursion_desired = flags >> 8 & 0x1 == 1;
        self.recursion_available = flags >> 7 & 0x1 == 1;
        self.z = (flags >> 4 & 0x7) as u8;
        self.rcode = (flags & 0xF) as u8;
    }
}
