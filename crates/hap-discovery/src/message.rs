//! DNS message: header plus the four record sections.

use crate::header::Header;
use crate::record::ResourceRecord;
use hap_core::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    header: Header,
    questions: Vec<ResourceRecord>,
    answers: Vec<ResourceRecord>,
    authorities: Vec<ResourceRecord>,
    additionals: Vec<ResourceRecord>,
}

impl Message {
    /// Build a message; header counts are recomputed from the sections.
    ///
    /// A section with more records than its 16 bit count can express is
    /// an error.
    pub fn new(
        header: Header,
        questions: Vec<ResourceRecord>,
        answers: Vec<ResourceRecord>,
        authorities: Vec<ResourceRecord>,
        additionals: Vec<ResourceRecord>,
    ) -> Result<Self> {
        let mut message = Self {
            header,
            questions,
            answers,
            authorities,
            additionals,
        };
        message.sync_counts()?;
        Ok(message)
    }

    fn sync_counts(&mut self) -> Result<()> {
        self.header.question_count = section_count("question", &self.questions)?;
        self.header.answer_count = section_count("answer", &self.answers)?;
        self.header.authority_count = section_count("authority", &self.authorities)?;
        self.header.additional_count = section_count("additional", &self.additionals)?;
        Ok(())
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn questions(&self) -> &[ResourceRecord] {
        &self.questions
    }

    pub fn answers(&self) -> &[ResourceRecord] {
        &self.answers
    }

    pub fn authorities(&self) -> &[ResourceRecord] {
        &self.authorities
    }

    pub fn additionals(&self) -> &[ResourceRecord] {
        &self.additionals
    }

    pub fn is_query(&self) -> bool {
        !self.header.response
    }
}

fn section_count(section: &str, records: &[ResourceRecord]) -> Result<u16> {
    u16::try_from(records.len()).map_err(|_| {
        Error::invalid_argument(format!(
            "DNS {} section has {} records, at most {} fit",
            section,
            records.len(),
            u16::MAX
        ))
    })
}
