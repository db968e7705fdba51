//! The full DNS message: header plus the four sections, with whole-message
//! encode/decode (including name compression) and the manipulation helpers
//! the resolver needs.

use std::collections::HashMap;

use tracing::debug;

use super::{DNSHeader, DNSQuestion, DNSResourceType, EncodeError, ParseError, ResourceRecord};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    pub header: DNSHeader,
    pub questions: Vec<DNSQuestion>,
    pub answers: Vec<ResourceRecord>,
    pub authorities: Vec<ResourceRecord>,
    pub additional: Vec<ResourceRecord>,
}

/// DNS response codes used at the resolver boundary (§7 of the design).
pub mod rcode {
    pub const NO_ERROR: u8 = 0;
    pub const FORMAT_ERROR: u8 = 1;
    pub const SERVER_FAILURE: u8 = 2;
}

impl Message {
    pub fn decode(bytes: &[u8]) -> Result<Self, ParseError> {
        let header = DNSHeader::decode(bytes)?;
        let mut pos = DNSHeader::WIRE_LEN;

        let mut questions = Vec::with_capacity(header.qdcount as usize);
        for _ in 0..header.qdcount {
            let (q, next) = DNSQuestion::decode(bytes, pos)?;
            questions.push(q);
            pos = next;
        }
        if questions.len() != header.qdcount as usize {
            return Err(ParseError::CountMismatch);
        }

        let mut decode_section = |count: u16, pos: &mut usize| -> Result<Vec<ResourceRecord>, ParseError> {
            let mut records = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let (rr, next) = ResourceRecord::decode(bytes, *pos)?;
                records.push(rr);
                *pos = next;
            }
            Ok(records)
        };

        let answers = decode_section(header.ancount, &mut pos)?;
        let authorities = decode_section(header.nscount, &mut pos)?;
        let additional = decode_section(header.arcount, &mut pos)?;

        if pos < bytes.len() {
            debug!(trailing = bytes.len() - pos, "ignoring trailing bytes after declared sections");
        }

        Ok(Message {
            header,
            questions,
            answers,
            authorities,
            additional,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut header = self.header.clone();
        header.qdcount = self.questions.len() as u16;
        header.ancount = self.answers.len() as u16;
        header.nscount = self.authorities.len() as u16;
        header.arcount = self.additional.len() as u16;

        let mut buf = Vec::with_capacity(512);
        buf.extend_from_slice(&header.encode().map_err(|_| EncodeError::TooManyRecords)?);

        let mut compression = HashMap::new();
        for q in &self.questions {
            q.encode(&mut buf, &mut compression)?;
        }
        for rr in self.answers.iter().chain(&self.authorities).chain(&self.additional) {
            rr.encode(&mut buf, &mut compression)?;
        }
        Ok(buf)
    }

    pub fn first_question(&self) -> Option<&DNSQuestion> {
        self.questions.first()
    }

    pub fn records_of_type(&self, rtype: DNSResourceType) -> impl Iterator<Item = &ResourceRecord> {
        self.answers.iter().filter(move |rr| rr.rtype() == rtype)
    }

    pub fn any_cname_anywhere(&self) -> bool {
        self.answers
            .iter()
            .chain(&self.authorities)
            .chain(&self.additional)
            .any(|rr| rr.rtype() == DNSResourceType::CNAME)
    }

    pub fn clear_authority_and_additional(&mut self) {
        self.authorities.clear();
        self.additional.clear();
    }

    pub fn retain_answers(&mut self, mut keep: impl FnMut(&ResourceRecord) -> bool) {
        self.answers.retain(|rr| keep(rr));
    }

    pub fn strip_type_from_all_sections(&mut self, rtype: DNSResourceType) {
        self.answers.retain(|rr| rr.rtype() != rtype);
        self.authorities.retain(|rr| rr.rtype() != rtype);
        self.additional.retain(|rr| rr.rtype() != rtype);
    }

    /// Build a response header that answers `query`: copies id and RD, sets
    /// QR/RA, and the given rcode. Leaves the question section untouched —
    /// callers preserve the original question verbatim per §4.8 step 8.
    pub fn new_response(query: &Message, rcode: u8) -> Message {
        Message {
            header: DNSHeader {
                id: query.header.id,
                qr: true,
                opcode: query.header.opcode,
                aa: false,
                tc: false,
                rd: query.header.rd,
                ra: true,
                z: 0,
                rcode,
                qdcount: query.questions.len() as u16,
                ancount: 0,
                nscount: 0,
                arcount: 0,
            },
            questions: query.questions.clone(),
            answers: Vec::new(),
            authorities: Vec::new(),
            additional: Vec::new(),
        }
    }

    /// Pop additional (then authority) RRs and set TC until the encoded
    /// message fits within `max_len`, per §4.9. Returns the final bytes.
    pub fn truncate_for_udp(&mut self, max_len: usize) -> Result<Vec<u8>, EncodeError> {
        loop {
            let bytes = self.encode()?;
            if bytes.len() <= max_len {
                return Ok(bytes);
            }
            if !self.additional.is_empty() {
                self.additional.pop();
            } else if !self.authorities.is_empty() {
                self.authorities.pop();
            } else if !self.answers.is_empty() {
                self.answers.pop();
            } else {
                self.header.tc = true;
                return self.encode();
            }
            self.header.tc = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{DNSResourceClass, RData};
    use std::net::Ipv4Addr;

    fn sample_query(name: &str, qtype: DNSResourceType) -> Message {
        Message {
            header: DNSHeader {
                id: 0x1234,
                rd: true,
                qdcount: 1,
                ..Default::default()
            },
            questions: vec![DNSQuestion {
                labels: name.split('.').map(String::from).collect(),
                qtype,
                qclass: DNSResourceClass::IN,
            }],
            answers: vec![],
            authorities: vec![],
            additional: vec![],
        }
    }

    #[test]
    fn round_trips_a_response() {
        let mut msg = sample_query("example.com", DNSResourceType::A);
        msg.answers.push(ResourceRecord::new(
            "example.com",
            DNSResourceClass::IN,
            60,
            RData::A(Ipv4Addr::new(93, 184, 216, 34)),
        ));
        let bytes = msg.encode().unwrap();
        let decoded = Message::decode(&bytes).unwrap();
        assert_eq!(decoded.header.id, 0x1234);
        assert_eq!(decoded.answers.len(), 1);
        assert_eq!(decoded.answers[0].rdata, RData::A(Ipv4Addr::new(93, 184, 216, 34)));
    }

    #[test]
    fn new_response_preserves_question_and_id() {
        let query = sample_query("example.com", DNSResourceType::A);
        let response = Message::new_response(&query, rcode::NO_ERROR);
        assert_eq!(response.header.id, query.header.id);
        assert_eq!(response.questions, query.questions);
        assert!(response.header.qr);
        assert!(response.header.ra);
    }

    #[test]
    fn truncate_sets_tc_and_fits() {
        let mut msg = sample_query("example.com", DNSResourceType::A);
        for i in 0..40u8 {
            msg.answers.push(ResourceRecord::new(
                "example.com",
                DNSResourceClass::IN,
                60,
                RData::A(Ipv4Addr::new(10, 0, 0, i)),
            ));
        }
        let bytes = msg.truncate_for_udp(100).unwrap();
        assert!(bytes.len() <= 100);
        assert!(msg.header.tc);
    }
}
