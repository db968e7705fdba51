//! A resource record: owning name, class, TTL, and typed rdata.

use std::collections::HashMap;

use super::{DNSResourceClass, DNSResourceType, EncodeError, ParseError, RData, read_name, write_name};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceRecord {
    pub labels: Vec<String>,
    pub rclass: DNSResourceClass,
    pub ttl: u32,
    pub rdata: RData,
}

impl ResourceRecord {
    pub fn new(name: &str, rclass: DNSResourceClass, ttl: u32, rdata: RData) -> Self {
        ResourceRecord {
            labels: name.trim_end_matches('.').split('.').map(String::from).collect(),
            rclass,
            ttl,
            rdata,
        }
    }

    pub fn name(&self) -> String {
        self.labels.join(".")
    }

    pub fn rtype(&self) -> DNSResourceType {
        self.rdata.rtype()
    }

    /// Decode starting at `pos` in the full message buffer; returns the
    /// record and the offset immediately after it.
    pub fn decode(data: &[u8], pos: usize) -> Result<(Self, usize), ParseError> {
        let (labels, name_len) = read_name(data, pos)?;
        let mut cursor = pos + name_len;

        let field16 = |data: &[u8], at: usize| -> Result<u16, ParseError> {
            Ok(u16::from_be_bytes(
                data.get(at..at + 2).ok_or(ParseError::UnexpectedEof)?.try_into().unwrap(),
            ))
        };

        let rtype: DNSResourceType = field16(data, cursor)?.into();
        cursor += 2;
        let rclass: DNSResourceClass = field16(data, cursor)?.into();
        cursor += 2;
        let ttl = u32::from_be_bytes(
            data.get(cursor..cursor + 4)
                .ok_or(ParseError::UnexpectedEof)?
                .try_into()
                .unwrap(),
        );
        cursor += 4;
        let rdlength = field16(data, cursor)? as usize;
        cursor += 2;

        let rdata = RData::decode(rtype, data, cursor, rdlength)?;
        cursor += rdlength;

        Ok((
            ResourceRecord {
                labels,
                rclass,
                ttl,
                rdata,
            },
            cursor,
        ))
    }

    pub fn encode(&self, buf: &mut Vec<u8>, compression: &mut HashMap<String, u16>) -> Result<(), EncodeError> {
        write_name(buf, &self.labels, compression)?;
        buf.extend_from_slice(&u16::from(self.rtype()).to_be_bytes());
        buf.extend_from_slice(&u16::from(self.rclass).to_be_bytes());
        buf.extend_from_slice(&self.ttl.to_be_bytes());

        let rdlength_pos = buf.len();
        buf.extend_from_slice(&[0, 0]);
        let rdata_start = buf.len();
        self.rdata.encode(buf, compression)?;
        let rdlength = buf.len() - rdata_start;
        if rdlength > u16::MAX as usize {
            return Err(EncodeError::TooManyRecords);
        }
        buf[rdlength_pos..rdlength_pos + 2].copy_from_slice(&(rdlength as u16).to_be_bytes());

        Ok(())
    }
}
