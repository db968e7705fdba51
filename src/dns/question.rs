use std::collections::HashMap;

use super::{DNSResourceClass, DNSResourceType, EncodeError, ParseError, read_name, write_name};

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DNSQuestion {
    pub labels: Vec<String>,
    pub qtype: DNSResourceType,
    pub qclass: DNSResourceClass,
}

impl DNSQuestion {
    pub fn name(&self) -> String {
        self.labels.join(".")
    }

    pub fn encode(
        &self,
        buf: &mut Vec<u8>,
        compression: &mut HashMap<String, u16>,
    ) -> Result<(), EncodeError> {
        write_name(buf, &self.labels, compression)?;
        buf.extend_from_slice(&u16::from(self.qtype).to_be_bytes());
        buf.extend_from_slice(&u16::from(self.qclass).to_be_bytes());
        Ok(())
    }

    /// Decode starting at `pos` in the full message buffer; returns the
    /// question and the offset immediately after it.
    pub fn decode(data: &[u8], pos: usize) -> Result<(Self, usize), ParseError> {
        let (labels, name_len) = read_name(data, pos)?;
        let mut cursor = pos + name_len;
        let qtype = u16::from_be_bytes(
            data.get(cursor..cursor + 2)
                .ok_or(ParseError::UnexpectedEof)?
                .try_into()
                .unwrap(),
        )
        .into();
        cursor += 2;
        let qclass = u16::from_be_bytes(
            data.get(cursor..cursor + 2)
                .ok_or(ParseError::UnexpectedEof)?
                .try_into()
                .unwrap(),
        )
        .into();
        cursor += 2;
        Ok((
            DNSQuestion {
                labels,
                qtype,
                qclass,
            },
            cursor,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let q = DNSQuestion {
            labels: vec!["example".into(), "com".into()],
            qtype: DNSResourceType::A,
            qclass: DNSResourceClass::IN,
        };
        let mut buf = Vec::new();
        let mut map = HashMap::new();
        q.encode(&mut buf, &mut map).unwrap();
        let (decoded, consumed) = DNSQuestion::decode(&buf, 0).unwrap();
        assert_eq!(decoded, q);
        assert_eq!(consumed, buf.len());
    }
}
