use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter};

use super::ParseError;

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DNSHeader {
    pub id: u16,
    pub qr: bool,
    pub opcode: u8,
    pub aa: bool,
    pub tc: bool,
    pub rd: bool,
    pub ra: bool,
    pub z: u8,
    pub rcode: u8,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl DNSHeader {
    pub const WIRE_LEN: usize = 12;

    pub fn encode(&self) -> Result<[u8; Self::WIRE_LEN], ParseError> {
        let mut buf = Vec::with_capacity(Self::WIRE_LEN);
        {
            let mut writer = BitWriter::endian(&mut buf, BigEndian);
            writer.write_var::<u16>(16, self.id)?;
            writer.write_var::<u8>(1, self.qr as u8)?;
            writer.write_var::<u8>(4, self.opcode)?;
            writer.write_var::<u8>(1, self.aa as u8)?;
            writer.write_var::<u8>(1, self.tc as u8)?;
            writer.write_var::<u8>(1, self.rd as u8)?;
            writer.write_var::<u8>(1, self.ra as u8)?;
            writer.write_var::<u8>(3, self.z)?;
            writer.write_var::<u8>(4, self.rcode)?;
            writer.write_var::<u16>(16, self.qdcount)?;
            writer.write_var::<u16>(16, self.ancount)?;
            writer.write_var::<u16>(16, self.nscount)?;
            writer.write_var::<u16>(16, self.arcount)?;
        }
        buf.try_into()
            .map_err(|_| ParseError::UnexpectedEof)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < Self::WIRE_LEN {
            return Err(ParseError::UnexpectedEof);
        }
        let mut reader = BitReader::endian(&bytes[..Self::WIRE_LEN], BigEndian);
        Ok(DNSHeader {
            id: reader.read_var::<u16>(16)?,
            qr: reader.read_var::<u8>(1)? == 1,
            opcode: reader.read_var::<u8>(4)?,
            aa: reader.read_var::<u8>(1)? == 1,
            tc: reader.read_var::<u8>(1)? == 1,
            rd: reader.read_var::<u8>(1)? == 1,
            ra: reader.read_var::<u8>(1)? == 1,
            z: reader.read_var::<u8>(3)?,
            rcode: reader.read_var::<u8>(4)?,
            qdcount: reader.read_var::<u16>(16)?,
            ancount: reader.read_var::<u16>(16)?,
            nscount: reader.read_var::<u16>(16)?,
            arcount: reader.read_var::<u16>(16)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let header = DNSHeader {
            id: 0x1234,
            qr: true,
            opcode: 0,
            aa: false,
            tc: false,
            rd: true,
            ra: true,
            z: 0,
            rcode: 0,
            qdcount: 1,
            ancount: 2,
            nscount: 0,
            arcount: 0,
        };
        let bytes = header.encode().unwrap();
        let decoded = DNSHeader::decode(&bytes).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn rejects_short_input() {
        assert!(matches!(
            DNSHeader::decode(&[0u8; 4]),
            Err(ParseError::UnexpectedEof)
        ));
    }
}
