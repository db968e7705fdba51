//! Typed resource-record data. Named types the proxy constructs directly
//! (A/AAAA for flattening) or needs to inspect (CNAME) get a typed variant;
//! everything else round-trips as an opaque byte blob so pass-through never
//! loses information.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use super::{DNSResourceType, EncodeError, ParseError, read_name, write_name};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RData {
    A(Ipv4Addr),
    AAAA(Ipv6Addr),
    CNAME(Vec<String>),
    NS(Vec<String>),
    PTR(Vec<String>),
    SOA {
        mname: Vec<String>,
        rname: Vec<String>,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    MX {
        preference: u16,
        exchange: Vec<String>,
    },
    TXT(Vec<Vec<u8>>),
    SRV {
        priority: u16,
        weight: u16,
        port: u16,
        target: Vec<String>,
    },
    /// Pass-through for any RR type outside the named set above (HTTPS/SVCB,
    /// CAA, OPT, ...). Keeps the wire type code so it round-trips instead of
    /// re-encoding as type 0.
    Opaque { rtype: DNSResourceType, data: Vec<u8> },
}

impl RData {
    /// `data` is the whole message buffer (needed so embedded domain names
    /// can follow compression pointers); `start`/`len` bound this record's
    /// rdata within it.
    pub fn decode(
        rtype: DNSResourceType,
        data: &[u8],
        start: usize,
        len: usize,
    ) -> Result<Self, ParseError> {
        let raw = data.get(start..start + len).ok_or(ParseError::UnexpectedEof)?;
        Ok(match rtype {
            DNSResourceType::A => {
                let octets: [u8; 4] = raw.try_into().map_err(|_| ParseError::InvalidRdata)?;
                RData::A(Ipv4Addr::from(octets))
            }
            DNSResourceType::AAAA => {
                let octets: [u8; 16] = raw.try_into().map_err(|_| ParseError::InvalidRdata)?;
                RData::AAAA(Ipv6Addr::from(octets))
            }
            DNSResourceType::CNAME => RData::CNAME(read_name(data, start)?.0),
            DNSResourceType::NS => RData::NS(read_name(data, start)?.0),
            DNSResourceType::PTR => RData::PTR(read_name(data, start)?.0),
            DNSResourceType::SOA => {
                let (mname, mname_len) = read_name(data, start)?;
                let mut pos = start + mname_len;
                let (rname, rname_len) = read_name(data, pos)?;
                pos += rname_len;
                let field = |pos: usize| -> Result<u32, ParseError> {
                    Ok(u32::from_be_bytes(
                        data.get(pos..pos + 4)
                            .ok_or(ParseError::UnexpectedEof)?
                            .try_into()
                            .unwrap(),
                    ))
                };
                let serial = field(pos)?;
                let refresh = field(pos + 4)?;
                let retry = field(pos + 8)?;
                let expire = field(pos + 12)?;
                let minimum = field(pos + 16)?;
                RData::SOA {
                    mname,
                    rname,
                    serial,
                    refresh,
                    retry,
                    expire,
                    minimum,
                }
            }
            DNSResourceType::MX => {
                let preference = u16::from_be_bytes(
                    data.get(start..start + 2)
                        .ok_or(ParseError::UnexpectedEof)?
                        .try_into()
                        .unwrap(),
                );
                let (exchange, _) = read_name(data, start + 2)?;
                RData::MX {
                    preference,
                    exchange,
                }
            }
            DNSResourceType::TXT => {
                let mut strings = Vec::new();
                let mut pos = 0usize;
                while pos < raw.len() {
                    let slen = raw[pos] as usize;
                    pos += 1;
                    let s = raw.get(pos..pos + slen).ok_or(ParseError::InvalidRdata)?;
                    strings.push(s.to_vec());
                    pos += slen;
                }
                RData::TXT(strings)
            }
            DNSResourceType::SRV => {
                let field16 = |off: usize| -> Result<u16, ParseError> {
                    Ok(u16::from_be_bytes(
                        data.get(start + off..start + off + 2)
                            .ok_or(ParseError::UnexpectedEof)?
                            .try_into()
                            .unwrap(),
                    ))
                };
                let priority = field16(0)?;
                let weight = field16(2)?;
                let port = field16(4)?;
                let (target, _) = read_name(data, start + 6)?;
                RData::SRV {
                    priority,
                    weight,
                    port,
                    target,
                }
            }
            DNSResourceType::ANY | DNSResourceType::Other(_) => RData::Opaque {
                rtype,
                data: raw.to_vec(),
            },
        })
    }

    pub fn encode(
        &self,
        buf: &mut Vec<u8>,
        compression: &mut HashMap<String, u16>,
    ) -> Result<(), EncodeError> {
        match self {
            RData::A(addr) => buf.extend_from_slice(&addr.octets()),
            RData::AAAA(addr) => buf.extend_from_slice(&addr.octets()),
            RData::CNAME(name) | RData::NS(name) | RData::PTR(name) => {
                write_name(buf, name, compression)?
            }
            RData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                write_name(buf, mname, compression)?;
                write_name(buf, rname, compression)?;
                buf.extend_from_slice(&serial.to_be_bytes());
                buf.extend_from_slice(&refresh.to_be_bytes());
                buf.extend_from_slice(&retry.to_be_bytes());
                buf.extend_from_slice(&expire.to_be_bytes());
                buf.extend_from_slice(&minimum.to_be_bytes());
            }
            RData::MX {
                preference,
                exchange,
            } => {
                buf.extend_from_slice(&preference.to_be_bytes());
                write_name(buf, exchange, compression)?;
            }
            RData::TXT(strings) => {
                for s in strings {
                    if s.len() > 255 {
                        return Err(EncodeError::LabelTooLong);
                    }
                    buf.push(s.len() as u8);
                    buf.extend_from_slice(s);
                }
            }
            RData::SRV {
                priority,
                weight,
                port,
                target,
            } => {
                buf.extend_from_slice(&priority.to_be_bytes());
                buf.extend_from_slice(&weight.to_be_bytes());
                buf.extend_from_slice(&port.to_be_bytes());
                write_name(buf, target, compression)?;
            }
            RData::Opaque { data, .. } => buf.extend_from_slice(data),
        }
        Ok(())
    }

    pub fn rtype(&self) -> DNSResourceType {
        match self {
            RData::A(_) => DNSResourceType::A,
            RData::AAAA(_) => DNSResourceType::AAAA,
            RData::CNAME(_) => DNSResourceType::CNAME,
            RData::NS(_) => DNSResourceType::NS,
            RData::PTR(_) => DNSResourceType::PTR,
            RData::SOA { .. } => DNSResourceType::SOA,
            RData::MX { .. } => DNSResourceType::MX,
            RData::TXT(_) => DNSResourceType::TXT,
            RData::SRV { .. } => DNSResourceType::SRV,
            RData::Opaque { rtype, .. } => *rtype,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(rtype: DNSResourceType, rdata: &RData) -> RData {
        let mut buf = Vec::new();
        let mut map = HashMap::new();
        rdata.encode(&mut buf, &mut map).unwrap();
        RData::decode(rtype, &buf, 0, buf.len()).unwrap()
    }

    #[test]
    fn a_record_round_trips() {
        let rdata = RData::A(Ipv4Addr::new(93, 184, 216, 34));
        assert_eq!(roundtrip(DNSResourceType::A, &rdata), rdata);
    }

    #[test]
    fn aaaa_record_round_trips() {
        let rdata = RData::AAAA(Ipv6Addr::LOCALHOST);
        assert_eq!(roundtrip(DNSResourceType::AAAA, &rdata), rdata);
    }

    #[test]
    fn cname_round_trips() {
        let rdata = RData::CNAME(vec!["foo".into(), "test".into()]);
        assert_eq!(roundtrip(DNSResourceType::CNAME, &rdata), rdata);
    }

    #[test]
    fn txt_round_trips_multiple_strings() {
        let rdata = RData::TXT(vec![b"hello".to_vec(), b"world".to_vec()]);
        assert_eq!(roundtrip(DNSResourceType::TXT, &rdata), rdata);
    }

    #[test]
    fn unknown_type_is_opaque() {
        let raw = vec![1, 2, 3, 4];
        let decoded = RData::decode(DNSResourceType::Other(65000), &raw, 0, raw.len()).unwrap();
        assert_eq!(
            decoded,
            RData::Opaque {
                rtype: DNSResourceType::Other(65000),
                data: raw
            }
        );
    }

    #[test]
    fn opaque_preserves_wire_type_code_on_reencode() {
        // HTTPS/SVCB = 65; must not collapse to type 0 on re-encode.
        let rdata = RData::Opaque {
            rtype: DNSResourceType::Other(65),
            data: vec![0, 1, 0, 3, 2, b'h', b'2'],
        };
        assert_eq!(rdata.rtype(), DNSResourceType::Other(65));
        assert_eq!(u16::from(rdata.rtype()), 65);
    }
}
