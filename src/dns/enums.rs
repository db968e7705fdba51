//! DNS RR type/class codes.
//!
//! Scoped to the set the proxy constructs or passes through (A, NS, CNAME,
//! SOA, PTR, MX, TXT, AAAA, SRV, ANY) plus `Other(u16)` so a record type
//! outside that set still round-trips its numeric code on pass-through.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DNSResourceType {
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    TXT,
    AAAA,
    SRV,
    ANY,
    Other(u16),
}

impl Default for DNSResourceType {
    fn default() -> Self {
        DNSResourceType::Other(0)
    }
}

impl DNSResourceType {
    pub fn is_address(self) -> bool {
        matches!(self, DNSResourceType::A | DNSResourceType::AAAA)
    }
}

impl From<u16> for DNSResourceType {
    fn from(value: u16) -> Self {
        match value {
            1 => DNSResourceType::A,
            2 => DNSResourceType::NS,
            5 => DNSResourceType::CNAME,
            6 => DNSResourceType::SOA,
            12 => DNSResourceType::PTR,
            15 => DNSResourceType::MX,
            16 => DNSResourceType::TXT,
            28 => DNSResourceType::AAAA,
            33 => DNSResourceType::SRV,
            255 => DNSResourceType::ANY,
            other => DNSResourceType::Other(other),
        }
    }
}

impl From<DNSResourceType> for u16 {
    fn from(value: DNSResourceType) -> Self {
        match value {
            DNSResourceType::A => 1,
            DNSResourceType::NS => 2,
            DNSResourceType::CNAME => 5,
            DNSResourceType::SOA => 6,
            DNSResourceType::PTR => 12,
            DNSResourceType::MX => 15,
            DNSResourceType::TXT => 16,
            DNSResourceType::AAAA => 28,
            DNSResourceType::SRV => 33,
            DNSResourceType::ANY => 255,
            DNSResourceType::Other(value) => value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DNSResourceClass {
    IN,
    CH,
    HS,
    ANY,
    Other(u16),
}

impl Default for DNSResourceClass {
    fn default() -> Self {
        DNSResourceClass::IN
    }
}

impl From<u16> for DNSResourceClass {
    fn from(value: u16) -> Self {
        match value {
            1 => DNSResourceClass::IN,
            3 => DNSResourceClass::CH,
            4 => DNSResourceClass::HS,
            255 => DNSResourceClass::ANY,
            other => DNSResourceClass::Other(other),
        }
    }
}

impl From<DNSResourceClass> for u16 {
    fn from(value: DNSResourceClass) -> Self {
        match value {
            DNSResourceClass::IN => 1,
            DNSResourceClass::CH => 3,
            DNSResourceClass::HS => 4,
            DNSResourceClass::ANY => 255,
            DNSResourceClass::Other(value) => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_named_types() {
        for t in [
            DNSResourceType::A,
            DNSResourceType::NS,
            DNSResourceType::CNAME,
            DNSResourceType::SOA,
            DNSResourceType::PTR,
            DNSResourceType::MX,
            DNSResourceType::TXT,
            DNSResourceType::AAAA,
            DNSResourceType::SRV,
            DNSResourceType::ANY,
        ] {
            let code: u16 = t.into();
            assert_eq!(DNSResourceType::from(code), t);
        }
    }

    #[test]
    fn preserves_unknown_type_code() {
        let t = DNSResourceType::from(65280);
        assert_eq!(t, DNSResourceType::Other(65280));
        assert_eq!(u16::from(t), 65280);
    }
}
