//! Pre- and post-decode validation. Rejects malformed or oversized input
//! before any resource (cache slot, upstream socket, rate-limit bucket) is
//! allocated.

use crate::dns::{DNSResourceType, Message};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("packet size {0} bytes below minimum")]
    PacketTooSmall(usize),
    #[error("packet size {0} bytes exceeds transport maximum")]
    PacketTooLarge(usize),
    #[error("question count {0} outside allowed range")]
    InvalidQuestionCount(usize),
    #[error("domain name exceeds 255 octets")]
    DomainNameTooLong,
    #[error("label exceeds 63 octets")]
    LabelTooLong,
    #[error("label has invalid characters or hyphen placement: {0}")]
    InvalidLabelFormat(String),
    #[error("query type {0:?} is not in the allowed set")]
    DisallowedQueryType(DNSResourceType),
    #[error("response record count {0} exceeds maximum")]
    TooManyRecords(usize),
}

/// Transport-level size bounds from spec §4.2.
pub const UDP_MIN_SIZE: usize = 12;
pub const UDP_MAX_SIZE: usize = 512;
pub const TCP_MIN_SIZE: usize = 12;
pub const TCP_MAX_SIZE: usize = 65535;
pub const MIN_QUESTIONS: usize = 1;
pub const MAX_QUESTIONS: usize = 10;
pub const MAX_SECTION_RECORDS: usize = 100;

const ALLOWED_QUERY_TYPES: &[DNSResourceType] = &[
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
];

#[derive(Debug, Clone, Copy)]
pub enum Transport {
    Udp,
    Tcp,
}

/// Checks raw bytes before decoding (§4.2 "Pre-decoding checks").
pub fn validate_raw_size(len: usize, transport: Transport) -> Result<(), ValidationError> {
    let (min, max) = match transport {
        Transport::Udp => (UDP_MIN_SIZE, UDP_MAX_SIZE),
        Transport::Tcp => (TCP_MIN_SIZE, TCP_MAX_SIZE),
    };
    if len < min {
        return Err(ValidationError::PacketTooSmall(len));
    }
    if len > max {
        return Err(ValidationError::PacketTooLarge(len));
    }
    Ok(())
}

/// Checks a decoded query message (§4.2 "Post-decoding checks").
pub fn validate_query(message: &Message) -> Result<(), ValidationError> {
    let qcount = message.questions.len();
    if !(MIN_QUESTIONS..=MAX_QUESTIONS).contains(&qcount) {
        return Err(ValidationError::InvalidQuestionCount(qcount));
    }

    for question in &message.questions {
        validate_name(&question.labels)?;
        if !ALLOWED_QUERY_TYPES.contains(&question.qtype) {
            return Err(ValidationError::DisallowedQueryType(question.qtype));
        }
    }

    Ok(())
}

/// Checks a decoded response message before it is forwarded to a client or
/// cached.
pub fn validate_response(message: &Message) -> Result<(), ValidationError> {
    let total = message.answers.len() + message.authorities.len() + message.additional.len();
    if total > MAX_SECTION_RECORDS {
        return Err(ValidationError::TooManyRecords(total));
    }
    Ok(())
}

pub fn validate_name(labels: &[String]) -> Result<(), ValidationError> {
    let total_len: usize = labels.iter().map(|l| l.len() + 1).sum();
    if total_len > 255 {
        return Err(ValidationError::DomainNameTooLong);
    }

    for label in labels {
        if label.len() > 63 {
            return Err(ValidationError::LabelTooLong);
        }
        if label.is_empty() {
            continue;
        }
        let bytes = label.as_bytes();
        let valid_charset = bytes
            .iter()
            .all(|&b| b.is_ascii_alphanumeric() || b == b'-');
        let no_edge_hyphen = bytes[0] != b'-' && *bytes.last().unwrap() != b'-';
        if !valid_charset || !no_edge_hyphen {
            return Err(ValidationError::InvalidLabelFormat(label.clone()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{DNSHeader, DNSQuestion, DNSResourceClass};

    fn query_with(labels: &[&str], qtype: DNSResourceType) -> Message {
        Message {
            header: DNSHeader {
                qdcount: 1,
                ..Default::default()
            },
            questions: vec![DNSQuestion {
                labels: labels.iter().map(|s| s.to_string()).collect(),
                qtype,
                qclass: DNSResourceClass::IN,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn rejects_undersized_udp_packet() {
        assert_eq!(
            validate_raw_size(11, Transport::Udp),
            Err(ValidationError::PacketTooSmall(11))
        );
    }

    #[test]
    fn rejects_oversized_udp_packet() {
        assert_eq!(
            validate_raw_size(513, Transport::Udp),
            Err(ValidationError::PacketTooLarge(513))
        );
    }

    #[test]
    fn allows_large_tcp_packet() {
        assert!(validate_raw_size(4096, Transport::Tcp).is_ok());
    }

    #[test]
    fn rejects_too_many_questions() {
        let mut msg = query_with(&["example", "com"], DNSResourceType::A);
        for _ in 0..11 {
            msg.questions.push(msg.questions[0].clone());
        }
        assert!(matches!(
            validate_query(&msg),
            Err(ValidationError::InvalidQuestionCount(_))
        ));
    }

    #[test]
    fn rejects_oversized_label() {
        let label = "a".repeat(64);
        let msg = query_with(&[&label, "com"], DNSResourceType::A);
        assert_eq!(validate_query(&msg), Err(ValidationError::LabelTooLong));
    }

    #[test]
    fn rejects_leading_hyphen() {
        let msg = query_with(&["-bad", "com"], DNSResourceType::A);
        assert!(matches!(
            validate_query(&msg),
            Err(ValidationError::InvalidLabelFormat(_))
        ));
    }

    #[test]
    fn allows_any_query_type() {
        // spec explicitly includes ANY in the allowed set; amplification
        // mitigation is the rate limiter's job, not the validator's.
        let msg = query_with(&["example", "com"], DNSResourceType::ANY);
        assert!(validate_query(&msg).is_ok());
    }

    #[test]
    fn rejects_disallowed_query_type() {
        let msg = query_with(&["example", "com"], DNSResourceType::Other(249));
        assert!(matches!(
            validate_query(&msg),
            Err(ValidationError::DisallowedQueryType(_))
        ));
    }
}
