//! Domain name wire codec shared by questions and resource records:
//! length-prefixed label sequences, with compression pointers on both the
//! read and write side.

use std::collections::HashMap;

use super::{EncodeError, MAX_COMPRESSION_JUMPS, MAX_LABEL_LEN, MAX_NAME_LEN, ParseError};

/// Decode a domain name starting at `start` within the full message buffer
/// `data`. Returns the decoded labels and the number of bytes consumed from
/// `start` to the end of the name *as encoded at that position* (a pointer
/// counts as its own 2 bytes, not the bytes at its target).
pub fn read_name(data: &[u8], start: usize) -> Result<(Vec<String>, usize), ParseError> {
    let mut labels = Vec::new();
    let mut pos = start;
    let mut consumed_at_start: Option<usize> = None;
    let mut jumps = 0usize;
    let mut total_len = 0usize;

    loop {
        let first = *data.get(pos).ok_or(ParseError::UnexpectedEof)?;

        if first == 0 {
            pos += 1;
            if consumed_at_start.is_none() {
                consumed_at_start = Some(pos - start);
            }
            break;
        }

        if first & 0xC0 == 0xC0 {
            let second = *data.get(pos + 1).ok_or(ParseError::UnexpectedEof)?;
            if consumed_at_start.is_none() {
                consumed_at_start = Some(pos + 2 - start);
            }
            let pointer = (((first & 0x3F) as usize) << 8) | second as usize;
            if pointer >= start {
                // Pointers must reference strictly earlier data; otherwise a
                // forward/self pointer can loop indefinitely.
                return Err(ParseError::BadPointer);
            }
            jumps += 1;
            if jumps > MAX_COMPRESSION_JUMPS {
                return Err(ParseError::CompressionLoop);
            }
            pos = pointer;
            continue;
        }

        if first as usize > MAX_LABEL_LEN {
            return Err(ParseError::InvalidLabel);
        }

        let label_start = pos + 1;
        let label_end = label_start + first as usize;
        let label_bytes = data
            .get(label_start..label_end)
            .ok_or(ParseError::UnexpectedEof)?;
        let label = String::from_utf8(label_bytes.to_vec()).map_err(|_| ParseError::InvalidLabel)?;
        total_len += label.len() + 1;
        if total_len > MAX_NAME_LEN {
            return Err(ParseError::NameTooLong);
        }
        labels.push(label);
        pos = label_end;
    }

    Ok((labels, consumed_at_start.unwrap_or(0)))
}

/// Encode `labels` into `buf`, compressing against any suffix already
/// recorded in `compression` (name, lowercased and dot-joined -> offset from
/// the start of the message). Every suffix written is recorded for reuse by
/// later names, as real resolvers do.
pub fn write_name(
    buf: &mut Vec<u8>,
    labels: &[String],
    compression: &mut HashMap<String, u16>,
) -> Result<(), EncodeError> {
    let total: usize = labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1;
    if total > MAX_NAME_LEN {
        return Err(EncodeError::NameTooLong);
    }

    for (i, label) in labels.iter().enumerate() {
        if label.len() > MAX_LABEL_LEN {
            return Err(EncodeError::LabelTooLong);
        }

        let suffix_key = labels[i..].join(".").to_ascii_lowercase();
        if let Some(&offset) = compression.get(&suffix_key) {
            buf.push(0xC0 | ((offset >> 8) as u8 & 0x3F));
            buf.push((offset & 0xFF) as u8);
            return Ok(());
        }

        if buf.len() <= 0x3FFF {
            compression.insert(suffix_key, buf.len() as u16);
        }

        buf.push(label.len() as u8);
        buf.extend_from_slice(label.as_bytes());
    }

    buf.push(0);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_simple_name() {
        let mut buf = Vec::new();
        let mut map = HashMap::new();
        let labels = vec!["www".to_string(), "example".to_string(), "com".to_string()];
        write_name(&mut buf, &labels, &mut map).unwrap();

        let (decoded, consumed) = read_name(&buf, 0).unwrap();
        assert_eq!(decoded, labels);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn compresses_repeated_suffix() {
        let mut buf = Vec::new();
        let mut map = HashMap::new();
        let a = vec!["foo".to_string(), "example".to_string(), "com".to_string()];
        let b = vec!["bar".to_string(), "example".to_string(), "com".to_string()];

        write_name(&mut buf, &a, &mut map).unwrap();
        let before = buf.len();
        write_name(&mut buf, &b, &mut map).unwrap();

        // "bar" label (4 bytes) + a 2-byte pointer, much shorter than a
        // fresh encode of "example.com" would be.
        assert_eq!(buf.len() - before, 4 + 2);

        let (decoded_a, _) = read_name(&buf, 0).unwrap();
        assert_eq!(decoded_a, a);
        let (decoded_b, _) = read_name(&buf, before).unwrap();
        assert_eq!(decoded_b, b);
    }

    #[test]
    fn rejects_pointer_loop() {
        // A pointer at offset 0 pointing to itself.
        let buf = vec![0xC0, 0x00];
        assert!(matches!(
            read_name(&buf, 0),
            Err(ParseError::BadPointer)
        ));
    }

    #[test]
    fn rejects_oversized_label() {
        let mut buf = Vec::new();
        let mut map = HashMap::new();
        let labels = vec!["a".repeat(64)];
        assert!(matches!(
            write_name(&mut buf, &labels, &mut map),
            Err(EncodeError::LabelTooLong)
        ));
    }
}
