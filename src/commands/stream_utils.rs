//! Stream ID parsing shared by XADD, XRANGE and XREAD, plus the common
//! entry-to-RESP encoding.

use crate::key_value_store::{StreamEntry, StreamId};
use crate::resp::RespValue;

pub const ID_TOO_SMALL: &str =
    "The ID specified in XADD is equal or smaller than the target stream top item";
pub const ID_MUST_BE_POSITIVE: &str = "The ID specified in XADD must be greater than 0-0";
pub const ID_MALFORMED: &str = "Invalid stream ID specified as stream command argument";

/// The three ID forms XADD accepts: `*`, `ms-*` and `ms-seq`.
#[derive(Debug, PartialEq)]
pub enum EntryIdSpec {
    Auto,
    AutoSequence(u64),
    Explicit(StreamId),
}

pub fn parse_entry_id_spec(argument: &str) -> Result<EntryIdSpec, String> {
    if argument == "*" {
        return Ok(EntryIdSpec::Auto);
    }

    let (ms_part, seq_part) = split_id_parts(argument)?;

    let ms = ms_part
        .parse::<u64>()
        .map_err(|_| ID_MALFORMED.to_string())?;

    if seq_part == "*" {
        return Ok(EntryIdSpec::AutoSequence(ms));
    }

    let seq = seq_part
        .parse::<u64>()
        .map_err(|_| ID_MALFORMED.to_string())?;

    Ok(EntryIdSpec::Explicit(StreamId::new(ms, seq)))
}

/// Parses one XRANGE bound. `-` and `+` are the min/max sentinels; a bare
/// `ms` defaults the sequence to 0 at the start bound and to the maximum at
/// the end bound, so `XRANGE s 5 5` covers every entry in millisecond 5.
pub fn parse_range_bound(argument: &str, is_start: bool) -> Result<StreamId, String> {
    match argument {
        "-" => Ok(StreamId::ZERO),
        "+" => Ok(StreamId::MAX),
        _ => parse_id_with_default_seq(argument, if is_start { 0 } else { u64::MAX }),
    }
}

/// Parses an XREAD baseline ID (`$` is resolved by the caller before this).
/// Entries strictly greater than the baseline are returned, so a bare `ms`
/// defaults the sequence to 0.
pub fn parse_read_baseline(argument: &str) -> Result<StreamId, String> {
    parse_id_with_default_seq(argument, 0)
}

fn parse_id_with_default_seq(argument: &str, default_seq: u64) -> Result<StreamId, String> {
    match argument.split_once('-') {
        Some((ms_part, seq_part)) => {
            if ms_part.is_empty() || seq_part.is_empty() {
                return Err(ID_MALFORMED.to_string());
            }

            let ms = ms_part
                .parse::<u64>()
                .map_err(|_| ID_MALFORMED.to_string())?;
            let seq = seq_part
                .parse::<u64>()
                .map_err(|_| ID_MALFORMED.to_string())?;

            Ok(StreamId::new(ms, seq))
        }
        None => {
            let ms = argument
                .parse::<u64>()
                .map_err(|_| ID_MALFORMED.to_string())?;

            Ok(StreamId::new(ms, default_seq))
        }
    }
}

fn split_id_parts(argument: &str) -> Result<(&str, &str), String> {
    let Some((ms_part, seq_part)) = argument.split_once('-') else {
        return Err(ID_MALFORMED.to_string());
    };

    if ms_part.is_empty() || seq_part.is_empty() || seq_part.contains('-') {
        return Err(ID_MALFORMED.to_string());
    }

    Ok((ms_part, seq_part))
}

/// Encodes entries as the flat reply shape shared by XRANGE and XREAD:
/// `[[id, [field, value, ...]], ...]` with fields in insertion order.
pub fn encode_entries(entries: &[&StreamEntry]) -> RespValue {
    RespValue::Array(
        entries
            .iter()
            .map(|entry| {
                let mut flat_fields = Vec::with_capacity(entry.fields.len() * 2);

                for (field, value) in &entry.fields {
                    flat_fields.push(RespValue::BulkString(field.clone()));
                    flat_fields.push(RespValue::BulkString(value.clone()));
                }

                RespValue::Array(vec![
                    RespValue::BulkString(entry.id.to_string()),
                    RespValue::Array(flat_fields),
                ])
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use crate::key_value_store::{StreamEntry, StreamId};

    use super::{
        parse_entry_id_spec, parse_range_bound, parse_read_baseline, encode_entries, EntryIdSpec,
        ID_MALFORMED,
    };

    #[test]
    fn test_parse_entry_id_spec() {
        let test_cases = vec![
            ("*", Ok(EntryIdSpec::Auto)),
            ("5-*", Ok(EntryIdSpec::AutoSequence(5))),
            ("0-*", Ok(EntryIdSpec::AutoSequence(0))),
            (
                "1526919030474-3",
                Ok(EntryIdSpec::Explicit(StreamId::new(1526919030474, 3))),
            ),
            ("0-0", Ok(EntryIdSpec::Explicit(StreamId::ZERO))),
            ("invalid", Err(ID_MALFORMED.to_string())),
            ("1-2-3", Err(ID_MALFORMED.to_string())),
            ("-1", Err(ID_MALFORMED.to_string())),
            ("1-", Err(ID_MALFORMED.to_string())),
            ("1", Err(ID_MALFORMED.to_string())),
            ("abc-1", Err(ID_MALFORMED.to_string())),
            ("1-abc", Err(ID_MALFORMED.to_string())),
        ];

        for (input, expected) in test_cases {
            assert_eq!(parse_entry_id_spec(input), expected, "parsing {:?}", input);
        }
    }

    #[test]
    fn test_parse_range_bound() {
        let test_cases = vec![
            ("-", true, Ok(StreamId::ZERO)),
            ("+", false, Ok(StreamId::MAX)),
            ("5", true, Ok(StreamId::new(5, 0))),
            ("5", false, Ok(StreamId::new(5, u64::MAX))),
            ("5-3", true, Ok(StreamId::new(5, 3))),
            ("5-3", false, Ok(StreamId::new(5, 3))),
            ("oops", true, Err(ID_MALFORMED.to_string())),
        ];

        for (input, is_start, expected) in test_cases {
            assert_eq!(
                parse_range_bound(input, is_start),
                expected,
                "parsing bound {:?} (start: {})",
                input,
                is_start
            );
        }
    }

    #[test]
    fn test_parse_read_baseline() {
        let test_cases = vec![
            ("0", Ok(StreamId::ZERO)),
            ("1000", Ok(StreamId::new(1000, 0))),
            ("1000-5", Ok(StreamId::new(1000, 5))),
            ("$", Err(ID_MALFORMED.to_string())),
        ];

        for (input, expected) in test_cases {
            assert_eq!(parse_read_baseline(input), expected, "parsing {:?}", input);
        }
    }

    #[test]
    fn test_encode_entries_preserves_field_order() {
        let entry = StreamEntry {
            id: StreamId::new(1000, 0),
            fields: vec![
                ("zebra".to_string(), "1".to_string()),
                ("apple".to_string(), "2".to_string()),
            ],
        };

        let encoded = encode_entries(&[&entry]).encode();

        assert_eq!(
            encoded,
            "*1\r\n*2\r\n$6\r\n1000-0\r\n*4\r\n$5\r\nzebra\r\n$1\r\n1\r\n$5\r\napple\r\n$1\r\n2\r\n"
        );
    }
}
