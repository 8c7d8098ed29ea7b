//! Parsing of whitespace-delimited integer records.
//!
//! Sample files hold rows of `x y timestamp polarity`; the weight file holds
//! rows of ten signed weights per input. Tokens may be separated by any ASCII
//! whitespace. Malformed input is an error, never silently truncated.

use crate::channel::types::{Event, FEATURE_DIM, OUTPUT_DIM};
use crate::core::classifier::WeightMatrix;
use crate::error::ParseError;
use std::str::FromStr;

/// Fields per event row.
pub const EVENT_WIDTH: usize = 4;

/// Fields per weight row.
pub const WEIGHT_WIDTH: usize = OUTPUT_DIM;

/// Parse every token in `buf` as `T`.
pub fn parse_tokens<T: FromStr>(buf: &[u8]) -> Result<Vec<T>, ParseError> {
    buf.split(|b| b.is_ascii_whitespace())
        .filter(|token| !token.is_empty())
        .enumerate()
        .map(|(index, token)| {
            std::str::from_utf8(token)
                .ok()
                .and_then(|s| s.parse::<T>().ok())
                .ok_or_else(|| ParseError::InvalidToken {
                    index,
                    token: String::from_utf8_lossy(token).into_owned(),
                })
        })
        .collect()
}

/// Parse `buf` and require at least `expected` tokens.
pub fn parse_at_least<T: FromStr>(buf: &[u8], expected: usize) -> Result<Vec<T>, ParseError> {
    let values = parse_tokens(buf)?;
    if values.len() < expected {
        return Err(ParseError::TooFewTokens {
            expected,
            found: values.len(),
        });
    }
    Ok(values)
}

/// Split `values` into rows of `width`, rejecting a trailing partial row.
pub fn into_rows<T: Copy>(values: &[T], width: usize) -> Result<Vec<&[T]>, ParseError> {
    if values.len() % width != 0 {
        return Err(ParseError::PartialRow {
            found: values.len(),
            width,
        });
    }
    Ok(values.chunks_exact(width).collect())
}

/// Parse an event file into at most `capacity` events, in file order.
pub fn parse_events(buf: &[u8], capacity: usize) -> Result<Vec<Event>, ParseError> {
    let values: Vec<u32> = parse_at_least(buf, EVENT_WIDTH).map_err(|e| match e {
        ParseError::TooFewTokens { found: 0, .. } => ParseError::Empty,
        other => other,
    })?;
    let rows = into_rows(&values, EVENT_WIDTH)?;

    if rows.len() > capacity {
        return Err(ParseError::CapacityExceeded {
            rows: rows.len(),
            capacity,
        });
    }

    rows.iter()
        .enumerate()
        .map(|(row, fields)| {
            let event = Event::new(fields[0], fields[1], fields[2], fields[3]);
            if event.polarity > 1 {
                return Err(ParseError::FieldOutOfRange {
                    row,
                    field: "polarity",
                    value: event.polarity,
                });
            }
            Ok(event)
        })
        .collect()
}

/// Parse the weight file into a `FEATURE_DIM x OUTPUT_DIM` matrix.
pub fn parse_weights(buf: &[u8]) -> Result<WeightMatrix, ParseError> {
    let values: Vec<i32> = parse_at_least(buf, FEATURE_DIM * WEIGHT_WIDTH)?;
    WeightMatrix::from_values(values)
}
