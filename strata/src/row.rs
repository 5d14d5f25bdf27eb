use bytes::{Buf, BufMut};

use crate::catalog::{ColumnSchema, ColumnType};
use crate::errors::StorageError;
use crate::MAX_COLUMNS;

/// Packed size of the tuple header: `field_count` plus sixteen offsets.
pub const TUPLE_HEADER_SIZE: usize = 2 + 2 * MAX_COLUMNS;

/// Encodes a typed tuple as `[tuple header | field bytes]`. Offsets are
/// relative to the start of the payload. INT fields are 4-byte little-endian
/// signed integers; TEXT fields are a u32 length followed by the bytes.
pub fn encode_row(schema: &[ColumnSchema], values: &[String]) -> Result<Vec<u8>, StorageError> {
    if values.len() != schema.len() {
        return Err(StorageError::SchemaMismatch(format!(
            "expected {} values, got {}",
            schema.len(),
            values.len()
        )));
    }

    let mut offsets = [0u16; MAX_COLUMNS];
    let mut body = Vec::new();
    let mut offset = TUPLE_HEADER_SIZE;
    for (index, (column, value)) in schema.iter().zip(values).enumerate() {
        if offset > u16::MAX as usize {
            return Err(StorageError::NoSpace("row is too large".to_string()));
        }
        offsets[index] = offset as u16;
        match column.column_type {
            ColumnType::Int => {
                let parsed: i32 = value.trim().parse().map_err(|_| {
                    StorageError::InvalidArgument(format!(
                        "'{}' is not a valid INT for column '{}'",
                        value, column.name
                    ))
                })?;
                body.put_i32_le(parsed);
                offset += 4;
            }
            ColumnType::Text => {
                body.put_u32_le(value.len() as u32);
                body.put_slice(value.as_bytes());
                offset += 4 + value.len();
            }
        }
    }

    let mut payload = Vec::with_capacity(TUPLE_HEADER_SIZE + body.len());
    payload.put_u16_le(schema.len() as u16);
    for field_offset in offsets {
        payload.put_u16_le(field_offset);
    }
    payload.extend_from_slice(&body);
    Ok(payload)
}

/// Decodes a payload back into string fields, one per schema column.
pub fn decode_row(schema: &[ColumnSchema], payload: &[u8]) -> Result<Vec<String>, StorageError> {
    if payload.len() < TUPLE_HEADER_SIZE {
        return Err(StorageError::InvalidArgument(
            "row payload is shorter than its header".to_string(),
        ));
    }
    let mut header = &payload[..TUPLE_HEADER_SIZE];
    let field_count = header.get_u16_le() as usize;
    if field_count != schema.len() {
        return Err(StorageError::InvalidArgument(format!(
            "row has {} fields, schema expects {}",
            field_count,
            schema.len()
        )));
    }
    let mut offsets = [0usize; MAX_COLUMNS];
    for slot in offsets.iter_mut() {
        *slot = header.get_u16_le() as usize;
    }

    let mut values = Vec::with_capacity(schema.len());
    for (index, column) in schema.iter().enumerate() {
        let offset = offsets[index];
        match column.column_type {
            ColumnType::Int => {
                let Some(mut field) = payload.get(offset..offset + 4) else {
                    return Err(StorageError::InvalidArgument(format!(
                        "INT field '{}' is out of bounds",
                        column.name
                    )));
                };
                values.push(field.get_i32_le().to_string());
            }
            ColumnType::Text => {
                let Some(mut length_bytes) = payload.get(offset..offset + 4) else {
                    return Err(StorageError::InvalidArgument(format!(
                        "TEXT field '{}' is out of bounds",
                        column.name
                    )));
                };
                let length = length_bytes.get_u32_le() as usize;
                let Some(bytes) = payload.get(offset + 4..offset + 4 + length) else {
                    return Err(StorageError::InvalidArgument(format!(
                        "TEXT field '{}' runs past the payload",
                        column.name
                    )));
                };
                values.push(String::from_utf8_lossy(bytes).into_owned());
            }
        }
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Vec<ColumnSchema> {
        vec![ColumnSchema::int("id"), ColumnSchema::text("name")]
    }

    #[test]
    fn int_and_text_round_trip() {
        let values = vec!["-42".to_string(), "Ada Lovelace".to_string()];
        let payload = encode_row(&schema(), &values).expect("encode");
        let decoded = decode_row(&schema(), &payload).expect("decode");
        assert_eq!(decoded, vec!["-42", "Ada Lovelace"]);
    }

    #[test]
    fn empty_text_round_trips() {
        let schema = vec![ColumnSchema::text("note")];
        let payload = encode_row(&schema, &["".to_string()]).expect("encode");
        assert_eq!(decode_row(&schema, &payload).expect("decode"), vec![""]);
    }

    #[test]
    fn value_count_mismatch_is_rejected() {
        let err = encode_row(&schema(), &["1".to_string()]).expect_err("mismatch");
        assert!(matches!(err, StorageError::SchemaMismatch(_)));
    }

    #[test]
    fn garbage_int_is_rejected() {
        let values = vec!["not-a-number".to_string(), "x".to_string()];
        let err = encode_row(&schema(), &values).expect_err("bad int");
        assert!(matches!(err, StorageError::InvalidArgument(_)));
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let values = vec!["7".to_string(), "hello".to_string()];
        let payload = encode_row(&schema(), &values).expect("encode");
        let err = decode_row(&schema(), &payload[..TUPLE_HEADER_SIZE + 2]).expect_err("short");
        assert!(matches!(err, StorageError::InvalidArgument(_)));
    }
}
