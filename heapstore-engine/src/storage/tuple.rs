//! Tuples and their fixed-width byte encoding

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;

use super::page::RecordId;
use super::schema::{FieldType, Schema, TEXT_LEN};
use crate::error::{HeapError, HeapResult};

/// A single field value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    Int(i32),
    Text(String),
}

impl Field {
    pub fn field_type(&self) -> FieldType {
        match self {
            Field::Int(_) => FieldType::Int,
            Field::Text(_) => FieldType::Text,
        }
    }

    /// Parse a textual value as the given field type
    pub fn parse(field_type: FieldType, raw: &str) -> HeapResult<Field> {
        match field_type {
            FieldType::Int => raw.trim().parse::<i32>().map(Field::Int).map_err(|_| {
                HeapError::TypeMismatch {
                    index: 0,
                    expected: FieldType::Int.to_string(),
                    actual: format!("{raw:?}"),
                }
            }),
            FieldType::Text => {
                if raw.len() > TEXT_LEN {
                    return Err(HeapError::ValueTooLong {
                        length: raw.len(),
                        max: TEXT_LEN,
                    });
                }
                Ok(Field::Text(raw.to_string()))
            }
        }
    }

    fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        match self {
            Field::Int(v) => out.write_i32::<LittleEndian>(*v),
            Field::Text(s) => {
                let bytes = s.as_bytes();
                out.write_u32::<LittleEndian>(bytes.len() as u32)?;
                out.write_all(bytes)?;
                out.write_all(&[0u8; TEXT_LEN][..TEXT_LEN - bytes.len()])
            }
        }
    }

    fn read_from(field_type: FieldType, input: &mut Cursor<&[u8]>) -> Result<Field, String> {
        match field_type {
            FieldType::Int => input
                .read_i32::<LittleEndian>()
                .map(Field::Int)
                .map_err(|e| e.to_string()),
            FieldType::Text => {
                let len = input.read_u32::<LittleEndian>().map_err(|e| e.to_string())? as usize;
                if len > TEXT_LEN {
                    return Err(format!("text length {len} exceeds {TEXT_LEN}"));
                }
                let mut buf = [0u8; TEXT_LEN];
                input.read_exact(&mut buf).map_err(|e| e.to_string())?;
                String::from_utf8(buf[..len].to_vec())
                    .map(Field::Text)
                    .map_err(|_| "text field is not valid UTF-8".to_string())
            }
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{v}"),
            Field::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Field values bound to a schema and, once stored, a record id
#[derive(Debug, Clone)]
pub struct Tuple {
    schema: Arc<Schema>,
    fields: Vec<Field>,
    record_id: Option<RecordId>,
}

impl Tuple {
    /// Create a tuple, checking arity, types and text lengths against the schema
    pub fn new(schema: Arc<Schema>, fields: Vec<Field>) -> HeapResult<Self> {
        if fields.len() != schema.field_count() {
            let actual: Vec<String> = fields.iter().map(|f| f.field_type().to_string()).collect();
            return Err(HeapError::SchemaMismatch {
                expected: schema.describe(),
                actual: format!("{} values: {}", fields.len(), actual.join(",")),
            });
        }
        for (index, (field, expected)) in fields.iter().zip(schema.iter()).enumerate() {
            check_field(index, expected.field_type, field)?;
        }
        Ok(Tuple {
            schema,
            fields,
            record_id: None,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> HeapResult<&Field> {
        self.fields.get(index).ok_or(HeapError::IndexOutOfRange {
            index,
            count: self.fields.len(),
        })
    }

    pub fn set_field(&mut self, index: usize, value: Field) -> HeapResult<()> {
        let expected = self.schema.field_type(index)?;
        check_field(index, expected, &value)?;
        self.fields[index] = value;
        Ok(())
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }

    /// Encode into exactly `schema.byte_size()` bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.schema.byte_size());
        for field in &self.fields {
            // Writing into a Vec cannot fail
            field.write_to(&mut buf).expect("in-memory write");
        }
        buf
    }

    /// Decode a tuple from its fixed-width encoding
    ///
    /// Errors are returned as a reason string; the page layer attaches the
    /// page identity before surfacing them.
    pub(crate) fn decode(schema: &Arc<Schema>, data: &[u8]) -> Result<Tuple, String> {
        if data.len() < schema.byte_size() {
            return Err(format!(
                "slot holds {} bytes, schema needs {}",
                data.len(),
                schema.byte_size()
            ));
        }
        let mut input = Cursor::new(data);
        let fields = schema
            .iter()
            .map(|f| Field::read_from(f.field_type, &mut input))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Tuple {
            schema: Arc::clone(schema),
            fields,
            record_id: None,
        })
    }
}

/// Tuples compare by schema and values; the record id is location, not content
impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        *self.schema == *other.schema && self.fields == other.fields
    }
}

impl std::fmt::Display for Tuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let values: Vec<String> = self.fields.iter().map(|v| v.to_string()).collect();
        f.write_str(&values.join("\t"))
    }
}

fn check_field(index: usize, expected: FieldType, field: &Field) -> HeapResult<()> {
    if field.field_type() != expected {
        return Err(HeapError::TypeMismatch {
            index,
            expected: expected.to_string(),
            actual: field.field_type().to_string(),
        });
    }
    if let Field::Text(s) = field {
        if s.len() > TEXT_LEN {
            return Err(HeapError::ValueTooLong {
                length: s.len(),
                max: TEXT_LEN,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn people() -> Arc<Schema> {
        Arc::new(Schema::new(&[FieldType::Int, FieldType::Text], &["id", "name"]).unwrap())
    }

    #[test]
    fn test_encode_decode() {
        let schema = people();
        let t = Tuple::new(schema.clone(), vec![Field::Int(-17), Field::Text("ada".into())]).unwrap();
        let bytes = t.to_bytes();
        assert_eq!(bytes.len(), schema.byte_size());
        assert_eq!(&bytes[0..4], &(-17i32).to_le_bytes());
        assert_eq!(&bytes[4..8], &3u32.to_le_bytes());

        let decoded = Tuple::decode(&schema, &bytes).unwrap();
        assert_eq!(decoded, t);
        assert!(decoded.record_id().is_none());
    }

    #[test]
    fn test_rejects_wrong_type_and_arity() {
        let schema = people();
        let err = Tuple::new(schema.clone(), vec![Field::Text("x".into()), Field::Int(1)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);

        let err = Tuple::new(schema, vec![Field::Int(1)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
        assert!(err.to_string().contains("1 values: int"));
    }

    #[test]
    fn test_rejects_long_text() {
        let long = "x".repeat(TEXT_LEN + 1);
        let err = Tuple::new(people(), vec![Field::Int(1), Field::Text(long.clone())]).unwrap_err();
        assert!(matches!(err, HeapError::ValueTooLong { .. }));
        assert!(Field::parse(FieldType::Text, &long).is_err());
    }

    #[test]
    fn test_decode_rejects_bad_length_prefix() {
        let schema = people();
        let mut bytes = vec![0u8; schema.byte_size()];
        bytes[4..8].copy_from_slice(&500u32.to_le_bytes());
        assert!(Tuple::decode(&schema, &bytes).is_err());
    }

    #[test]
    fn test_parse() {
        assert_eq!(Field::parse(FieldType::Int, " 42").unwrap(), Field::Int(42));
        assert!(Field::parse(FieldType::Int, "forty").is_err());
        assert_eq!(
            Field::parse(FieldType::Text, "hello").unwrap(),
            Field::Text("hello".into())
        );
    }

    #[test]
    fn test_set_field_checks_type() {
        let mut t = Tuple::new(people(), vec![Field::Int(1), Field::Text("a".into())]).unwrap();
        t.set_field(0, Field::Int(2)).unwrap();
        assert_eq!(t.field(0).unwrap(), &Field::Int(2));
        assert!(t.set_field(0, Field::Text("no".into())).is_err());
        assert_eq!(t.set_field(9, Field::Int(0)).unwrap_err().kind(), ErrorKind::IndexOutOfRange);
    }
}
