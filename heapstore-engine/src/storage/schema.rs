//! Schema descriptors for fixed-width heap tuples
//!
//! A schema is an ordered, non-empty list of typed fields. Every field type
//! has a fixed serialized width, so every tuple of a schema has the same size.
//! Equality and hashing are structural over field types only; field names are
//! metadata and never take part in comparisons.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{HeapError, HeapResult};

/// Maximum payload length of a text field in bytes
pub const TEXT_LEN: usize = 128;

/// Field data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum FieldType {
    /// Signed 32-bit integer, little-endian
    Int = 0,
    /// Fixed-length text: u32 length prefix followed by `TEXT_LEN` bytes
    Text = 1,
}

impl FieldType {
    /// Serialized width in bytes
    pub fn width(&self) -> usize {
        match self {
            FieldType::Int => 4,
            FieldType::Text => 4 + TEXT_LEN,
        }
    }

    /// Stable one-byte type code
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FieldType::Int => "int",
            FieldType::Text => "text",
        })
    }
}

/// A typed, optionally named field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub name: String,
}

impl FieldDescriptor {
    pub fn new(field_type: FieldType, name: impl Into<String>) -> Self {
        FieldDescriptor {
            field_type,
            name: name.into(),
        }
    }

    pub fn anonymous(field_type: FieldType) -> Self {
        Self::new(field_type, "")
    }
}

impl std::fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.field_type, self.name)
    }
}

/// Ordered, immutable list of typed fields
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<FieldDescriptor>,
}

impl Schema {
    /// Create a schema from parallel type and name sequences
    pub fn new<S: AsRef<str>>(types: &[FieldType], names: &[S]) -> HeapResult<Self> {
        if types.len() != names.len() {
            return Err(HeapError::InvalidSchema(format!(
                "{} types but {} names",
                types.len(),
                names.len()
            )));
        }

        let fields = types
            .iter()
            .zip(names)
            .map(|(t, n)| FieldDescriptor::new(*t, n.as_ref()))
            .collect();
        Self::from_fields(fields)
    }

    /// Create a schema of anonymous fields
    pub fn from_types(types: &[FieldType]) -> HeapResult<Self> {
        Self::from_fields(types.iter().map(|t| FieldDescriptor::anonymous(*t)).collect())
    }

    /// Create a schema from field descriptors
    pub fn from_fields(fields: Vec<FieldDescriptor>) -> HeapResult<Self> {
        if fields.is_empty() {
            return Err(HeapError::InvalidSchema(
                "a schema needs at least one field".to_string(),
            ));
        }
        Ok(Schema { fields })
    }

    /// Number of fields
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    fn field(&self, index: usize) -> HeapResult<&FieldDescriptor> {
        self.fields.get(index).ok_or(HeapError::IndexOutOfRange {
            index,
            count: self.fields.len(),
        })
    }

    /// Name of the field at `index` (possibly empty)
    pub fn field_name(&self, index: usize) -> HeapResult<&str> {
        self.field(index).map(|f| f.name.as_str())
    }

    /// Type of the field at `index`
    pub fn field_type(&self, index: usize) -> HeapResult<FieldType> {
        self.field(index).map(|f| f.field_type)
    }

    /// Index of the first field named exactly `name`
    pub fn index_of_field(&self, name: &str) -> HeapResult<usize> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| HeapError::FieldNotFound(name.to_string()))
    }

    /// Byte width of one tuple
    pub fn byte_size(&self) -> usize {
        self.fields.iter().map(|f| f.field_type.width()).sum()
    }

    /// Fields of `a` followed by the fields of `b`
    pub fn merge(a: &Schema, b: &Schema) -> Schema {
        let mut fields = Vec::with_capacity(a.field_count() + b.field_count());
        fields.extend(a.fields.iter().cloned());
        fields.extend(b.fields.iter().cloned());
        Schema { fields }
    }

    /// Hash over the ordered field type codes
    pub fn structural_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    /// Render as `type0(name0),type1(name1),...`
    pub fn describe(&self) -> String {
        self.fields
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter()
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.field_type == b.field_type)
    }
}

impl Eq for Schema {}

impl Hash for Schema {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.fields.len());
        for field in &self.fields {
            state.write_u8(field.field_type.code());
        }
    }
}

impl std::fmt::Display for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::collections::HashSet;

    fn schema(types: &[FieldType], names: &[&str]) -> Schema {
        Schema::new(types, names).unwrap()
    }

    #[test]
    fn test_construction_rejects_bad_input() {
        let err = Schema::new(&[FieldType::Int, FieldType::Text], &["a"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSchema);

        let err = Schema::from_types(&[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSchema);
    }

    #[test]
    fn test_field_lookup() {
        let s = schema(&[FieldType::Int, FieldType::Text], &["id", "name"]);
        assert_eq!(s.field_count(), 2);
        assert_eq!(s.field_name(1).unwrap(), "name");
        assert_eq!(s.field_type(0).unwrap(), FieldType::Int);
        assert_eq!(s.field_type(2).unwrap_err().kind(), ErrorKind::IndexOutOfRange);
        assert_eq!(s.field_name(5).unwrap_err().kind(), ErrorKind::IndexOutOfRange);
    }

    #[test]
    fn test_index_of_field_first_match() {
        let s = schema(
            &[FieldType::Int, FieldType::Int, FieldType::Text],
            &["x", "dup", "dup"],
        );
        assert_eq!(s.index_of_field("dup").unwrap(), 1);
        assert_eq!(s.index_of_field("DUP").unwrap_err().kind(), ErrorKind::FieldNotFound);
    }

    #[test]
    fn test_anonymous_fields_have_empty_names() {
        let s = Schema::from_types(&[FieldType::Int]).unwrap();
        assert_eq!(s.field_name(0).unwrap(), "");
        assert_eq!(s.index_of_field("").unwrap(), 0);
    }

    #[test]
    fn test_byte_size() {
        let s = Schema::from_types(&[FieldType::Int, FieldType::Text, FieldType::Int]).unwrap();
        assert_eq!(s.byte_size(), 4 + 132 + 4);
    }

    #[test]
    fn test_merge() {
        let a = schema(&[FieldType::Int, FieldType::Text], &["a0", "a1"]);
        let b = schema(&[FieldType::Text, FieldType::Int, FieldType::Int], &["b0", "b1", "b2"]);
        let m = Schema::merge(&a, &b);

        assert_eq!(m.field_count(), a.field_count() + b.field_count());
        for i in 0..m.field_count() {
            if i < a.field_count() {
                assert_eq!(m.field_type(i).unwrap(), a.field_type(i).unwrap());
                assert_eq!(m.field_name(i).unwrap(), a.field_name(i).unwrap());
            } else {
                let j = i - a.field_count();
                assert_eq!(m.field_type(i).unwrap(), b.field_type(j).unwrap());
                assert_eq!(m.field_name(i).unwrap(), b.field_name(j).unwrap());
            }
        }
    }

    #[test]
    fn test_equality_ignores_names() {
        let x = schema(&[FieldType::Int], &["x"]);
        let y = schema(&[FieldType::Int], &["y"]);
        assert_eq!(x, y);
        assert_eq!(x.structural_hash(), y.structural_hash());

        let longer = schema(&[FieldType::Int, FieldType::Int], &["x", "y"]);
        assert_ne!(x, longer);
        let text = schema(&[FieldType::Text], &["x"]);
        assert_ne!(x, text);
    }

    #[test]
    fn test_structural_hash_distinguishes_unequal_schemas() {
        let candidates = [
            vec![FieldType::Int],
            vec![FieldType::Text],
            vec![FieldType::Int, FieldType::Int],
            vec![FieldType::Int, FieldType::Text],
            vec![FieldType::Text, FieldType::Int],
            vec![FieldType::Text, FieldType::Text],
            vec![FieldType::Int, FieldType::Int, FieldType::Int],
        ];
        let hashes: HashSet<u64> = candidates
            .iter()
            .map(|t| Schema::from_types(t).unwrap().structural_hash())
            .collect();
        assert_eq!(hashes.len(), candidates.len());
    }

    #[test]
    fn test_usable_as_hash_key() {
        let mut set = HashSet::new();
        set.insert(schema(&[FieldType::Int, FieldType::Text], &["a", "b"]));
        assert!(set.contains(&schema(&[FieldType::Int, FieldType::Text], &["c", "d"])));
    }

    #[test]
    fn test_describe() {
        let s = schema(&[FieldType::Int, FieldType::Text], &["id", ""]);
        assert_eq!(s.describe(), "int(id),text()");
        assert_eq!(s.to_string(), s.describe());
    }
}
