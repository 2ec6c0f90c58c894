//! Table definitions read from TOML
//!
//! ```toml
//! [engine]
//! page_size = 4096
//!
//! [[fields]]
//! type = "int"
//! name = "id"
//!
//! [[fields]]
//! type = "text"
//! name = "title"
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use heapstore_engine::storage::FieldDescriptor;
use heapstore_engine::{EngineConfig, Schema};

#[derive(Debug, Deserialize)]
pub struct TableDef {
    #[serde(default)]
    pub engine: EngineConfig,
    pub fields: Vec<FieldDescriptor>,
}

impl TableDef {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading table definition {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("in {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn schema(&self) -> Result<Arc<Schema>> {
        Ok(Arc::new(Schema::from_fields(self.fields.clone())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapstore_engine::FieldType;

    #[test]
    fn test_parse_definition() {
        let def = TableDef::parse(
            r#"
            [engine]
            page_size = 512

            [[fields]]
            type = "int"
            name = "id"

            [[fields]]
            type = "text"
            "#,
        )
        .unwrap();

        assert_eq!(def.engine.page_size, 512);
        assert_eq!(def.engine.pool_pages, heapstore_engine::config::DEFAULT_POOL_PAGES);
        let schema = def.schema().unwrap();
        assert_eq!(schema.field_count(), 2);
        assert_eq!(schema.field_type(1).unwrap(), FieldType::Text);
        assert_eq!(schema.field_name(0).unwrap(), "id");
        assert_eq!(schema.field_name(1).unwrap(), "");
    }

    #[test]
    fn test_engine_section_is_optional() {
        let def = TableDef::parse("[[fields]]\ntype = \"int\"\n").unwrap();
        assert_eq!(def.engine, EngineConfig::default());
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(TableDef::parse("[[fields]]\ntype = \"float\"\n").is_err());
    }

    #[test]
    fn test_empty_fields_rejected() {
        let def = TableDef::parse("fields = []\n").unwrap();
        assert!(def.schema().is_err());
    }
}
