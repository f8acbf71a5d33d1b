use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::errors::MetadataError;
use super::{EntityMetadata, Inheritance, MetadataProvider};

/// In-memory entity schema, usually loaded from YAML:
///
/// ```yaml
/// entities:
///   - type_name: Author
///     table_name: authors
///     tag: a
///     fields:
///       - { name: first_name, kind: primitive, column: first_name, db_type: varchar }
///       - { name: books, kind: one_to_many, other_type: Book, other_column: author_id }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    entities: Vec<EntityMetadata>,
    #[serde(skip)]
    by_name: HashMap<String, usize>,
    #[serde(skip)]
    by_tag: HashMap<String, usize>,
}

impl Schema {
    /// Build and validate a schema. Every referenced type must be defined.
    pub fn new(entities: Vec<EntityMetadata>) -> Result<Self, MetadataError> {
        let mut schema = Schema {
            entities,
            by_name: HashMap::new(),
            by_tag: HashMap::new(),
        };
        schema.index()?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, MetadataError> {
        let parsed: Schema =
            serde_yaml::from_str(content).map_err(|e| MetadataError::SchemaParseError {
                error: e.to_string(),
            })?;
        Schema::new(parsed.entities)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, MetadataError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| MetadataError::SchemaReadError {
                error: e.to_string(),
            })?;
        Schema::from_yaml_str(&content)
    }

    pub fn entities(&self) -> &[EntityMetadata] {
        &self.entities
    }

    fn index(&mut self) -> Result<(), MetadataError> {
        for (i, entity) in self.entities.iter().enumerate() {
            if self.by_name.insert(entity.type_name.clone(), i).is_some() {
                return Err(MetadataError::DuplicateEntity(entity.type_name.clone()));
            }
            // Subtypes share their base's tag; the first definition owns it
            self.by_tag.entry(entity.tag.clone()).or_insert(i);
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), MetadataError> {
        for entity in &self.entities {
            for field in &entity.fields {
                for other in field.kind.other_types() {
                    if !self.by_name.contains_key(other) {
                        return Err(MetadataError::DanglingReference {
                            entity: entity.type_name.clone(),
                            field: field.name.clone(),
                            other_type: other.to_string(),
                        });
                    }
                }
            }
            let inherited: Vec<&String> = match &entity.inheritance {
                Inheritance::None => vec![],
                Inheritance::ClassTable {
                    base_types,
                    sub_types,
                } => base_types.iter().chain(sub_types.iter()).collect(),
                Inheritance::SingleTable { base_type, .. } => base_type.iter().collect(),
            };
            for other in inherited {
                if !self.by_name.contains_key(other) {
                    return Err(MetadataError::DanglingReference {
                        entity: entity.type_name.clone(),
                        field: "inheritance".to_string(),
                        other_type: other.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl MetadataProvider for Schema {
    fn entity(&self, type_name: &str) -> Result<&EntityMetadata, MetadataError> {
        self.by_name
            .get(type_name)
            .map(|&i| &self.entities[i])
            .ok_or_else(|| MetadataError::UnknownEntity {
                type_name: type_name.to_string(),
            })
    }

    fn entity_by_tag(&self, tag: &str) -> Option<&EntityMetadata> {
        self.by_tag.get(tag).map(|&i| &self.entities[i])
    }
}
