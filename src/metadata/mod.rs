//! Entity metadata consumed by the plan builder.
//!
//! The plan builder never talks to a database catalog directly; it asks a
//! [`MetadataProvider`] for the table name, id type and field kinds of an
//! entity type. [`Schema`] is the in-crate provider, loaded from YAML.
//!
//! Field lookup walks the inheritance chain:
//! - class-table inheritance: fields declared on a base type live on the base
//!   table, joined as `<alias>_b<i>`
//! - single-table inheritance: fields declared on the base type live on the
//!   same table, so they resolve to the entity's own alias

pub mod errors;
mod schema;
#[cfg(test)]
pub(crate) mod testing;

pub use errors::MetadataError;
pub use schema::Schema;

use serde::{Deserialize, Serialize};

/// How an entity's primary key is stored. Drives tagged-id parsing and the
/// nil sentinel used for references to unsaved entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdType {
    #[default]
    Int,
    Uuid,
    UntaggedString,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub type_name: String,
    pub table_name: String,
    /// Prefix of tagged ids, e.g. `a` for `a:1`
    pub tag: String,
    #[serde(default)]
    pub id_type: IdType,
    #[serde(default = "default_id_db_type")]
    pub id_db_type: String,
    #[serde(default)]
    pub fields: Vec<Field>,
    /// Rows are soft-deleted via a timestamp column instead of being removed
    #[serde(default)]
    pub soft_delete: bool,
    /// Overrides `PlanConfig::soft_delete_column` for this entity
    #[serde(default)]
    pub soft_delete_column: Option<String>,
    #[serde(default)]
    pub inheritance: Inheritance,
}

fn default_id_db_type() -> String {
    "int".to_string()
}

impl EntityMetadata {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn sub_types(&self) -> &[String] {
        match &self.inheritance {
            Inheritance::ClassTable { sub_types, .. } => sub_types,
            _ => &[],
        }
    }

    pub fn base_types(&self) -> &[String] {
        match &self.inheritance {
            Inheritance::ClassTable { base_types, .. } => base_types,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    PrimaryKey,
    Primitive {
        column: String,
        db_type: String,
    },
    Enum {
        column: String,
        db_type: String,
    },
    ManyToOne {
        column: String,
        other_type: String,
        /// FK column is NOT NULL
        #[serde(default)]
        required: bool,
    },
    OneToMany {
        other_type: String,
        other_column: String,
    },
    ManyToMany {
        join_table: String,
        /// Junction column pointing back at this entity
        column: String,
        /// Junction column pointing at `other_type`
        other_column: String,
        other_type: String,
        /// Type of the junction table's own `id` column
        #[serde(default = "default_id_db_type")]
        junction_id_db_type: String,
    },
    OneToOne {
        other_type: String,
        other_column: String,
    },
    Polymorphic {
        components: Vec<PolymorphicComponent>,
    },
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::PrimaryKey => "primary_key",
            FieldKind::Primitive { .. } => "primitive",
            FieldKind::Enum { .. } => "enum",
            FieldKind::ManyToOne { .. } => "many_to_one",
            FieldKind::OneToMany { .. } => "one_to_many",
            FieldKind::ManyToMany { .. } => "many_to_many",
            FieldKind::OneToOne { .. } => "one_to_one",
            FieldKind::Polymorphic { .. } => "polymorphic",
        }
    }

    /// Types this field points at, for schema validation
    fn other_types(&self) -> Vec<&str> {
        match self {
            FieldKind::ManyToOne { other_type, .. }
            | FieldKind::OneToMany { other_type, .. }
            | FieldKind::ManyToMany { other_type, .. }
            | FieldKind::OneToOne { other_type, .. } => vec![other_type.as_str()],
            FieldKind::Polymorphic { components } => {
                components.iter().map(|c| c.other_type.as_str()).collect()
            }
            FieldKind::PrimaryKey | FieldKind::Primitive { .. } | FieldKind::Enum { .. } => vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolymorphicComponent {
    pub column: String,
    pub other_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Inheritance {
    #[default]
    None,
    /// One table per class; subtype rows share the base row's id.
    /// `base_types` is ordered nearest-first.
    ClassTable {
        #[serde(default)]
        base_types: Vec<String>,
        #[serde(default)]
        sub_types: Vec<String>,
    },
    /// All classes share one table, told apart by a discriminator column.
    /// The root type has no `discriminator_value`.
    SingleTable {
        #[serde(default)]
        base_type: Option<String>,
        discriminator_column: String,
        #[serde(default)]
        discriminator_value: Option<i64>,
    },
}

/// A field resolved against an entity, possibly found on one of its base types.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField<'a> {
    pub name: String,
    pub kind: FieldKind,
    /// Entity that declares the field
    pub owner: &'a EntityMetadata,
    /// Set when the field lives on a class-table base table (`<alias>_b<i>`)
    pub base_index: Option<usize>,
}

impl ResolvedField<'_> {
    /// Alias of the table holding this field's column, given the entity's alias
    pub fn column_alias(&self, alias: &str) -> String {
        match self.base_index {
            Some(i) => format!("{alias}_b{i}"),
            None => alias.to_string(),
        }
    }
}

/// Source of entity metadata for plan construction.
pub trait MetadataProvider {
    fn entity(&self, type_name: &str) -> Result<&EntityMetadata, MetadataError>;

    fn entity_by_tag(&self, tag: &str) -> Option<&EntityMetadata>;

    /// Look up `name` on `meta`, falling back to its base types.
    fn resolve_field<'a>(
        &'a self,
        meta: &'a EntityMetadata,
        name: &str,
    ) -> Result<ResolvedField<'a>, MetadataError> {
        if name == "id" {
            return Ok(ResolvedField {
                name: name.to_string(),
                kind: FieldKind::PrimaryKey,
                owner: meta,
                base_index: None,
            });
        }
        if let Some(field) = meta.field(name) {
            return Ok(ResolvedField {
                name: name.to_string(),
                kind: field.kind.clone(),
                owner: meta,
                base_index: None,
            });
        }
        match &meta.inheritance {
            Inheritance::ClassTable { base_types, .. } => {
                for (i, base) in base_types.iter().enumerate() {
                    let base_meta = self.entity(base)?;
                    if let Some(field) = base_meta.field(name) {
                        return Ok(ResolvedField {
                            name: name.to_string(),
                            kind: field.kind.clone(),
                            owner: base_meta,
                            base_index: Some(i),
                        });
                    }
                }
            }
            Inheritance::SingleTable {
                base_type: Some(base),
                ..
            } => {
                let base_meta = self.entity(base)?;
                let mut resolved = self.resolve_field(base_meta, name).map_err(|e| match e {
                    MetadataError::UnknownField { .. } => {
                        MetadataError::unknown_field(&meta.type_name, name)
                    }
                    other => other,
                })?;
                // Same physical table, so the column is on our own alias
                resolved.base_index = None;
                return Ok(resolved);
            }
            _ => {}
        }
        Err(MetadataError::unknown_field(&meta.type_name, name))
    }
}
