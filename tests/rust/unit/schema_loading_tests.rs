//! Schema loading and validation

use std::io::Write;

use ormplan::metadata::{MetadataError, MetadataProvider, Schema};

use super::{library_schema, LIBRARY_SCHEMA};

#[test]
fn test_fixture_schema_indexes_by_name_and_tag() {
    let schema = library_schema();
    assert_eq!(schema.entity("Book").unwrap().table_name, "books");
    // Subtypes share their base's tag; the base owns it
    assert_eq!(schema.entity_by_tag("p").unwrap().type_name, "Publisher");
    assert!(schema.entity_by_tag("zz").is_none());
}

#[test]
fn test_schema_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(LIBRARY_SCHEMA.as_bytes()).unwrap();
    let schema = Schema::from_yaml_file(file.path()).unwrap();
    assert_eq!(schema.entities().len(), library_schema().entities().len());
}

#[test]
fn test_missing_file() {
    assert!(matches!(
        Schema::from_yaml_file("/nonexistent/schema.yaml"),
        Err(MetadataError::SchemaReadError { .. })
    ));
}

#[test]
fn test_dangling_reference_rejected() {
    let yaml = r#"
entities:
  - type_name: Author
    table_name: authors
    tag: a
    fields:
      - { name: books, kind: one_to_many, other_type: Book, other_column: author_id }
"#;
    assert_eq!(
        Schema::from_yaml_str(yaml).unwrap_err(),
        MetadataError::DanglingReference {
            entity: "Author".to_string(),
            field: "books".to_string(),
            other_type: "Book".to_string(),
        }
    );
}

#[test]
fn test_duplicate_entity_rejected() {
    let yaml = r#"
entities:
  - { type_name: Tag, table_name: tags, tag: t }
  - { type_name: Tag, table_name: tags, tag: t }
"#;
    assert_eq!(
        Schema::from_yaml_str(yaml).unwrap_err(),
        MetadataError::DuplicateEntity("Tag".to_string())
    );
}

#[test]
fn test_unknown_entity() {
    assert_eq!(
        library_schema().entity("Nope").unwrap_err(),
        MetadataError::UnknownEntity {
            type_name: "Nope".to_string()
        }
    );
}
