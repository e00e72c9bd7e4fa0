use log::{debug, trace};
use thiserror::Error;

use crate::{
    domain::{FieldFactory, FieldName, FieldValue, ObjectFactory, SimpleValue, TypeName},
    span::{Marked, Marker},
};

use super::Node;

/// Resolution of the `count` key of an object.
mod count;

pub use count::parse_count;

/// Key under which every list entry holds its object record.
const OBJECT_KEY: &str = "object";

/// Broad category of a [ParseError].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The document or an entry does not have the expected shape.
    Structural,

    /// A required key or definition is absent.
    MissingField,

    /// A field value is neither a scalar nor a mapping.
    UnsupportedType,

    /// The `count` of an object cannot be interpreted.
    InvalidCount,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{at}: {what} must be a sequence of `object` entries, found {found}")]
    NotASequence {
        what: &'static str,
        found: &'static str,
        at: Marker,
    },

    #[error("{at}: list entry is missing the `object` key")]
    MissingObjectKey { at: Marker },

    #[error("{at}: object definition must be a non-empty mapping, found {found}")]
    EmptyObject { found: &'static str, at: Marker },

    #[error("{at}: `{key}` must be a {expected}, found {found}")]
    UnexpectedShape {
        key: &'static str,
        expected: &'static str,
        found: &'static str,
        at: Marker,
    },

    #[error("{at}: object is missing the required `type` key")]
    MissingType { at: Marker },

    #[error("{at}: `type` must be a non-empty string, found {found}")]
    InvalidTypeName { found: String, at: Marker },

    #[error("{at}: field names must be non-empty strings, found {found}")]
    InvalidFieldName { found: String, at: Marker },

    #[error("{at}: field should have a definition: {name}")]
    MissingFieldDefinition { name: FieldName, at: Marker },

    #[error("{at}: unknown field type for `{name}`: {found}")]
    UnsupportedFieldType {
        name: FieldName,
        found: &'static str,
        at: Marker,
    },

    #[error("{at}: expected count of {ty} to be a number, not {found}")]
    InvalidCount {
        ty: TypeName,
        found: String,
        at: Marker,
    },

    #[error("{at}: {source}")]
    DuplicateField {
        source: crate::domain::DuplicateField,
        at: Marker,
    },
}

impl ParseError {
    pub fn kind(&self) -> ErrorKind {
        use ParseError::*;

        match self {
            NotASequence { .. }
            | MissingObjectKey { .. }
            | EmptyObject { .. }
            | UnexpectedShape { .. }
            | InvalidTypeName { .. }
            | DuplicateField { .. } => ErrorKind::Structural,
            MissingType { .. } | InvalidFieldName { .. } | MissingFieldDefinition { .. } => {
                ErrorKind::MissingField
            }
            UnsupportedFieldType { .. } => ErrorKind::UnsupportedType,
            InvalidCount { .. } => ErrorKind::InvalidCount,
        }
    }

    /// Position in the recipe where the problem was found.
    pub fn at(&self) -> Marker {
        use ParseError::*;

        match self {
            NotASequence { at, .. }
            | MissingObjectKey { at }
            | EmptyObject { at, .. }
            | UnexpectedShape { at, .. }
            | MissingType { at }
            | InvalidTypeName { at, .. }
            | InvalidFieldName { at, .. }
            | MissingFieldDefinition { at, .. }
            | UnsupportedFieldType { at, .. }
            | InvalidCount { at, .. }
            | DuplicateField { at, .. } => *at,
        }
    }
}

/// Parse a sequence of `{object: ...}` entries, keeping their order.
pub fn parse_object_list(entries: &[Marked<Node>]) -> Result<Vec<ObjectFactory>, ParseError> {
    entries
        .iter()
        .map(|entry| {
            let object = entry
                .get(OBJECT_KEY)
                .ok_or(ParseError::MissingObjectKey { at: entry.mark() })?;
            if object.is_falsy() {
                return Err(ParseError::EmptyObject {
                    found: object.kind(),
                    at: object.mark(),
                });
            }
            parse_object(object)
        })
        .collect()
}

/// Parse one object record into its descriptor.
pub fn parse_object(record: &Marked<Node>) -> Result<ObjectFactory, ParseError> {
    if !matches!(&**record, Node::Mapping(m) if !m.is_empty()) {
        return Err(ParseError::EmptyObject {
            found: record.kind(),
            at: record.mark(),
        });
    }

    let ty = record
        .get("type")
        .ok_or(ParseError::MissingType { at: record.mark() })?;
    let ty = ty
        .as_str()
        .and_then(|s| TypeName::new(s.to_owned()).ok())
        .ok_or_else(|| ParseError::InvalidTypeName {
            found: describe(ty),
            at: ty.mark(),
        })?;
    trace!("Parsing object `{ty}`");

    let mut builder = ObjectFactory::builder(ty.clone());

    if let Some(fields) = present(record.get("fields")) {
        let Node::Mapping(fields_map) = &**fields else {
            return Err(unexpected_shape("fields", "mapping", fields));
        };
        for (name, definition) in fields_map {
            let field = parse_field(name, definition)?;
            builder
                .add_field(field)
                .map_err(|source| ParseError::DuplicateField {
                    source,
                    at: name.mark(),
                })?;
        }
    }

    if let Some(friends) = present(record.get("friends")) {
        let Node::Sequence(friends_list) = &**friends else {
            return Err(ParseError::NotASequence {
                what: "`friends`",
                found: friends.kind(),
                at: friends.mark(),
            });
        };
        for friend in parse_object_list(friends_list)? {
            builder.add_friend(friend);
        }
    }

    if let Some(nickname) = present(record.get("nickname")) {
        let name = nickname
            .as_str()
            .ok_or_else(|| unexpected_shape("nickname", "string", nickname))?;
        builder.nickname(name.to_owned());
    }

    if let Some(count) = present(record.get("count")) {
        builder.count(parse_count(&ty, count)?);
    }

    let object = builder.build();
    debug!(
        "Parsed object `{}` with {} field(s), {} friend(s)",
        object.ty(),
        object.fields().len(),
        object.friends().len()
    );
    Ok(object)
}

/// Parse one `name: definition` entry of a `fields` mapping.
pub fn parse_field(
    name: &Marked<Node>,
    definition: &Marked<Node>,
) -> Result<FieldFactory, ParseError> {
    let field_name = name
        .as_str()
        .and_then(|s| FieldName::new(s.to_owned()).ok())
        .ok_or_else(|| ParseError::InvalidFieldName {
            found: describe(name),
            at: name.mark(),
        })?;

    let value = match &**definition {
        Node::Null => {
            return Err(ParseError::MissingFieldDefinition {
                name: field_name,
                at: definition.mark(),
            })
        }
        Node::String(s) => FieldValue::Simple(SimpleValue::String(s.clone())),
        Node::Integer(i) => FieldValue::Simple(SimpleValue::Integer(*i)),
        Node::Real(r) => FieldValue::Simple(SimpleValue::Real(*r)),
        Node::Mapping(_) => FieldValue::ChildRecord(Box::new(parse_object(definition)?)),
        other => {
            return Err(ParseError::UnsupportedFieldType {
                name: field_name,
                found: other.kind(),
                at: definition.mark(),
            })
        }
    };

    trace!("Parsed field `{field_name}`");
    Ok(FieldFactory::new(field_name, value))
}

/// Optional keys written with an empty value (`fields:`) count as absent.
fn present(node: Option<&Marked<Node>>) -> Option<&Marked<Node>> {
    node.filter(|n| ***n != Node::Null)
}

fn unexpected_shape(key: &'static str, expected: &'static str, node: &Marked<Node>) -> ParseError {
    ParseError::UnexpectedShape {
        key,
        expected,
        found: node.kind(),
        at: node.mark(),
    }
}

/// Short rendering of a node for error messages.
fn describe(node: &Node) -> String {
    match node {
        Node::String(s) => format!("`{s}`"),
        Node::Integer(i) => i.to_string(),
        Node::Real(r) => r.to_string(),
        Node::Bool(b) => b.to_string(),
        other => other.kind().to_owned(),
    }
}
