use serde::{Serialize, Serializer};
use thiserror::Error;

/// Template for one synthetic record. This is what the data generation library consumes:
/// the record type, the values of its fields, the records to generate alongside it
/// (friends) and how many copies to produce.
///
/// Descriptors are built once, either by the YAML parser or through
/// [ObjectFactoryBuilder], and never change afterwards. Friends and nested records are
/// owned by their parent, so the whole recipe forms a tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectFactory {
    #[serde(rename = "type")]
    ty: TypeName,

    #[serde(skip_serializing_if = "Option::is_none")]
    nickname: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<Count>,

    #[serde(
        serialize_with = "serialize_fields",
        skip_serializing_if = "Vec::is_empty"
    )]
    fields: Vec<FieldFactory>,

    #[serde(
        serialize_with = "serialize_friends",
        skip_serializing_if = "Vec::is_empty"
    )]
    friends: Vec<ObjectFactory>,
}

impl ObjectFactory {
    pub fn builder(ty: TypeName) -> ObjectFactoryBuilder {
        ObjectFactoryBuilder {
            ty,
            nickname: None,
            count: None,
            fields: Vec::new(),
            friends: Vec::new(),
        }
    }

    pub fn ty(&self) -> &TypeName {
        &self.ty
    }

    pub fn nickname(&self) -> Option<&str> {
        self.nickname.as_deref()
    }

    /// Repetition of this record. `None` leaves the decision to the consumer.
    pub fn count(&self) -> Option<&Count> {
        self.count.as_ref()
    }

    /// Fields in the order they were declared.
    pub fn fields(&self) -> &[FieldFactory] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldFactory> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn friends(&self) -> &[ObjectFactory] {
        &self.friends
    }

    /// Serialize the descriptor back into the recipe shape it was read from:
    /// a single `object` entry.
    pub fn to_yaml(&self) -> Result<String, serde_yml::Error> {
        serde_yml::to_string(&[ObjectEntry { object: self }])
    }
}

/// Collects the parts of an [ObjectFactory] and checks that field names stay unique.
#[derive(Debug)]
pub struct ObjectFactoryBuilder {
    ty: TypeName,
    nickname: Option<String>,
    count: Option<Count>,
    fields: Vec<FieldFactory>,
    friends: Vec<ObjectFactory>,
}

impl ObjectFactoryBuilder {
    pub fn nickname(&mut self, nickname: String) -> &mut Self {
        self.nickname = Some(nickname);
        self
    }

    pub fn count(&mut self, count: Count) -> &mut Self {
        self.count = Some(count);
        self
    }

    pub fn add_field(&mut self, field: FieldFactory) -> Result<(), DuplicateField> {
        if self.fields.iter().any(|f| f.name == field.name) {
            return Err(DuplicateField {
                ty: self.ty.clone(),
                name: field.name,
            });
        }
        self.fields.push(field);
        Ok(())
    }

    pub fn add_friend(&mut self, friend: ObjectFactory) {
        self.friends.push(friend);
    }

    pub fn build(self) -> ObjectFactory {
        ObjectFactory {
            ty: self.ty,
            nickname: self.nickname,
            count: self.count,
            fields: self.fields,
            friends: self.friends,
        }
    }
}

#[derive(Debug, Error)]
#[error("Field `{name}` is defined more than once on `{ty}`")]
pub struct DuplicateField {
    pub ty: TypeName,
    pub name: FieldName,
}

/// One named attribute of an [ObjectFactory].
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFactory {
    name: FieldName,
    value: FieldValue,
}

impl FieldFactory {
    pub fn new(name: FieldName, value: FieldValue) -> Self {
        Self { name, value }
    }

    pub fn name(&self) -> &FieldName {
        &self.name
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Literal value, possibly holding a template to evaluate at generation time.
    Simple(SimpleValue),

    /// A record created for this field and referenced by it.
    ChildRecord(Box<ObjectFactory>),
}

impl FieldValue {
    pub fn as_simple(&self) -> Option<&SimpleValue> {
        match self {
            FieldValue::Simple(v) => Some(v),
            FieldValue::ChildRecord(_) => None,
        }
    }

    pub fn as_child_record(&self) -> Option<&ObjectFactory> {
        match self {
            FieldValue::Simple(_) => None,
            FieldValue::ChildRecord(obj) => Some(obj),
        }
    }
}

impl From<SimpleValue> for FieldValue {
    fn from(v: SimpleValue) -> Self {
        FieldValue::Simple(v)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Simple(s.into())
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Simple(i.into())
    }
}

impl From<ObjectFactory> for FieldValue {
    fn from(obj: ObjectFactory) -> Self {
        FieldValue::ChildRecord(Box::new(obj))
    }
}

/// Scalar taken literally from the recipe.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SimpleValue {
    String(String),
    Integer(i64),
    Real(f64),
}

impl SimpleValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SimpleValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for SimpleValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimpleValue::String(s) => s.fmt(f),
            SimpleValue::Integer(i) => i.fmt(f),
            SimpleValue::Real(r) => r.fmt(f),
        }
    }
}

impl From<&str> for SimpleValue {
    fn from(s: &str) -> Self {
        SimpleValue::String(s.to_owned())
    }
}

impl From<String> for SimpleValue {
    fn from(s: String) -> Self {
        SimpleValue::String(s)
    }
}

impl From<i64> for SimpleValue {
    fn from(i: i64) -> Self {
        SimpleValue::Integer(i)
    }
}

/// How many copies of a record to generate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Count {
    /// Count known at parse time.
    Fixed(u64),

    /// Formula left for the generation phase to evaluate.
    Deferred(String),
}

impl Count {
    pub fn fixed(&self) -> Option<u64> {
        match self {
            Count::Fixed(n) => Some(*n),
            Count::Deferred(_) => None,
        }
    }

    pub fn formula(&self) -> Option<&str> {
        match self {
            Count::Fixed(_) => None,
            Count::Deferred(s) => Some(s),
        }
    }
}

#[derive(Debug, Error)]
#[error("Invalid name: `{0}`")]
pub struct InvalidName(String);

macro_rules! name_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $name(String);

        impl $name {
            /// Name must contain at least one non-whitespace character.
            pub fn new(name: String) -> Result<Self, InvalidName> {
                if name.trim().is_empty() {
                    Err(InvalidName(name))
                } else {
                    Ok(Self(name))
                }
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = InvalidName;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $name::new(s.to_string())
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl<T: AsRef<str>> std::cmp::PartialEq<T> for $name {
            fn eq(&self, other: &T) -> bool {
                self.0 == other.as_ref()
            }
        }
    };
}

name_type!(
    /// Record type of an [ObjectFactory], e.g. `Account`.
    TypeName
);

name_type!(
    /// Name of a [FieldFactory], unique within its object.
    FieldName
);

/// Recipe entry in serialized form, `{object: ...}`.
#[derive(Serialize)]
struct ObjectEntry<'a> {
    object: &'a ObjectFactory,
}

fn serialize_fields<S: Serializer>(fields: &[FieldFactory], s: S) -> Result<S::Ok, S::Error> {
    s.collect_map(fields.iter().map(|f| (&f.name, &f.value)))
}

fn serialize_friends<S: Serializer>(friends: &[ObjectFactory], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(friends.iter().map(|object| ObjectEntry { object }))
}

/// Serialize a list of descriptors into the top-level recipe shape.
pub fn objects_to_yaml(objects: &[ObjectFactory]) -> Result<String, serde_yml::Error> {
    let entries: Vec<_> = objects.iter().map(|object| ObjectEntry { object }).collect();
    serde_yml::to_string(&entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(s: &str) -> TypeName {
        s.parse().unwrap()
    }

    fn name(s: &str) -> FieldName {
        s.parse().unwrap()
    }

    #[test]
    fn names_reject_blank() {
        assert!(TypeName::new(String::new()).is_err());
        assert!(FieldName::new("  ".to_string()).is_err());
        assert_eq!(ty("Account"), "Account");
    }

    #[test]
    fn builder_rejects_duplicate_field() {
        let mut b = ObjectFactory::builder(ty("Account"));
        b.add_field(FieldFactory::new(name("Name"), "Acme".into()))
            .unwrap();
        let err = b
            .add_field(FieldFactory::new(name("Name"), "Other".into()))
            .unwrap_err();
        assert_eq!(err.name, "Name");

        let obj = b.build();
        assert_eq!(obj.fields().len(), 1);
        assert_eq!(
            obj.field("Name").unwrap().value().as_simple(),
            Some(&SimpleValue::from("Acme"))
        );
    }

    #[test]
    fn count_accessors() {
        assert_eq!(Count::Fixed(3).fixed(), Some(3));
        assert_eq!(Count::Fixed(3).formula(), None);
        let deferred = Count::Deferred("x <<= 2".to_string());
        assert_eq!(deferred.fixed(), None);
        assert_eq!(deferred.formula(), Some("x <<= 2"));
    }

    #[test]
    fn to_yaml_keeps_field_order() {
        let mut child = ObjectFactory::builder(ty("Contact"));
        child
            .add_field(FieldFactory::new(name("LastName"), "Doe".into()))
            .unwrap();

        let mut b = ObjectFactory::builder(ty("Account"));
        b.count(Count::Fixed(2));
        b.add_field(FieldFactory::new(name("Zeta"), "z".into()))
            .unwrap();
        b.add_field(FieldFactory::new(name("Alpha"), 1i64.into()))
            .unwrap();
        b.add_field(FieldFactory::new(
            name("Primary"),
            FieldValue::ChildRecord(Box::new(child.build())),
        ))
        .unwrap();
        let yaml = b.build().to_yaml().unwrap();

        let zeta = yaml.find("Zeta").unwrap();
        let alpha = yaml.find("Alpha").unwrap();
        let primary = yaml.find("Primary").unwrap();
        assert!(zeta < alpha && alpha < primary, "{yaml}");
        assert!(yaml.contains("type: Account"), "{yaml}");
        assert!(yaml.contains("type: Contact"), "{yaml}");
        assert!(yaml.contains("count: 2"), "{yaml}");
    }
}
