//! Event receiver for `yaml_rust2` that builds a [Node] tree where every node keeps
//! the position it started at. `yaml_rust2::Yaml` itself forgets positions, and we need
//! them to point recipe errors at the offending line.

use std::collections::BTreeMap;

use lazy_regex::regex_is_match;
use log::trace;
use yaml_rust2::{
    parser::{MarkedEventReceiver, Parser, Tag},
    scanner::{Marker, TScalarStyle},
    Event, ScanError, Yaml,
};

use crate::span::Marked;

/// YAML node with positions attached to all children.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Node {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    String(String),
    Sequence(Vec<Marked<Node>>),

    /// Mapping in document order. Keys are unique.
    Mapping(Vec<(Marked<Node>, Marked<Node>)>),
}

impl Node {
    /// Human readable name of the node kind for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Null => "null",
            Node::Bool(_) => "boolean",
            Node::Integer(_) => "integer",
            Node::Real(_) => "real number",
            Node::String(_) => "string",
            Node::Sequence(_) => "sequence",
            Node::Mapping(_) => "mapping",
        }
    }

    /// Look up a value by string key, when this node is a mapping.
    pub fn get(&self, key: &str) -> Option<&Marked<Node>> {
        match self {
            Node::Mapping(entries) => entries
                .iter()
                .find(|(k, _)| matches!(&**k, Node::String(s) if s == key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the node would count as "nothing" in a boolean context:
    /// null, `false`, zero, empty string or empty collection.
    pub fn is_falsy(&self) -> bool {
        match self {
            Node::Null => true,
            Node::Bool(b) => !b,
            Node::Integer(i) => *i == 0,
            Node::Real(r) => *r == 0.0,
            Node::String(s) => s.is_empty(),
            Node::Sequence(v) => v.is_empty(),
            Node::Mapping(m) => m.is_empty(),
        }
    }

    fn from_scalar(yaml: Yaml, mark: Marker) -> Result<Node, ScanError> {
        Ok(match yaml {
            Yaml::Null => Node::Null,
            Yaml::Boolean(b) => Node::Bool(b),
            Yaml::Integer(i) => Node::Integer(i),
            Yaml::String(s) => Node::String(s),
            Yaml::Real(s) => match parse_f64(&s) {
                Some(r) => Node::Real(r),
                None => {
                    return Err(ScanError::new_string(
                        mark,
                        format!("`{s}` is not a valid real number"),
                    ))
                }
            },
            other => {
                return Err(ScanError::new_string(
                    mark,
                    format!("invalid scalar value: {other:?}"),
                ))
            }
        })
    }
}

/// Upper bound on the nodes copied in by aliases, over the whole stream.
/// Aliases of aliases grow exponentially, so the bound is checked before cloning.
pub const MAX_ALIAS_NODES: usize = 100_000;

#[derive(Default)]
pub struct YamlLoader {
    /// The different YAML documents that are loaded.
    docs: Vec<Marked<Node>>,
    // (node, anchor_id, node count)
    doc_stack: Vec<(Marked<Node>, usize, usize)>,
    key_stack: Vec<Option<Marked<Node>>>,
    // anchor_id -> (node, node count)
    anchor_map: BTreeMap<usize, (Marked<Node>, usize)>,
    alias_nodes: usize,
    /// An error, if one was encountered.
    error: Option<ScanError>,
}

impl MarkedEventReceiver for YamlLoader {
    fn on_event(&mut self, ev: Event, mark: Marker) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = self.on_event_impl(ev, mark) {
            self.error = Some(e);
        }
    }
}

impl YamlLoader {
    fn on_event_impl(&mut self, ev: Event, mark: Marker) -> Result<(), ScanError> {
        match ev {
            Event::DocumentStart | Event::Nothing | Event::StreamStart | Event::StreamEnd => {}
            Event::DocumentEnd => match self.doc_stack.pop() {
                None => self.docs.push(Marked::new(Node::Null, mark.into())),
                Some((node, ..)) if self.doc_stack.is_empty() => self.docs.push(node),
                Some(_) => return Err(unbalanced(mark)),
            },
            Event::SequenceStart(aid, _) => {
                self.doc_stack
                    .push((Marked::new(Node::Sequence(Vec::new()), mark.into()), aid, 1));
            }
            Event::MappingStart(aid, _) => {
                self.doc_stack
                    .push((Marked::new(Node::Mapping(Vec::new()), mark.into()), aid, 1));
                self.key_stack.push(None);
            }
            Event::SequenceEnd => {
                let node = self.doc_stack.pop().ok_or_else(|| unbalanced(mark))?;
                self.insert_new_node(node, mark)?;
            }
            Event::MappingEnd => {
                self.key_stack.pop().ok_or_else(|| unbalanced(mark))?;
                let node = self.doc_stack.pop().ok_or_else(|| unbalanced(mark))?;
                self.insert_new_node(node, mark)?;
            }
            Event::Scalar(v, style, aid, tag) => {
                let yaml = if style != TScalarStyle::Plain {
                    Yaml::String(v)
                } else if let Some(Tag {
                    ref handle,
                    ref suffix,
                }) = tag
                {
                    if handle == "tag:yaml.org,2002:" {
                        match suffix.as_ref() {
                            "bool" => match v.parse::<bool>() {
                                Err(_) => Yaml::BadValue,
                                Ok(v) => Yaml::Boolean(v),
                            },
                            "int" => match v.parse::<i64>() {
                                Err(_) => Yaml::BadValue,
                                Ok(v) => Yaml::Integer(v),
                            },
                            "float" => Yaml::Real(v),
                            "null" => match v.as_ref() {
                                "~" | "null" => Yaml::Null,
                                _ => Yaml::BadValue,
                            },
                            _ => Yaml::String(v),
                        }
                    } else {
                        Yaml::String(v)
                    }
                } else {
                    // Datatype is not specified, or unrecognized.
                    // `Yaml::from_str` falls back to `f64::parse`, which also takes
                    // words like `inf` or `nan`; the core schema keeps those strings.
                    match Yaml::from_str(&v) {
                        Yaml::Real(_) if !is_core_float(&v) => Yaml::String(v),
                        yaml => yaml,
                    }
                };

                let node = Node::from_scalar(yaml, mark)?;
                self.insert_new_node((Marked::new(node, mark.into()), aid, 1), mark)?;
            }
            Event::Alias(id) => {
                let (node, size) = self.anchor_map.get(&id).ok_or_else(|| {
                    ScanError::new_string(mark, format!("unknown anchor id {id}"))
                })?;
                self.alias_nodes += size;
                if self.alias_nodes > MAX_ALIAS_NODES {
                    return Err(ScanError::new_string(
                        mark,
                        format!("aliases expand to more than {MAX_ALIAS_NODES} nodes"),
                    ));
                }
                let (node, size) = (node.clone(), *size);
                self.insert_new_node((node, 0, size), mark)?;
            }
        }
        Ok(())
    }

    fn insert_new_node(
        &mut self,
        (node, aid, size): (Marked<Node>, usize, usize),
        mark: Marker,
    ) -> Result<(), ScanError> {
        // valid anchor id starts from 1
        if aid > 0 {
            self.anchor_map.insert(aid, (node.clone(), size));
        }

        if self.doc_stack.is_empty() {
            self.doc_stack.push((node, aid, size));
            return Ok(());
        }
        let (parent, _, parent_size) =
            self.doc_stack.last_mut().ok_or_else(|| unbalanced(mark))?;
        *parent_size += size;

        match &mut **parent {
            Node::Sequence(v) => v.push(node),
            Node::Mapping(entries) => {
                let cur_key = self.key_stack.last_mut().ok_or_else(|| unbalanced(mark))?;
                match cur_key.take() {
                    // current node is a key
                    None => *cur_key = Some(node),
                    // current node is a value
                    Some(key) => {
                        if entries.iter().any(|(k, _)| *k == key) {
                            return Err(ScanError::new_string(
                                mark,
                                format!("{:?}: duplicated key in mapping", *key),
                            ));
                        }
                        entries.push((key, node));
                    }
                }
            }
            _ => return Err(unbalanced(mark)),
        }
        Ok(())
    }

    /// Load the given string as a set of YAML documents.
    ///
    /// Parsing succeeds if and only if all documents are parsed successfully.
    /// # Errors
    /// Returns `ScanError` when loading fails.
    pub fn load_from_str(source: &str) -> Result<Vec<Marked<Node>>, ScanError> {
        let mut parser = Parser::new(source.chars());
        let mut loader = YamlLoader::default();
        parser.load(&mut loader, true)?;
        if let Some(e) = loader.error {
            Err(e)
        } else {
            trace!("Loaded {} YAML document(s)", loader.docs.len());
            Ok(loader.docs)
        }
    }
}

fn unbalanced(mark: Marker) -> ScanError {
    ScanError::new_string(mark, "unbalanced YAML event stream".to_owned())
}

fn special_f64(v: &str) -> Option<f64> {
    match v {
        ".inf" | ".Inf" | ".INF" | "+.inf" | "+.Inf" | "+.INF" => Some(f64::INFINITY),
        "-.inf" | "-.Inf" | "-.INF" => Some(f64::NEG_INFINITY),
        ".nan" | "NaN" | ".NAN" => Some(f64::NAN),
        _ => None,
    }
}

fn parse_f64(v: &str) -> Option<f64> {
    special_f64(v).or_else(|| v.parse::<f64>().ok())
}

/// Whether a plain scalar reads as a float under the YAML 1.2 core schema.
fn is_core_float(v: &str) -> bool {
    regex_is_match!(r"^[-+]?(\.[0-9]+|[0-9]+(\.[0-9]*)?)([eE][-+]?[0-9]+)?$", v)
        || special_f64(v).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_one(src: &str) -> Marked<Node> {
        let mut docs = YamlLoader::load_from_str(src).unwrap();
        assert_eq!(docs.len(), 1);
        docs.remove(0)
    }

    #[test]
    fn scalars() {
        let doc = load_one("[1, 2.5, abc, 'quoted 1', true, ~]");
        let Node::Sequence(items) = doc.into_inner() else {
            panic!("expected sequence");
        };
        let items: Vec<_> = items.into_iter().map(Marked::into_inner).collect();
        assert_eq!(
            items,
            vec![
                Node::Integer(1),
                Node::Real(2.5),
                Node::String("abc".to_owned()),
                Node::String("quoted 1".to_owned()),
                Node::Bool(true),
                Node::Null,
            ]
        );
    }

    #[test]
    fn mapping_keeps_order_and_marks() {
        let doc = load_one("zeta: 1\nalpha: 2\n");
        let Node::Mapping(entries) = &*doc else {
            panic!("expected mapping");
        };
        let keys: Vec<_> = entries.iter().map(|(k, _)| k.as_str().unwrap()).collect();
        assert_eq!(keys, ["zeta", "alpha"]);
        assert!(entries[1].0.mark().line() > entries[0].0.mark().line());
        assert_eq!(doc.get("alpha").map(|v| (**v).clone()), Some(Node::Integer(2)));
    }

    #[test]
    fn duplicate_key_rejected() {
        let err = YamlLoader::load_from_str("a: 1\na: 2\n").unwrap_err();
        assert!(err.to_string().contains("duplicated key"), "{err}");
    }

    #[test]
    fn alias_resolves_to_anchor() {
        let doc = load_one("base: &b {type: Account}\ncopy: *b\n");
        assert_eq!(doc.get("base"), doc.get("copy"));
    }

    #[test]
    fn float_words_stay_strings() {
        let doc = load_one("[nan, inf, infinity, Infinity, -inf, NaN, .inf, -.Inf, 1e3, .5, 2.]");
        let Node::Sequence(items) = doc.into_inner() else {
            panic!("expected sequence");
        };
        let items: Vec<_> = items.into_iter().map(Marked::into_inner).collect();
        for (item, word) in items[..5].iter().zip(["nan", "inf", "infinity", "Infinity", "-inf"]) {
            assert_eq!(item, &Node::String(word.to_owned()));
        }
        assert!(matches!(items[5], Node::Real(r) if r.is_nan()));
        assert_eq!(items[6], Node::Real(f64::INFINITY));
        assert_eq!(items[7], Node::Real(f64::NEG_INFINITY));
        assert_eq!(items[8], Node::Real(1000.0));
        assert_eq!(items[9], Node::Real(0.5));
        assert_eq!(items[10], Node::Real(2.0));
    }

    #[test]
    fn nested_aliases_are_capped() {
        let src = "\
a: &a [x, x, x, x, x, x, x, x, x, x]
b: &b [*a, *a, *a, *a, *a, *a, *a, *a, *a, *a]
c: &c [*b, *b, *b, *b, *b, *b, *b, *b, *b, *b]
d: &d [*c, *c, *c, *c, *c, *c, *c, *c, *c, *c]
e: &e [*d, *d, *d, *d, *d, *d, *d, *d, *d, *d]
f: &f [*e, *e, *e, *e, *e, *e, *e, *e, *e, *e]
g: &g [*f, *f, *f, *f, *f, *f, *f, *f, *f, *f]
h: &h [*g, *g, *g, *g, *g, *g, *g, *g, *g, *g]
";
        let err = YamlLoader::load_from_str(src).unwrap_err();
        assert!(err.to_string().contains("aliases expand"), "{err}");

        // a few levels of aliases stay well below the bound
        let small = src.lines().take(3).collect::<Vec<_>>().join("\n");
        let doc = load_one(&small);
        let Some(Node::Sequence(c)) = doc.get("c").map(|c| &**c) else {
            panic!("expected sequence");
        };
        assert_eq!(c.len(), 10);
    }

    #[test]
    fn empty_document_is_null() {
        let docs = YamlLoader::load_from_str("").unwrap();
        assert!(docs.iter().all(|d| **d == Node::Null));
    }

    #[test]
    fn falsy() {
        assert!(Node::Null.is_falsy());
        assert!(Node::Mapping(vec![]).is_falsy());
        assert!(Node::String(String::new()).is_falsy());
        assert!(!Node::String("x".to_owned()).is_falsy());
        assert!(!Node::Integer(3).is_falsy());
    }
}
