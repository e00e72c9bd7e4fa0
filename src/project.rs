use std::path::{Path, PathBuf};

use log::{debug, trace};
use thiserror::Error;

use crate::{domain::ObjectFactory, span::Marked};

/// Conversion of the loaded YAML nodes into [ObjectFactory] trees.
pub mod parse;

mod yaml_loader;

pub use parse::{ErrorKind, ParseError};
pub use yaml_loader::Node;

/// Recipe document: the top-level sequence of `object` entries, not yet interpreted.
#[derive(Debug, Clone)]
pub struct Document {
    entries: Vec<Marked<Node>>,
}

impl Document {
    /// Reads and decodes the recipe at `path`. The file is closed before any parsing
    /// of the contents begins.
    pub fn load_file(path: &Path) -> Result<Self, LoadError> {
        debug!("Loading recipe from {}", path.display());
        let source = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::load_str(&source)
    }

    /// Decodes a recipe from YAML text. Only the top-level shape is checked here:
    /// the document must be a single sequence.
    pub fn load_str(source: &str) -> Result<Self, LoadError> {
        let mut docs = yaml_loader::YamlLoader::load_from_str(source)?;
        if docs.len() > 1 {
            return Err(LoadError::MultipleDocuments(docs.len()));
        }

        let root = docs.pop().unwrap_or_default();
        let (node, at) = root.split();
        match node {
            Node::Sequence(entries) => {
                trace!("Recipe has {} top-level entries", entries.len());
                Ok(Self { entries })
            }
            other => Err(ParseError::NotASequence {
                what: "recipe",
                found: other.kind(),
                at,
            }
            .into()),
        }
    }

    pub fn entries(&self) -> &[Marked<Node>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build the descriptor tree. Either every entry parses or nothing is returned.
    pub fn parse(&self) -> Result<Vec<ObjectFactory>, ParseError> {
        parse::parse_object_list(&self.entries)
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read recipe `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Recipe is not valid YAML. {0}")]
    Yaml(#[from] yaml_rust2::ScanError),

    #[error("Recipe must contain exactly one YAML document, found {0}")]
    MultipleDocuments(usize),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl LoadError {
    /// Category of the recipe error, if the failure came from the recipe contents
    /// rather than from reading or decoding the file.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            LoadError::Parse(e) => Some(e.kind()),
            LoadError::MultipleDocuments(_) => Some(ErrorKind::Structural),
            LoadError::Io { .. } | LoadError::Yaml(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_level_mapping_is_structural() {
        let err = Document::load_str("object:\n  type: Account\n").unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Structural));
        assert!(err.to_string().contains("mapping"), "{err}");
    }

    #[test]
    fn top_level_scalar_is_structural() {
        let err = Document::load_str("42").unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Structural));
    }

    #[test]
    fn empty_file_is_structural() {
        let err = Document::load_str("").unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Structural));
    }

    #[test]
    fn multiple_documents_rejected() {
        let err = Document::load_str("- a\n---\n- b\n").unwrap_err();
        assert!(matches!(err, LoadError::MultipleDocuments(2)), "{err:?}");
    }

    #[test]
    fn invalid_yaml() {
        let err = Document::load_str("- [unterminated\n").unwrap_err();
        assert!(matches!(err, LoadError::Yaml(_)), "{err:?}");
        assert_eq!(err.kind(), None);
    }

    #[test]
    fn missing_file() {
        let err = Document::load_file(Path::new("/nonexistent/recipe.yml")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }), "{err:?}");
    }

    #[test]
    fn sequence_is_loaded() {
        let doc = Document::load_str("- object: {type: A}\n- object: {type: B}\n").unwrap();
        assert_eq!(doc.len(), 2);
    }
}
