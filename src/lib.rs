//! Factory YAML turns recipe files describing synthetic records into factory
//! descriptors for a data generation library.
//!
//! # Recipes
//! A recipe is a YAML sequence. Every entry holds a single `object` key whose value
//! describes one kind of record:
//!
//! ```yaml
//! - object:
//!     type: Account
//!     nickname: main_account
//!     count: 10
//!     fields:
//!       Name: "{{ upper('acme') }}"
//!       Employees: 250
//!       Owner:
//!         type: User
//!         fields:
//!           Alias: boss
//!     friends:
//!       - object:
//!           type: Contact
//!           count: "n <<= 2"
//! ```
//!
//! - `type` is required and names the record type.
//! - `fields` maps field names to scalars or to nested records (a mapping with its own
//!   `type`). Nested records are generated for the field and referenced by it.
//! - `friends` lists records generated alongside this one, in the same shape as the
//!   top level.
//! - `nickname` names the record so other parts of a recipe can refer to it.
//! - `count` is either an integer or a formula. Formulas (anything containing `<<`
//!   or `=`) are kept as text for the generation phase.
//!
//! String values may contain `{{ helper(args) }}` placeholders. They are not expanded
//! while parsing; see [expr::Evaluator].
//!
//! Parsing is all or nothing: the first problem aborts the whole recipe and reports
//! the position it was found at. [error_expl::Pretty] renders such errors with the
//! offending recipe line.

/// Descriptor types built from recipes.
pub mod domain;

/// Loading of recipe files and parsing them into descriptors.
pub mod project;

/// Template evaluation for string values.
pub mod expr;

/// Running external command-line tools.
pub mod command;

/// Module to aid user in understanding errors and providing hints on how to fix them.
pub mod error_expl;

/// Source positions.
pub mod span;

use std::path::Path;

pub use domain::{Count, FieldFactory, FieldValue, ObjectFactory, SimpleValue};
pub use project::{Document, ErrorKind, LoadError, ParseError};

/// Parsed recipe, ready for the generation phase.
#[derive(Debug, Clone, PartialEq)]
pub struct Generator {
    objects: Vec<ObjectFactory>,
    copies: u64,
}

impl Generator {
    /// Top-level descriptors in recipe order.
    pub fn objects(&self) -> &[ObjectFactory] {
        &self.objects
    }

    pub fn into_objects(self) -> Vec<ObjectFactory> {
        self.objects
    }

    /// Number of copies requested by the caller. Not interpreted here, it is
    /// handed over to the generation phase as given.
    pub fn copies(&self) -> u64 {
        self.copies
    }

    pub fn to_yaml(&self) -> Result<String, serde_yml::Error> {
        domain::objects_to_yaml(&self.objects)
    }
}

/// Load the recipe at `path` and parse it into descriptors.
pub fn parse_generator(path: impl AsRef<Path>, copies: u64) -> Result<Generator, LoadError> {
    let doc = Document::load_file(path.as_ref())?;
    Ok(Generator {
        objects: doc.parse()?,
        copies,
    })
}

/// Same as [parse_generator], for recipe text already in memory.
pub fn parse_generator_str(source: &str, copies: u64) -> Result<Generator, LoadError> {
    let doc = Document::load_str(source)?;
    Ok(Generator {
        objects: doc.parse()?,
        copies,
    })
}

/// Log lines written since [init_log], for tests that check what gets logged.
#[cfg(test)]
static LOG_LINES: std::sync::Mutex<Vec<String>> = std::sync::Mutex::new(Vec::new());

#[cfg(test)]
pub fn init_log() {
    use log::*;

    static INIT: std::sync::Once = std::sync::Once::new();

    INIT.call_once(|| {
        flexi_logger::Logger::with(LevelFilter::Trace)
            .format(format)
            .log_to_writer(Box::new(CaptureWriter))
            .start()
            .map(std::mem::forget)
            .unwrap();
    });

    fn format(
        write: &mut dyn std::io::Write,
        _: &mut flexi_logger::DeferredNow,
        record: &Record,
    ) -> std::io::Result<()> {
        write.write_all(
            format!(
                "[{} {}:{}] {} - {}",
                record.level(),
                record.file().unwrap_or_default(),
                record.line().unwrap_or_default(),
                record.module_path().unwrap_or_default(),
                record.args()
            )
            .as_bytes(),
        )
    }

    /// Prints every record to stderr and keeps a copy in [LOG_LINES].
    struct CaptureWriter;

    impl flexi_logger::writers::LogWriter for CaptureWriter {
        fn write(
            &self,
            now: &mut flexi_logger::DeferredNow,
            record: &Record,
        ) -> std::io::Result<()> {
            let mut buf = Vec::new();
            format(&mut buf, now, record)?;
            let line = String::from_utf8_lossy(&buf).into_owned();
            eprintln!("{line}");
            if let Ok(mut lines) = LOG_LINES.lock() {
                lines.push(line);
            }
            Ok(())
        }

        fn flush(&self) -> std::io::Result<()> {
            Ok(())
        }
    }
}

/// Every log line written so far in this test process.
#[cfg(test)]
pub fn captured_log() -> Vec<String> {
    init_log();
    LOG_LINES.lock().map(|lines| lines.clone()).unwrap_or_default()
}

/// Sample recipe used across tests.
#[cfg(test)]
pub fn sample_recipe() -> &'static str {
    include_str!("../demos/sample_recipe.yml")
}
