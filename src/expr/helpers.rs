use std::collections::BTreeMap;

use log::trace;
use thiserror::Error;

use crate::domain::TypeName;

/// State of the generation phase that helpers may look at: which record is being
/// produced and its position in the batch.
///
/// Template evaluation during recipe parsing happens before any record exists, so
/// there helpers always receive `None`.
#[derive(Debug, Clone)]
pub struct HelperContext {
    pub object_type: TypeName,
    pub index: u64,
}

/// Named function callable from a template placeholder.
pub trait Helper: Send + Sync {
    fn call(&self, ctx: Option<&HelperContext>, args: &[String]) -> Result<String, HelperError>;
}

impl<F> Helper for F
where
    F: Fn(Option<&HelperContext>, &[String]) -> Result<String, HelperError> + Send + Sync,
{
    fn call(&self, ctx: Option<&HelperContext>, args: &[String]) -> Result<String, HelperError> {
        self(ctx, args)
    }
}

#[derive(Debug, Error)]
pub enum HelperError {
    #[error("expected {expected} argument(s), got {found}")]
    Arity { expected: usize, found: usize },

    #[error("invalid argument `{arg}`: {reason}")]
    InvalidArgument { arg: String, reason: String },

    #[error("{0}")]
    Failed(String),
}

/// Table of helpers available to templates, looked up by name.
#[derive(Default)]
pub struct HelperTable {
    helpers: BTreeMap<String, Box<dyn Helper>>,
}

impl HelperTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the string helpers every recipe can rely on:
    /// `upper`, `lower`, `trim`, `concat` and `repeat`.
    pub fn standard() -> Self {
        let mut table = Self::new();
        table.register("upper", |_: Option<&HelperContext>, args: &[String]| {
            one(args).map(str::to_uppercase)
        });
        table.register("lower", |_: Option<&HelperContext>, args: &[String]| {
            one(args).map(str::to_lowercase)
        });
        table.register("trim", |_: Option<&HelperContext>, args: &[String]| {
            one(args).map(|s| s.trim().to_owned())
        });
        table.register(
            "concat",
            |_: Option<&HelperContext>, args: &[String]| -> Result<String, HelperError> {
                Ok(args.concat())
            },
        );
        table.register(
            "repeat",
            |_: Option<&HelperContext>, args: &[String]| -> Result<String, HelperError> {
                let [s, n] = args else {
                    return Err(HelperError::Arity {
                        expected: 2,
                        found: args.len(),
                    });
                };
                let n: usize = n.parse().map_err(|_| HelperError::InvalidArgument {
                    arg: n.clone(),
                    reason: "expected a non-negative integer".to_owned(),
                })?;
                Ok(s.repeat(n))
            },
        );
        table
    }

    /// Add a helper, returning the one previously registered under the same name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        helper: impl Helper + 'static,
    ) -> Option<Box<dyn Helper>> {
        let name = name.into();
        trace!("Registering template helper `{name}`");
        self.helpers.insert(name, Box::new(helper))
    }

    pub fn get(&self, name: &str) -> Option<&dyn Helper> {
        self.helpers.get(name).map(|h| h.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.helpers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.helpers.keys().map(String::as_str)
    }

    /// Bind every helper to the given context.
    pub fn bind<'a>(&'a self, ctx: Option<&'a HelperContext>) -> BoundHelpers<'a> {
        BoundHelpers { table: self, ctx }
    }
}

impl std::fmt::Debug for HelperTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.helpers.keys()).finish()
    }
}

/// Helper table with the context argument already supplied. This is what a
/// [super::TemplateFormatter] gets to call into.
#[derive(Debug, Clone, Copy)]
pub struct BoundHelpers<'a> {
    table: &'a HelperTable,
    ctx: Option<&'a HelperContext>,
}

impl<'a> BoundHelpers<'a> {
    /// Call helper `name`. Returns `None` if there is no such helper.
    pub fn call(&self, name: &str, args: &[String]) -> Option<Result<String, HelperError>> {
        self.table.get(name).map(|h| h.call(self.ctx, args))
    }
}

fn one(args: &[String]) -> Result<&str, HelperError> {
    match args {
        [s] => Ok(s),
        _ => Err(HelperError::Arity {
            expected: 1,
            found: args.len(),
        }),
    }
}
