use log::trace;
use smallvec::SmallVec;

use crate::project::LoadError;
use crate::span::Marker;

/// Renders recipe errors together with the lines of the recipe they point at.
pub struct Pretty<'yaml> {
    yaml: &'yaml str,
}

impl<'yaml> Pretty<'yaml> {
    pub fn new(yaml: &'yaml str) -> Self {
        Self { yaml }
    }

    pub fn explain_builder(&self) -> ExplainBuilder<'yaml> {
        ExplainBuilder {
            yaml: self.yaml,
            error_context: None,
            explain_contexts: Default::default(),
        }
    }

    /// Explain an error returned while loading this recipe. Errors without a position
    /// are rendered as a plain message.
    pub fn explain(&self, err: &LoadError) -> PrettyError {
        let at = match err {
            LoadError::Parse(e) => Some(e.at()),
            LoadError::Yaml(e) => Some(Marker::from(*e.marker())),
            LoadError::Io { .. } | LoadError::MultipleDocuments(_) => None,
        };

        let Some(at) = at else {
            return PrettyError(format!("error: {err}"));
        };

        let mut builder = self.explain_builder();
        builder.error(Context::new(at, err.to_string()));
        builder
            .build()
            .unwrap_or_else(|_| PrettyError(format!("error: {err}")))
    }
}

pub struct ExplainBuilder<'yaml> {
    yaml: &'yaml str,
    error_context: Option<Context>,
    explain_contexts: SmallVec<[Context; 4]>,
}

impl<'yaml> ExplainBuilder<'yaml> {
    /// Add a note to show after the error.
    pub fn push_context(&mut self, context: Context) -> &mut Self {
        self.explain_contexts.push(context);
        self
    }

    /// Set the main error.
    pub fn error(&mut self, context: Context) -> &mut Self {
        self.error_context = Some(context);
        self
    }

    /// Build pretty explanation from the provided contexts.
    pub fn build(self) -> Result<PrettyError, ExplainBuildError> {
        trace!("Building error explanation");
        let error = self
            .error_context
            .as_ref()
            .ok_or(ExplainBuildError::MissingErrorContext)?;

        let mut out = String::new();
        self.render(&mut out, "error", error)?;
        for note in &self.explain_contexts {
            out.push('\n');
            self.render(&mut out, "note", note)?;
        }
        Ok(PrettyError(out))
    }

    fn render(&self, out: &mut String, label: &str, ctx: &Context) -> Result<(), ExplainBuildError> {
        let line_no = ctx.at.line() as usize;
        let line = line_no
            .checked_sub(1)
            .and_then(|idx| self.yaml.lines().nth(idx))
            .ok_or(ExplainBuildError::OutOfRange(ctx.at))?;

        let gutter = " ".repeat(line_no.to_string().len());
        let caret_pad: String = line
            .chars()
            .take(ctx.at.col() as usize)
            .map(|c| if c == '\t' { '\t' } else { ' ' })
            .collect();

        out.push_str(&format!("{label}: {}\n", ctx.message));
        out.push_str(&format!("{gutter}--> {}\n", ctx.at));
        out.push_str(&format!("{gutter} |\n"));
        out.push_str(&format!("{line_no} | {line}\n"));
        out.push_str(&format!("{gutter} | {caret_pad}^"));
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PrettyError(String);

impl std::fmt::Display for PrettyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for PrettyError {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::convert::AsRef<str> for PrettyError {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExplainBuildError {
    #[error("Error context is missing")]
    MissingErrorContext,

    #[error("Position {0} is outside of the recipe text")]
    OutOfRange(Marker),
}

/// A message attached to a position in the recipe.
#[derive(Debug, Clone)]
pub struct Context {
    at: Marker,
    message: String,
}

impl Context {
    pub fn new(at: Marker, message: String) -> Self {
        Self { at, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Document;

    const RECIPE: &str = "- object:\n    type: Account\n    fields:\n      Tags: [a, b]\n";

    #[test]
    fn explains_parse_error() {
        let err = Document::load_str(RECIPE)
            .unwrap()
            .parse()
            .map_err(LoadError::from)
            .unwrap_err();
        let pretty = Pretty::new(RECIPE).explain(&err);
        assert!(pretty.starts_with("error: "), "{pretty}");
        assert!(pretty.contains("4 |       Tags: [a, b]"), "{pretty}");
        assert!(pretty.ends_with('^'), "{pretty}");
    }

    #[test]
    fn notes_follow_error() {
        let mut b = Pretty::new(RECIPE).explain_builder();
        b.error(Context::new(Marker::new(0, 4, 2), "bad type".into()))
            .push_context(Context::new(Marker::new(0, 0, 1), "in this entry".into()));
        let pretty = b.build().unwrap();
        let error_at = pretty.find("error: bad type").unwrap();
        let note_at = pretty.find("note: in this entry").unwrap();
        assert!(error_at < note_at);
        assert!(pretty.contains("2 |     type: Account\n  |     ^"), "{pretty}");
    }

    #[test]
    fn missing_error_context() {
        let b = Pretty::new(RECIPE).explain_builder();
        assert!(matches!(b.build(), Err(ExplainBuildError::MissingErrorContext)));
    }

    #[test]
    fn out_of_range() {
        let mut b = Pretty::new(RECIPE).explain_builder();
        b.error(Context::new(Marker::new(0, 0, 99), "far away".into()));
        assert!(matches!(b.build(), Err(ExplainBuildError::OutOfRange(_))));
    }

    #[test]
    fn plain_message_without_position() {
        let err = LoadError::MultipleDocuments(2);
        let pretty = Pretty::new("").explain(&err);
        assert_eq!(&*pretty, "error: Recipe must contain exactly one YAML document, found 2");
    }
}
