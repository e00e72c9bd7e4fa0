use std::borrow::Cow;

use log::trace;

use crate::domain::SimpleValue;

/// Named functions that templates can call.
pub mod helpers;

/// Template syntax and the default formatter.
pub mod template;

pub use helpers::{Helper, HelperContext, HelperError, HelperTable};
pub use template::{PlaceholderFormatter, TemplateError, TemplateFormatter};

/// Evaluates templated values against an explicit helper table.
///
/// Values without a `{` are returned unchanged; otherwise they go through the
/// formatter with every helper bound to an empty (`None`) context.
#[derive(Debug)]
pub struct Evaluator<F = PlaceholderFormatter> {
    helpers: HelperTable,
    formatter: F,
}

impl Evaluator {
    pub fn new(helpers: HelperTable) -> Self {
        Self {
            helpers,
            formatter: PlaceholderFormatter,
        }
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(HelperTable::standard())
    }
}

impl<F: TemplateFormatter> Evaluator<F> {
    pub fn with_formatter(helpers: HelperTable, formatter: F) -> Self {
        Self { helpers, formatter }
    }

    pub fn helpers(&self) -> &HelperTable {
        &self.helpers
    }

    pub fn evaluate_str<'a>(&self, value: &'a str) -> Result<Cow<'a, str>, TemplateError> {
        if !value.contains('{') {
            return Ok(Cow::Borrowed(value));
        }
        trace!("Formatting template `{value}`");
        self.formatter
            .format(value, &self.helpers.bind(None))
            .map(Cow::Owned)
    }

    /// Evaluate a scalar. Numbers never hold templates and are returned as they are.
    pub fn evaluate(&self, value: &SimpleValue) -> Result<SimpleValue, TemplateError> {
        match value {
            SimpleValue::String(s) => Ok(SimpleValue::String(self.evaluate_str(s)?.into_owned())),
            other => Ok(other.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::helpers::BoundHelpers;

    #[test]
    fn plain_values_unchanged() {
        let eval: Evaluator = Evaluator::default();
        assert!(matches!(
            eval.evaluate_str("no templates here").unwrap(),
            Cow::Borrowed("no templates here")
        ));
        assert_eq!(
            eval.evaluate(&SimpleValue::Integer(4)).unwrap(),
            SimpleValue::Integer(4)
        );
    }

    #[test]
    fn templates_are_formatted() {
        let eval: Evaluator = Evaluator::default();
        assert_eq!(
            eval.evaluate(&SimpleValue::from("{{ upper('acme') }} Inc")).unwrap(),
            SimpleValue::from("ACME Inc")
        );
    }

    #[test]
    fn helpers_get_no_context() {
        let mut table = HelperTable::new();
        table.register(
            "ctx",
            |ctx: Option<&HelperContext>, _: &[String]| -> Result<String, HelperError> {
                Ok(if ctx.is_none() { "none" } else { "some" }.to_owned())
            },
        );
        let eval = Evaluator::new(table);
        assert_eq!(eval.evaluate_str("{{ ctx }}").unwrap(), "none");
    }

    #[test]
    fn formatter_errors_propagate() {
        let eval: Evaluator = Evaluator::default();
        assert!(eval.evaluate_str("{{ unknown() }}").is_err());
    }

    struct Shout;

    impl TemplateFormatter for Shout {
        fn format(&self, template: &str, _: &BoundHelpers<'_>) -> Result<String, TemplateError> {
            Ok(template.to_uppercase())
        }
    }

    #[test]
    fn custom_formatter() {
        let eval = Evaluator::with_formatter(HelperTable::new(), Shout);
        assert_eq!(eval.evaluate_str("{x}").unwrap(), "{X}");
        assert_eq!(eval.evaluate_str("plain").unwrap(), "plain");
    }
}
