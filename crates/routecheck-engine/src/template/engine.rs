//! minijinja-backed renderer with `${...}` placeholders

use std::path::Path;

use minijinja::syntax::SyntaxConfig;
use minijinja::{Environment, UndefinedBehavior, Value};
use tracing::debug;

use routecheck_common::{Error, Result};

use super::{filters, Params, TemplateRenderer};

/// Stands in for `$${` while minijinja sees the template
const ESCAPED_PLACEHOLDER: &str = "\x00__ROUTECHECK_ESCAPED_DOLLAR_BRACE__\x00";

/// Default [`TemplateRenderer`]
///
/// Syntax:
/// - `${KEY}` substitutes a parameter (with filters: `${KEY | yaml_quote}`)
/// - `{% if KEY %}...{% endif %}` blocks
/// - `{# ... #}` comments
/// - `$${` renders as a literal `${`
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    /// Create an engine with strict undefined handling.
    ///
    /// # Panics
    ///
    /// Panics if minijinja rejects the hardcoded delimiters, which indicates
    /// an incompatible minijinja release.
    pub fn new() -> Self {
        let syntax = SyntaxConfig::builder()
            .variable_delimiters("${", "}")
            .block_delimiters("{%", "%}")
            .comment_delimiters("{#", "#}")
            .build()
            .expect("template syntax configuration is hardcoded and valid");

        let mut env = Environment::new();
        env.set_syntax(syntax);
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);

        env.add_filter("required", filters::required);
        env.add_filter("yaml_quote", filters::yaml_quote);

        Self { env }
    }

    /// Render template text; `name` identifies it in error messages
    pub fn render_str(&self, name: &str, template: &str, params: &Params) -> Result<String> {
        let preprocessed = template.replace("$${", ESCAPED_PLACEHOLDER);

        let rendered = self
            .env
            .render_named_str(name, &preprocessed, Value::from_serialize(params))
            .map_err(|e| Error::render(name, describe(&e)))?;

        Ok(rendered.replace(ESCAPED_PLACEHOLDER, "${"))
    }
}

impl TemplateRenderer for TemplateEngine {
    fn render(&self, path: &Path, params: &Params) -> Result<String> {
        let name = path.display().to_string();
        let source = std::fs::read_to_string(path)
            .map_err(|e| Error::render(&name, format!("failed to read template: {e}")))?;
        debug!(template = %name, params = params.len(), "rendering template");
        self.render_str(&name, &source, params)
    }
}

fn describe(err: &minijinja::Error) -> String {
    let mut message = err.to_string();
    if let Some(line) = err.line() {
        message.push_str(&format!(" (line {line})"));
    }
    message
}
