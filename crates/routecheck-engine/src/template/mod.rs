//! Manifest templates
//!
//! Templates are YAML files with `${KEY}` placeholders. Rendering is strict:
//! a placeholder with no substitution is a render error, never an empty
//! string. `$${` produces a literal `${`.

mod engine;
mod filters;

use std::collections::BTreeMap;
use std::path::Path;

use routecheck_common::Result;

pub use engine::TemplateEngine;

/// Substitution keys to values
pub type Params = BTreeMap<String, String>;

/// Turns a template path and substitutions into manifest text
pub trait TemplateRenderer: Send + Sync {
    /// Render the template at `path`.
    ///
    /// Fails with `Error::Render` for an unreadable path, a missing
    /// placeholder or invalid template syntax.
    fn render(&self, path: &Path, params: &Params) -> Result<String>;
}
