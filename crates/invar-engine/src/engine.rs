//! Variable interpolation based on MiniJinja

use invar_core::{Inventory, VarMap};
use minijinja::Environment;
use serde_json::Value as JsonValue;

use crate::error::{EngineError, Result, TemplateError};
use crate::filters;
use crate::syntax::adapt_filter_syntax;

/// Number of interpolation passes over the inventory
///
/// Values referencing other templated values resolve after the second pass.
/// Longer chains are not followed.
pub const INTERPOLATION_PASSES: usize = 2;

/// Whether a string contains template syntax
pub fn is_template(s: &str) -> bool {
    s.contains("{{") || s.contains("{%") || s.contains("{#")
}

/// Evaluates templated variable values
pub struct Interpolator {
    env: Environment<'static>,
}

impl Default for Interpolator {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpolator {
    pub fn new() -> Self {
        Self {
            env: create_environment(),
        }
    }

    /// Render a template string against a variable map
    pub fn render_str(&self, template: &str, vars: &VarMap, name: &str) -> Result<String> {
        if template.contains("lookup(") {
            return Err(EngineError::UnsupportedLookup {
                expression: template.to_string(),
            });
        }

        let source = adapt_filter_syntax(template);
        let ctx = minijinja::Value::from_serialize(vars);
        self.env
            .render_str(&source, ctx)
            .map_err(|e| EngineError::Template(TemplateError::from_minijinja(e, name, &source)))
    }

    /// Interpolate a single string, keeping it unchanged when it cannot be evaluated
    pub fn interpolate_str(&self, s: &str, vars: &VarMap) -> String {
        if !is_template(s) {
            return s.to_string();
        }

        match self.render_str(s, vars, "<value>") {
            Ok(out) => out,
            Err(EngineError::UnsupportedLookup { expression }) => {
                tracing::warn!(%expression, "lookups are not supported, leaving value as is");
                s.to_string()
            }
            Err(e) => {
                tracing::debug!(template = s, error = %e, "cannot evaluate, keeping original");
                s.to_string()
            }
        }
    }

    /// Interpolate a value; sequences and mappings element-wise
    pub fn interpolate_value(&self, value: &JsonValue, vars: &VarMap) -> JsonValue {
        match value {
            JsonValue::String(s) => JsonValue::String(self.interpolate_str(s, vars)),
            JsonValue::Array(items) => JsonValue::Array(
                items
                    .iter()
                    .map(|item| self.interpolate_value(item, vars))
                    .collect(),
            ),
            JsonValue::Object(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.interpolate_value(v, vars)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// One pass over a map, every value evaluated against the map as it was before the pass
    ///
    /// Keys present in `frozen` are copied through untouched.
    pub fn interpolate_once(&self, vars: &VarMap, frozen: &VarMap) -> VarMap {
        vars.iter()
            .map(|(key, value)| {
                let value = if frozen.contains_key(key) {
                    value.clone()
                } else {
                    self.interpolate_value(value, vars)
                };
                (key.clone(), value)
            })
            .collect()
    }

    /// Interpolate every group of a merged inventory
    pub fn interpolate_inventory(&self, inventory: &mut Inventory) {
        for pass in 1..=INTERPOLATION_PASSES {
            tracing::debug!(pass, "interpolating groups");
            self.interpolate_pass(inventory);
        }
    }

    /// A single pass over every group; extra variables are never evaluated
    pub fn interpolate_pass(&self, inventory: &mut Inventory) {
        for group in inventory.groups.values_mut() {
            group.vars = self.interpolate_once(&group.vars, &inventory.extra_vars);
        }
    }
}

/// Create a configured MiniJinja environment
fn create_environment() -> Environment<'static> {
    let mut env = Environment::new();

    // Missing variables render empty, like the dialects inventories are written for
    env.set_undefined_behavior(minijinja::UndefinedBehavior::Lenient);
    env.set_keep_trailing_newline(true);

    env.add_filter("basename", filters::basename);
    env.add_filter("dirname", filters::dirname);
    env.add_filter("to_yaml", filters::to_yaml);
    env.add_filter("to_json", filters::to_json);
    env.add_filter("b64encode", filters::b64encode);
    env.add_filter("b64decode", filters::b64decode);
    env.add_filter("quote", filters::quote);
    env.add_filter("bool", filters::bool);
    env.add_filter("regex_replace", filters::regex_replace);
    env.add_filter("mandatory", filters::mandatory);

    env
}
