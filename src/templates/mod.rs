//! Template engine
//!
//! Renders the HTML pages with Tera. Templates are compiled into the binary
//! from `templates/`; when `templates.path` is configured, files found there
//! replace the embedded ones of the same name, so a deployment can restyle
//! pages without rebuilding.

use rust_embed::RustEmbed;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::error::Error as StdError;
use std::fs;
use std::path::Path;
use tera::{Context as TeraContext, Tera, Value};

mod error;

pub use error::TemplateError;

#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
struct EmbeddedTemplates;

/// Signed-in user as templates see it
#[derive(Debug, Clone, Serialize)]
pub struct TemplateUser {
    pub id: i64,
    pub username: String,
    pub is_admin: bool,
}

/// Variables every page gets
#[derive(Debug, Clone, Default, Serialize)]
pub struct PageVars {
    pub site_name: String,
    pub base_url: String,
    pub request_path: String,
    pub year: i32,
    pub current_user: Option<TemplateUser>,
    pub show_ads: bool,
}

pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    /// Load the embedded templates, then overrides from `override_dir`
    pub fn new(override_dir: Option<&Path>) -> Result<Self, TemplateError> {
        let mut templates = BTreeMap::new();
        for name in EmbeddedTemplates::iter() {
            let file = EmbeddedTemplates::get(&name).ok_or_else(|| TemplateError::NotFound(name.to_string()))?;
            let content = String::from_utf8(file.data.into_owned())
                .map_err(|_| TemplateError::Encoding(name.to_string()))?;
            templates.insert(name.to_string(), content);
        }
        let embedded = templates.len();

        if let Some(dir) = override_dir {
            if dir.is_dir() {
                collect_templates_from_dir(dir, dir, &mut templates)?;
            } else {
                tracing::warn!("Template directory {:?} does not exist, using embedded templates", dir);
            }
        }

        let mut tera = Tera::default();
        // All at once, so `extends` resolves regardless of load order
        tera.add_raw_templates(templates.iter().map(|(name, content)| (name.as_str(), content.as_str())))
            .map_err(|e| TemplateError::Render(error_chain("Failed to load templates", &e)))?;
        register_filters(&mut tera);

        tracing::info!(
            embedded,
            overridden = templates.len().saturating_sub(embedded),
            "Templates loaded"
        );
        Ok(Self { tera })
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|t| t == name)
    }

    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String, TemplateError> {
        if !self.has_template(template) {
            return Err(TemplateError::NotFound(template.to_string()));
        }
        self.tera
            .render(template, context)
            .map_err(|e| TemplateError::Render(error_chain(&format!("Failed to render '{}'", template), &e)))
    }

    /// Render with the shared page variables added to `context`
    pub fn render_page(
        &self,
        template: &str,
        context: &TeraContext,
        vars: &PageVars,
    ) -> Result<String, TemplateError> {
        let mut full = context.clone();
        full.insert("site_name", &vars.site_name);
        full.insert("base_url", &vars.base_url);
        full.insert("request_path", &vars.request_path);
        full.insert("year", &vars.year);
        full.insert("current_user", &vars.current_user);
        full.insert("show_ads", &vars.show_ads);
        self.render(template, &full)
    }
}

fn error_chain(prefix: &str, error: &tera::Error) -> String {
    let mut message = format!("{}: {}", prefix, error);
    let mut source = error.source();
    while let Some(s) = source {
        message.push_str(&format!("\n  Caused by: {}", s));
        source = s.source();
    }
    message
}

/// Add every `.html` file below `current_path`, named relative to `base_path`
fn collect_templates_from_dir(
    base_path: &Path,
    current_path: &Path,
    templates: &mut BTreeMap<String, String>,
) -> Result<(), TemplateError> {
    for entry in fs::read_dir(current_path)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_templates_from_dir(base_path, &path, templates)?;
        } else if path.extension().is_some_and(|ext| ext == "html") {
            let relative = path
                .strip_prefix(base_path)
                .map_err(|_| TemplateError::NotFound(path.display().to_string()))?;
            let name = relative.to_string_lossy().replace('\\', "/");
            let content = fs::read_to_string(&path)?;
            tracing::debug!(template = %name, "Template loaded from disk");
            templates.insert(name, content);
        }
    }
    Ok(())
}

fn register_filters(tera: &mut Tera) {
    tera.register_filter("plural", plural_filter);
    tera.register_filter("month_name", month_name_filter);
    tera.register_filter("script_json", script_json_filter);
}

/// Index of the Russian plural form: 0 for 1/21/31.., 1 for 2-4/22-24.., 2 otherwise
pub fn plural_form(n: i64) -> usize {
    let n = n.abs();
    match (n % 10, n % 100) {
        (1, m) if m != 11 => 0,
        (2..=4, m) if !(12..=14).contains(&m) => 1,
        _ => 2,
    }
}

/// `{{ count | plural(one="город", few="города", many="городов") }}`
fn plural_filter(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let n = value
        .as_i64()
        .ok_or_else(|| tera::Error::msg("Filter `plural` expects an integer"))?;
    let key = ["one", "few", "many"][plural_form(n)];
    args.get(key)
        .cloned()
        .ok_or_else(|| tera::Error::msg(format!("Filter `plural` is missing the `{}` argument", key)))
}

const MONTHS: [&str; 12] = [
    "январь",
    "февраль",
    "март",
    "апрель",
    "май",
    "июнь",
    "июль",
    "август",
    "сентябрь",
    "октябрь",
    "ноябрь",
    "декабрь",
];

/// `{{ 3 | month_name }}` renders "март"
fn month_name_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    value
        .as_u64()
        .and_then(|m| MONTHS.get((m as usize).wrapping_sub(1)))
        .map(|name| Value::String(name.to_string()))
        .ok_or_else(|| tera::Error::msg(format!("Filter `month_name` expects 1..=12, got {}", value)))
}

/// JSON for an inline `<script>` block: `{{ data | script_json | safe }}`.
/// `<`, `>` and `&` are written as unicode escapes so no value can close the tag.
fn script_json_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let json = serde_json::to_string(value)
        .map_err(|e| tera::Error::msg(format!("Filter `script_json` failed: {}", e)))?;
    Ok(Value::String(script_safe_json(&json)))
}

fn script_safe_json(json: &str) -> String {
    json.replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
}
