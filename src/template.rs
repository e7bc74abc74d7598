//! `{{variable}}` resolution for manifest display fields.
//!
//! Manifests store their labels as templates (`display_name = "{{source_stem}}"`)
//! so that renaming a document on disk renames it on the site too. Templates
//! are resolved at render time only and stored verbatim.
//!
//! A field may reference another field of the same entry:
//!
//! ```toml
//! display_name = "Leçon {{source_stem}}"
//! toc_name = "{{display_name}} (PDF)"
//! ```
//!
//! Resolution is a bounded fixed-point iteration. Each pass substitutes every
//! known placeholder in every field, using the base variables plus the
//! *current* value of every field. Iteration stops after a pass with no
//! substitution or after `max_passes` passes, whichever comes first, so mutual
//! references terminate (leaving a placeholder behind).
//!
//! Unknown placeholders are left verbatim unless the resolver is strict.

use crate::manifest::Entry;
use crate::naming;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use thiserror::Error;

/// Name → value environment used for substitution.
pub type Variables = BTreeMap<String, String>;

pub const VAR_SOURCE_NAME: &str = "source_name";
pub const VAR_SOURCE_STEM: &str = "source_stem";
pub const VAR_FOLDER_TITLE: &str = "folder_title";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{(\w+)\}\}").unwrap());

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Unresolved placeholder {{{{{placeholder}}}}} in field {field}")]
    Unresolved { field: String, placeholder: String },
}

/// Build the variable environment of one entry.
pub fn entry_variables(source_name: &str, folder_title: &str) -> Variables {
    let mut vars = Variables::new();
    vars.insert(VAR_SOURCE_NAME.into(), source_name.to_string());
    vars.insert(VAR_SOURCE_STEM.into(), naming::stem(source_name).to_string());
    vars.insert(VAR_FOLDER_TITLE.into(), folder_title.to_string());
    vars
}

/// One substitution pass: replace every `{{name}}` found in `vars`.
///
/// Returns the new text and how many placeholders were substituted.
pub fn interpolate(text: &str, vars: &Variables) -> (String, usize) {
    let mut count = 0;
    let out = PLACEHOLDER.replace_all(text, |caps: &Captures| match vars.get(&caps[1]) {
        Some(value) => {
            count += 1;
            value.clone()
        }
        None => caps[0].to_string(),
    });
    (out.into_owned(), count)
}

/// Placeholder names still present in `text`, in order of appearance.
pub fn placeholders(text: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}

/// Outcome of resolving a set of fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Fields in input order with their resolved values.
    pub fields: Vec<(String, String)>,
    /// Passes actually run (at least 1).
    pub passes: usize,
    /// Placeholders left over, deduplicated, in field order.
    pub unresolved: Vec<String>,
}

impl Resolution {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_str())
    }
}

/// Display fields of an entry after resolution. Absent fields stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedEntry {
    pub display_name: Option<String>,
    pub toc_name: Option<String>,
    pub nav_name: Option<String>,
    pub table_title: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct Resolver {
    pub max_passes: usize,
    pub strict: bool,
}

impl Default for Resolver {
    fn default() -> Self {
        Self {
            max_passes: 5,
            strict: false,
        }
    }
}

impl From<&crate::config::TemplateConfig> for Resolver {
    fn from(config: &crate::config::TemplateConfig) -> Self {
        Self {
            max_passes: config.max_passes.max(1),
            strict: config.strict,
        }
    }
}

impl Resolver {
    /// Resolve `fields` against `base`, letting fields reference each other.
    pub fn resolve(
        &self,
        fields: Vec<(String, String)>,
        base: &Variables,
    ) -> Result<Resolution, TemplateError> {
        let mut fields = fields;
        let mut passes = 0;

        while passes < self.max_passes {
            passes += 1;
            let mut substituted = 0;
            for i in 0..fields.len() {
                let mut vars = base.clone();
                vars.extend(fields.iter().cloned());
                let (value, n) = interpolate(&fields[i].1, &vars);
                fields[i].1 = value;
                substituted += n;
            }
            if substituted == 0 {
                break;
            }
        }

        let mut unresolved: Vec<String> = Vec::new();
        for (field, value) in &fields {
            for placeholder in placeholders(value) {
                if self.strict {
                    return Err(TemplateError::Unresolved {
                        field: field.clone(),
                        placeholder,
                    });
                }
                if !unresolved.contains(&placeholder) {
                    unresolved.push(placeholder);
                }
            }
        }

        Ok(Resolution {
            fields,
            passes,
            unresolved,
        })
    }

    /// Resolve the display fields of an entry in its own environment.
    pub fn resolve_entry(
        &self,
        entry: &Entry,
        folder_title: &str,
    ) -> Result<ResolvedEntry, TemplateError> {
        let candidates = [
            ("display_name", &entry.display_name),
            ("toc_name", &entry.toc_name),
            ("nav_name", &entry.nav_name),
            ("table_title", &entry.table_title),
        ];
        let fields = candidates
            .iter()
            .filter_map(|(name, value)| value.as_ref().map(|v| (name.to_string(), v.clone())))
            .collect();

        let base = entry_variables(&entry.source_name, folder_title);
        let resolution = self.resolve(fields, &base)?;
        let take = |name: &str| resolution.get(name).map(str::to_string);

        Ok(ResolvedEntry {
            display_name: take("display_name"),
            toc_name: take("toc_name"),
            nav_name: take("nav_name"),
            table_title: take("table_title"),
        })
    }

    /// Resolve a standalone string (a folder's table title) against `vars`.
    pub fn resolve_text(&self, text: &str, vars: &Variables) -> Result<String, TemplateError> {
        let mut value = text.to_string();
        for _ in 0..self.max_passes {
            let (next, n) = interpolate(&value, vars);
            value = next;
            if n == 0 {
                break;
            }
        }
        if self.strict {
            if let Some(placeholder) = placeholders(&value).into_iter().next() {
                return Err(TemplateError::Unresolved {
                    field: "text".to_string(),
                    placeholder,
                });
            }
        }
        Ok(value)
    }
}
