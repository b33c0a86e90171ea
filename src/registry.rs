//! Template registry: maps a template id (the company name a user picks in
//! the front-end) to a DOCX file and its field conventions.
//!
//! The registry is plain data. It is read once at start-up, either from the
//! built-in table or from a JSON file, and shared read-only by all requests.
//!
//! ```json
//! {
//!   "templates": {
//!     "UR Recruitment LTD": { "path": "template_ur.docx" },
//!     "ACME": {
//!       "path": "acme.docx",
//!       "date_marker": "upper",
//!       "date_fields": 1,
//!       "signature": { "image": "acme-sig.png", "width_mm": 35 }
//!     }
//!   }
//! }
//! ```
//!
//! Relative paths are resolved against the directory holding the JSON file.

use crate::config::{DateMarker, SignatureStamp};
use crate::error::LetterError;
use crate::pipeline::fields::FieldRules;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Templates shipped with the original deployment: `(id, file name)`.
pub const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("UR Recruitment LTD", "template_ur.docx"),
    ("SMALL WORLD RECRUITMENT LTD", "template_small_world.docx"),
    ("IMPERATIVE CONSULTANTS LTD", "template_imperative.docx"),
];

fn default_date_fields() -> usize {
    2
}

/// One template and how its placeholders are spelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSpec {
    /// The DOCX template. Never modified.
    pub path: PathBuf,

    /// Accepted date marker spelling. Default: either `Date:` or `DATE:`.
    #[serde(default)]
    pub date_marker: DateMarker,

    /// How many date fields to fill, counted from the end. Default: 2.
    #[serde(default = "default_date_fields")]
    pub date_fields: usize,

    /// Optional signature image stamped beside the last date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureStamp>,
}

impl TemplateSpec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            date_marker: DateMarker::default(),
            date_fields: default_date_fields(),
            signature: None,
        }
    }

    pub fn with_date_marker(mut self, marker: DateMarker) -> Self {
        self.date_marker = marker;
        self
    }

    pub fn with_date_fields(mut self, n: usize) -> Self {
        self.date_fields = n;
        self
    }

    pub fn with_signature(mut self, stamp: SignatureStamp) -> Self {
        self.signature = Some(stamp);
        self
    }

    pub(crate) fn rules(&self) -> FieldRules {
        FieldRules {
            date_marker: self.date_marker,
            date_fields: self.date_fields,
        }
    }

    fn resolve_relative(&mut self, base: &Path) {
        if self.path.is_relative() {
            self.path = base.join(&self.path);
        }
        if let Some(sig) = self.signature.as_mut() {
            if sig.image.is_relative() {
                sig.image = base.join(&sig.image);
            }
        }
    }
}

#[derive(Deserialize)]
struct RegistryFile {
    templates: BTreeMap<String, TemplateSpec>,
}

/// Id → [`TemplateSpec`] lookup table, iterated in id order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, TemplateSpec>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The three production templates, looked up in `templates_dir`.
    pub fn builtin(templates_dir: impl AsRef<Path>) -> Self {
        let dir = templates_dir.as_ref();
        let mut registry = Self::new();
        for (id, file) in BUILTIN_TEMPLATES {
            registry.insert(*id, TemplateSpec::new(dir.join(file)));
        }
        registry
    }

    /// Parse a registry from JSON, resolving relative paths against `base_dir`.
    ///
    /// Errors are reported against `base_dir`; [`load`](Self::load) reports
    /// them against the file instead.
    pub fn from_json_str(json: &str, base_dir: &Path) -> Result<Self, LetterError> {
        Self::parse(json, base_dir, base_dir)
    }

    fn parse(json: &str, base_dir: &Path, source: &Path) -> Result<Self, LetterError> {
        let invalid = |detail: String| LetterError::RegistryLoad {
            path: source.to_path_buf(),
            detail,
        };
        let file: RegistryFile = serde_json::from_str(json).map_err(|e| invalid(e.to_string()))?;
        let mut registry = Self::new();
        for (id, mut spec) in file.templates {
            if id.trim().is_empty() {
                return Err(invalid("template id must not be empty".into()));
            }
            spec.resolve_relative(base_dir);
            registry.insert(id, spec);
        }
        Ok(registry)
    }

    /// Load a JSON registry file.
    pub fn load(path: &Path) -> Result<Self, LetterError> {
        let json = std::fs::read_to_string(path).map_err(|e| LetterError::RegistryLoad {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let registry = Self::parse(&json, base, path)?;
        debug!(
            "Loaded {} templates from {}",
            registry.len(),
            path.display()
        );
        Ok(registry)
    }

    pub fn insert(&mut self, id: impl Into<String>, spec: TemplateSpec) {
        self.templates.insert(id.into(), spec);
    }

    pub fn get(&self, id: &str) -> Option<&TemplateSpec> {
        self.templates.get(id)
    }

    /// Look up `id`, failing with the list of known ids.
    pub fn resolve(&self, id: &str) -> Result<&TemplateSpec, LetterError> {
        self.get(id).ok_or_else(|| LetterError::UnknownTemplate {
            id: id.to_string(),
            available: if self.is_empty() {
                "(none)".to_string()
            } else {
                self.ids().collect::<Vec<_>>().join(", ")
            },
        })
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TemplateSpec)> {
        self.templates.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
