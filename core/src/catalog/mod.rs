//! Directive catalog
//!
//! The catalog maps a directive key to its template: typed input and output
//! slots, display metadata, structural flags, and an optional custom code
//! emitter. Flow steps are instances of these templates with concrete values
//! bound into the slots.
//!
//! Descriptors are loaded once and never edited in place. A reload builds a
//! fresh [`Catalog`] and swaps it into the [`CatalogHandle`] atomically, so a
//! compilation that already took a snapshot keeps seeing the old one.

pub mod builtin;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use crate::compiler::emit::Emitter;
use crate::errors::CatalogError;
use crate::types::FailureStrategy;

/* ===================== Typed Slots ===================== */

/// Declared kind of an input slot. Decides how the raw editor value is coded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputType {
    String,
    Number,
    Boolean,
    Textarea,
    /// Comma-joined values, wrapped in a sequence literal
    Array,
    /// Emitted as-is; the caller controls surrounding punctuation
    ArrayObject,
    /// Bare reference to a variable
    Variable,
    Object,
    /// A type name this compiler does not know
    Unknown(String),
}

impl InputType {
    pub fn as_str(&self) -> &str {
        match self {
            InputType::String => "string",
            InputType::Number => "number",
            InputType::Boolean => "boolean",
            InputType::Textarea => "textarea",
            InputType::Array => "array",
            InputType::ArrayObject => "arrayObject",
            InputType::Variable => "variable",
            InputType::Object => "object",
            InputType::Unknown(other) => other,
        }
    }

    fn parse(raw: &str) -> Self {
        match raw {
            "string" => InputType::String,
            "number" => InputType::Number,
            "boolean" => InputType::Boolean,
            "textarea" => InputType::Textarea,
            "array" => InputType::Array,
            "arrayObject" => InputType::ArrayObject,
            "variable" => InputType::Variable,
            "object" => InputType::Object,
            other => InputType::Unknown(other.to_string()),
        }
    }
}

impl Serialize for InputType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for InputType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(InputType::parse(&raw))
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an `object` input is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectMode {
    /// Opaque text literal
    String,
    /// Caller-supplied code, emitted verbatim
    Expression,
    /// Structured data, emitted as a serialized data literal
    StringRaw,
}

/// Editor-side configuration of an input. Only `required` matters to the compiler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddConfig {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "type")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<JsonValue>,
}

/// A typed input slot, either a template (in the catalog) or bound to a value (in a flow step).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSlot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Raw editor value; its meaning depends on `kind`
    #[serde(default)]
    pub value: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(rename = "type")]
    pub kind: InputType,
    /// Deprecated: consulted only when `object_mode` is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_expression: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_mode: Option<ObjectMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_config: Option<AddConfig>,
}

impl InputSlot {
    pub fn new(kind: InputType, value: impl Into<JsonValue>) -> Self {
        Self {
            name: None,
            value: value.into(),
            display: None,
            kind,
            enable_expression: None,
            object_mode: None,
            add_config: None,
        }
    }

    pub fn with_object_mode(mut self, mode: ObjectMode) -> Self {
        self.object_mode = Some(mode);
        self
    }

    pub fn required(mut self, label: &str) -> Self {
        self.add_config = Some(AddConfig {
            label: label.to_string(),
            required: true,
            ..AddConfig::default()
        });
        self
    }

    /// The raw value as editor text. Strings are taken verbatim, null is empty,
    /// anything else is its JSON text.
    pub fn raw_text(&self) -> String {
        match &self.value {
            JsonValue::Null => String::new(),
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.value {
            JsonValue::Null => true,
            JsonValue::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

/// Structured return shape of an output, used by the editor for autocomplete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputTypeDetails {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub display: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_details: Vec<OutputTypeDetails>,
}

/// A typed output slot. `name` is the variable the generated program binds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSlot {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_details: Vec<OutputTypeDetails>,
}

impl OutputSlot {
    pub fn new(name: &str, kind: &str) -> Self {
        Self {
            name: name.to_string(),
            display: None,
            kind: kind.to_string(),
            type_details: Vec::new(),
        }
    }
}

/// Repeated row-group input (table-like inputs). Each row is a list of cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputGroup {
    #[serde(default)]
    pub name: String,
    /// Template row
    #[serde(default)]
    pub value: Vec<InputSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Vec<InputSlot>>>,
}

/* ===================== Directive ===================== */

/// Directive descriptor. The same shape serves as catalog template and as
/// flow step instance (with values bound into `inputs` / `outputs`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directive {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    /// Opens a control construct (if, for, while, try)
    #[serde(default)]
    pub is_control: bool,
    /// Closes a control construct
    #[serde(default)]
    pub is_control_end: bool,
    /// Middle marker of a construct (else, else-if, catch)
    #[serde(default)]
    pub is_else: bool,
    #[serde(default)]
    pub is_loop: bool,
    /// Which construct a structural marker belongs to. Derived from the key
    /// when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub construct: Option<String>,

    #[serde(default)]
    pub inputs: BTreeMap<String, InputSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs2: Option<BTreeMap<String, InputGroup>>,
    #[serde(default)]
    pub outputs: BTreeMap<String, OutputSlot>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_strategy: Option<FailureStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Directive {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            key: None,
            display_name: None,
            description: None,
            comment: None,
            sort: None,
            icon: None,
            is_control: false,
            is_control_end: false,
            is_else: false,
            is_loop: false,
            construct: None,
            inputs: BTreeMap::new(),
            inputs2: None,
            outputs: BTreeMap::new(),
            failure_strategy: None,
            interval_time: None,
            retry_count: None,
            disabled: false,
            id: None,
        }
    }

    /// The key a directive is addressed by: `key` when present, else `name`.
    pub fn lookup_key(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.name)
    }

    pub fn display(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    pub fn is_structural(&self) -> bool {
        self.is_control || self.is_control_end || self.is_else
    }

    /// Name of the construct this marker opens, continues, or closes.
    pub fn construct_name(&self) -> String {
        if let Some(construct) = &self.construct {
            return construct.clone();
        }
        let key = self.lookup_key();
        key.strip_suffix(".end").unwrap_or(key).to_string()
    }

    pub fn with_input(mut self, name: &str, slot: InputSlot) -> Self {
        self.inputs.insert(name.to_string(), slot);
        self
    }

    pub fn with_output(mut self, key: &str, slot: OutputSlot) -> Self {
        self.outputs.insert(key.to_string(), slot);
        self
    }

    pub fn with_display_name(mut self, display: &str) -> Self {
        self.display_name = Some(display.to_string());
        self
    }

    pub fn with_failure(mut self, strategy: FailureStrategy, interval: f64, retries: u32) -> Self {
        self.failure_strategy = Some(strategy);
        self.interval_time = Some(interval);
        self.retry_count = Some(retries);
        self
    }
}

/* ===================== Catalog ===================== */

/// A catalog entry: the template plus an optional custom emitter.
#[derive(Clone)]
pub struct CatalogEntry {
    pub descriptor: Directive,
    pub emitter: Option<Arc<dyn Emitter>>,
}

impl fmt::Debug for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogEntry")
            .field("descriptor", &self.descriptor.name)
            .field("custom_emitter", &self.emitter.is_some())
            .finish()
    }
}

/// Immutable registry of directive templates, keyed by lookup key.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl Catalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Catalog holding every built-in directive.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        builtin::register_all(&mut catalog);
        catalog
    }

    /// Built-ins plus every descriptor found in `dir`.
    pub fn load_dir(dir: &Path) -> Result<Self, CatalogError> {
        let mut catalog = Self::builtin();
        catalog.merge_dir(dir)?;
        Ok(catalog)
    }

    /// Insert or replace a template.
    pub fn insert(&mut self, descriptor: Directive, emitter: Option<Arc<dyn Emitter>>) {
        let key = descriptor.lookup_key().to_string();
        self.entries.insert(key, CatalogEntry { descriptor, emitter });
    }

    pub fn get(&self, key: &str) -> Option<&CatalogEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &Directive> {
        self.entries.values().map(|e| &e.descriptor)
    }

    /// Read `*.json` descriptor files in `dir` (sorted by file name). Each file
    /// holds one descriptor or an array of them. Loaded descriptors keep the
    /// custom emitter of a built-in with the same key.
    pub fn merge_dir(&mut self, dir: &Path) -> Result<(), CatalogError> {
        let read = std::fs::read_dir(dir).map_err(|source| CatalogError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut files: Vec<_> = read
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();

        for path in files {
            let text = std::fs::read_to_string(&path).map_err(|source| CatalogError::Io {
                path: path.clone(),
                source,
            })?;
            let value: JsonValue =
                serde_json::from_str(&text).map_err(|source| CatalogError::Parse {
                    path: path.clone(),
                    source,
                })?;
            let descriptors: Vec<Directive> = match value {
                JsonValue::Array(_) => serde_json::from_value(value),
                _ => serde_json::from_value(value).map(|d| vec![d]),
            }
            .map_err(|source| CatalogError::Parse {
                path: path.clone(),
                source,
            })?;

            for descriptor in descriptors {
                let key = descriptor.lookup_key().to_string();
                let emitter = self.entries.get(&key).and_then(|e| e.emitter.clone());
                debug!(key = %key, file = %path.display(), "loaded directive descriptor");
                self.insert(descriptor, emitter);
            }
        }
        Ok(())
    }
}

/// Shared handle that publishes catalog snapshots.
///
/// Readers take an `Arc` snapshot and keep it for the whole compilation;
/// writers replace the snapshot wholesale.
#[derive(Debug)]
pub struct CatalogHandle {
    current: RwLock<Arc<Catalog>>,
}

impl CatalogHandle {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            current: RwLock::new(Arc::new(catalog)),
        }
    }

    pub fn snapshot(&self) -> Arc<Catalog> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Swap in a new catalog, returning the previous snapshot.
    pub fn swap(&self, catalog: Catalog) -> Arc<Catalog> {
        let next = Arc::new(catalog);
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, next)
    }

    /// Rebuild from the built-ins plus `dir`, then swap. On error the current
    /// catalog stays in place.
    pub fn reload(&self, dir: &Path) -> Result<usize, CatalogError> {
        let catalog = Catalog::load_dir(dir)?;
        let count = catalog.len();
        self.swap(catalog);
        info!(directives = count, dir = %dir.display(), "directive catalog reloaded");
        Ok(count)
    }
}

impl Default for CatalogHandle {
    fn default() -> Self {
        Self::new(Catalog::builtin())
    }
}
