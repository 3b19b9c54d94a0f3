//! Flow documents and application projects.
//!
//! A flow is an ordered list of step instances. An application groups flows
//! with the variables shared by all of them.
//!
//! On disk an application is a directory:
//!
//! ```text
//! app.json                 name, main flow, variables
//! flows/<name>.flow.json   one document per flow
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::catalog::Directive;
use crate::errors::CompileError;

pub const APP_FILE: &str = "app.json";
pub const FLOWS_DIR: &str = "flows";
pub const FLOW_EXT: &str = "flow.json";

/// An ordered sequence of step instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias_name: Option<String>,
    #[serde(default, alias = "blocks")]
    pub steps: Vec<Directive>,
    /// Zero-based step indices the editor has breakpoints on
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub breakpoints: BTreeSet<usize>,
}

impl Flow {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            alias_name: None,
            steps: Vec::new(),
            breakpoints: BTreeSet::new(),
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias_name = Some(alias.to_string());
        self
    }

    pub fn with_step(mut self, step: Directive) -> Self {
        self.steps.push(step);
        self
    }

    /// Display name; falls back to the flow name.
    pub fn alias(&self) -> &str {
        self.alias_name.as_deref().unwrap_or(&self.name)
    }

    pub fn load(path: &Path) -> Result<Self, CompileError> {
        read_json(path)
    }
}

/// A named application variable. Only `exposed` variables accept launch overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppVariable {
    pub name: String,
    #[serde(default = "default_variable_type", rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(default)]
    pub exposed: bool,
}

fn default_variable_type() -> String {
    "string".to_string()
}

impl AppVariable {
    pub fn new(name: &str, kind: &str, value: impl Into<JsonValue>) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            value: value.into(),
            display: None,
            exposed: false,
        }
    }

    pub fn exposed(mut self) -> Self {
        self.exposed = true;
        self
    }
}

fn default_main() -> String {
    "main".to_string()
}

/// Application project: its flows and shared variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub name: String,
    #[serde(default = "default_main")]
    pub main_flow: String,
    #[serde(default)]
    pub variables: Vec<AppVariable>,
    /// Loaded from `flows/`, not stored in `app.json`
    #[serde(skip)]
    pub flows: Vec<Flow>,
}

impl Application {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            main_flow: default_main(),
            variables: Vec::new(),
            flows: Vec::new(),
        }
    }

    pub fn with_flow(mut self, flow: Flow) -> Self {
        self.flows.push(flow);
        self
    }

    pub fn with_variable(mut self, variable: AppVariable) -> Self {
        self.variables.push(variable);
        self
    }

    pub fn flow(&self, name: &str) -> Option<&Flow> {
        self.flows.iter().find(|f| f.name == name)
    }

    /// Load `app.json` and every `flows/*.flow.json`, ordered by file name.
    pub fn load(dir: &Path) -> Result<Self, CompileError> {
        let mut app: Application = read_json(&dir.join(APP_FILE))?;

        let flows_dir = dir.join(FLOWS_DIR);
        let entries = std::fs::read_dir(&flows_dir).map_err(|source| CompileError::Io {
            path: flows_dir.clone(),
            source,
        })?;
        let mut files: Vec<_> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(&format!(".{}", FLOW_EXT)))
            })
            .collect();
        files.sort();

        for file in files {
            app.flows.push(Flow::load(&file)?);
        }

        if app.flow(&app.main_flow).is_none() {
            return Err(CompileError::MissingFlow(app.main_flow.clone()));
        }
        Ok(app)
    }

    /// Write the project back in the directory layout `load` reads.
    pub fn save(&self, dir: &Path) -> Result<(), CompileError> {
        let flows_dir = dir.join(FLOWS_DIR);
        std::fs::create_dir_all(&flows_dir).map_err(|source| CompileError::Io {
            path: flows_dir.clone(),
            source,
        })?;
        write_json(&dir.join(APP_FILE), self)?;
        for flow in &self.flows {
            write_json(&flows_dir.join(format!("{}.{}", flow.name, FLOW_EXT)), flow)?;
        }
        Ok(())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CompileError> {
    let text = std::fs::read_to_string(path).map_err(|source| CompileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CompileError::Document {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CompileError> {
    let text = serde_json::to_string_pretty(value).map_err(|source| CompileError::Document {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, text).map_err(|source| CompileError::Io {
        path: path.to_path_buf(),
        source,
    })
}
