//! Directive-to-program compiler
//!
//! Turns a flow (ordered step instances) into program text for the flow
//! script interpreter, plus a source map from generated line to the block
//! context of the step on that line.
//!
//! Output layout:
//!
//! ```text
//! // robotflow program <flow>
//! let __block = undefined;
//! <step 0>
//! <step 1>
//! ```
//!
//! Step `i` always lands on line `i + PREAMBLE_LINES + 1`. Compilation is a
//! pure function of the flow and the catalog snapshot: the same input yields
//! byte-identical output.

pub mod coder;
pub mod emit;
pub mod validator;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, CatalogHandle, Directive};
use crate::errors::CompileError;
use crate::flow::{write_json, Application, Flow};
use crate::types::{BlockContext, FailureStrategy};

use emit::{block_statement, DefaultEmitter, EmitContext, Emitter, BLOCK_SLOT};
use validator::Validator;

/// Lines before the first step.
pub const PREAMBLE_LINES: usize = 2;
pub const PROGRAM_EXT: &str = "rflow";
pub const MAP_SUFFIX: &str = ".map.json";
pub const VARIABLES_FILE: &str = "variables.json";
pub const MANIFEST_FILE: &str = "manifest.json";

pub const HEADER_PREFIX: &str = "// robotflow program ";

/// Generated line (1-based) of step `index`.
pub fn step_line(index: usize) -> usize {
    index + PREAMBLE_LINES + 1
}

/// Step index of a generated line, if the line holds a step.
pub fn line_step(line: usize) -> Option<usize> {
    line.checked_sub(PREAMBLE_LINES + 1)
}

pub fn program_file_name(flow: &str) -> String {
    format!("{}.{}", flow, PROGRAM_EXT)
}

/* ===================== Source Map ===================== */

/// Generated line to block context, written next to every program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub file: String,
    pub flow: String,
    pub preamble_lines: usize,
    /// Hex SHA-256 of the program text
    pub digest: String,
    pub lines: BTreeMap<usize, BlockContext>,
}

impl SourceMap {
    /// Block context of exactly this line.
    pub fn block_at(&self, line: usize) -> Option<&BlockContext> {
        self.lines.get(&line)
    }

    /// Block context of the nearest step at or before `line`, or the
    /// synthetic unknown context.
    pub fn attribute(&self, line: usize) -> BlockContext {
        self.lines
            .range(..=line)
            .next_back()
            .map(|(_, block)| block.clone())
            .unwrap_or_else(BlockContext::unknown)
    }

    pub fn map_path(program: &Path) -> PathBuf {
        let mut name = program.as_os_str().to_owned();
        name.push(MAP_SUFFIX);
        PathBuf::from(name)
    }
}

/* ===================== Compiled Output ===================== */

#[derive(Debug, Clone)]
pub struct CompiledFlow {
    pub flow: String,
    pub file_name: String,
    pub source: String,
    pub source_map: SourceMap,
}

impl CompiledFlow {
    pub fn digest(&self) -> &str {
        &self.source_map.digest
    }

    /// Write `<flow>.rflow` and its source map into `dir`; returns the program path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, CompileError> {
        std::fs::create_dir_all(dir).map_err(|source| CompileError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.source).map_err(|source| CompileError::Io {
            path: path.clone(),
            source,
        })?;
        write_json(&SourceMap::map_path(&path), &self.source_map)?;
        Ok(path)
    }
}

/// Result of compiling a whole application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildManifest {
    pub application: String,
    pub main_flow: String,
    /// Flow name to program file name
    pub programs: BTreeMap<String, String>,
    /// Flow name to program digest
    pub digests: BTreeMap<String, String>,
}

impl BuildManifest {
    pub fn main_program(&self, build_dir: &Path) -> Option<PathBuf> {
        self.programs.get(&self.main_flow).map(|f| build_dir.join(f))
    }

    pub fn load(build_dir: &Path) -> Result<Self, CompileError> {
        let path = build_dir.join(MANIFEST_FILE);
        let text = std::fs::read_to_string(&path).map_err(|source| CompileError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| CompileError::Document { path, source })
    }
}

/* ===================== Compiler ===================== */

pub struct Compiler {
    catalog: Arc<Catalog>,
    overrides: BTreeMap<String, Arc<dyn Emitter>>,
    validator: Validator,
}

impl Compiler {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            overrides: BTreeMap::new(),
            validator: Validator::new(),
        }
    }

    /// Compiler over the handle's current snapshot. Later reloads of the
    /// handle do not affect this compiler.
    pub fn from_handle(handle: &CatalogHandle) -> Self {
        Self::new(handle.snapshot())
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Emitter used for `key` when its catalog entry has no custom one.
    pub fn register_override(&mut self, key: &str, emitter: Arc<dyn Emitter>) {
        self.overrides.insert(key.to_string(), emitter);
    }

    fn emitter_for(&self, step: &Directive) -> &dyn Emitter {
        let key = step.lookup_key();
        if let Some(custom) = self.catalog.get(key).and_then(|e| e.emitter.as_deref()) {
            return custom;
        }
        if let Some(registered) = self.overrides.get(key) {
            return registered.as_ref();
        }
        &DefaultEmitter
    }

    /// Step display name, falling back to the catalog template's.
    fn display_name<'a>(&'a self, step: &'a Directive) -> &'a str {
        let template = self.catalog.get(step.lookup_key()).map(|e| &e.descriptor);
        step.display_name
            .as_deref()
            .or_else(|| template.and_then(|t| t.display_name.as_deref()))
            .unwrap_or(&step.name)
    }

    fn block_context(&self, flow: &Flow, step: &Directive, index: usize) -> BlockContext {
        let template = self.catalog.get(step.lookup_key()).map(|e| &e.descriptor);
        let display = self.display_name(step);
        BlockContext {
            block_line: index as i64 + 1,
            flow_name: flow.name.clone(),
            flow_alias_name: flow.alias().to_string(),
            directive_name: step.name.clone(),
            directive_display_name: display.to_string(),
            failure_strategy: step
                .failure_strategy
                .or_else(|| template.and_then(|t| t.failure_strategy))
                .unwrap_or_default(),
            interval_time: step
                .interval_time
                .or_else(|| template.and_then(|t| t.interval_time))
                .unwrap_or(0.0),
            retry_count: step
                .retry_count
                .or_else(|| template.and_then(|t| t.retry_count))
                .unwrap_or(0),
        }
    }

    /// Compile one flow. Validation runs first; any error means no output.
    pub fn compile_flow(&self, flow: &Flow) -> Result<CompiledFlow, CompileError> {
        let (errors, warnings): (Vec<_>, Vec<_>) = self
            .validator
            .validate(flow, &self.catalog)
            .into_iter()
            .partition(|issue| issue.is_error());
        for warning in &warnings {
            warn!(flow = %flow.name, step = warning.step + 1, rule = warning.rule_id, "{}", warning.message);
        }
        if !errors.is_empty() {
            return Err(CompileError::Invalid {
                flow: flow.name.clone(),
                issues: errors.into_iter().map(|i| i.into_step_issue(&flow.name)).collect(),
            });
        }

        let mut lines = preamble(&flow.name);
        let mut map = BTreeMap::new();
        let mut declared = BTreeSet::from([BLOCK_SLOT.to_string()]);

        for (index, step) in flow.steps.iter().enumerate() {
            if step.disabled {
                lines.push(format!("// disabled: {}", single_line(self.display_name(step))));
                continue;
            }
            let block = self.block_context(flow, step, index);
            let text = {
                let mut ctx = EmitContext::new(&flow.name, index, block_statement(&block), &mut declared);
                let text = self.emitter_for(step).emit(step, &mut ctx)?;
                if text.contains('\n') || text.contains('\r') {
                    return Err(ctx.error(step, "emitted text spans more than one line"));
                }
                text
            };
            lines.push(text);
            map.insert(step_line(index), block);
        }

        let compiled = finish(flow, lines, map);
        debug!(flow = %flow.name, steps = flow.steps.len(), digest = %compiled.digest(), "compiled flow");
        Ok(compiled)
    }

    /// Compile a single step as a standalone program for live preview.
    /// The step's failure strategy is forced to `ignore`.
    pub fn compile_step_snippet(&self, flow: &Flow, index: usize) -> Result<CompiledFlow, CompileError> {
        let issues: Vec<_> = self
            .validator
            .validate_step(flow, index, &self.catalog)
            .into_iter()
            .filter(|i| i.is_error())
            .map(|i| i.into_step_issue(&flow.name))
            .collect();
        if !issues.is_empty() {
            return Err(CompileError::Invalid {
                flow: flow.name.clone(),
                issues,
            });
        }
        let step = &flow.steps[index];
        let mut declared = BTreeSet::from([BLOCK_SLOT.to_string()]);
        let mut ctx = EmitContext::new(&flow.name, index, String::new(), &mut declared);
        if step.is_structural() || validator::role_of(step, &self.catalog) != validator::Role::Plain {
            return Err(ctx.error(step, "control steps cannot run on their own"));
        }

        let mut block = self.block_context(flow, step, index);
        block.failure_strategy = FailureStrategy::Ignore;
        ctx.block = block_statement(&block);
        let text = self.emitter_for(step).emit(step, &mut ctx)?;

        let mut lines = preamble(&flow.name);
        lines.push(text);
        let map = BTreeMap::from([(step_line(0), block)]);
        Ok(finish(flow, lines, map))
    }

    /// Compile every flow of `app` into `out_dir`, together with the
    /// application variables and a build manifest.
    pub fn compile_application(&self, app: &Application, out_dir: &Path) -> Result<BuildManifest, CompileError> {
        if app.flow(&app.main_flow).is_none() {
            return Err(CompileError::MissingFlow(app.main_flow.clone()));
        }
        std::fs::create_dir_all(out_dir).map_err(|source| CompileError::Io {
            path: out_dir.to_path_buf(),
            source,
        })?;

        // Validate and emit everything before touching the output directory.
        let compiled = app
            .flows
            .iter()
            .map(|flow| self.compile_flow(flow))
            .collect::<Result<Vec<_>, _>>()?;

        let mut manifest = BuildManifest {
            application: app.name.clone(),
            main_flow: app.main_flow.clone(),
            programs: BTreeMap::new(),
            digests: BTreeMap::new(),
        };
        for flow in &compiled {
            flow.write_to(out_dir)?;
            manifest.programs.insert(flow.flow.clone(), flow.file_name.clone());
            manifest.digests.insert(flow.flow.clone(), flow.digest().to_string());
        }
        write_json(&out_dir.join(VARIABLES_FILE), &app.variables)?;
        write_json(&out_dir.join(MANIFEST_FILE), &manifest)?;

        info!(
            application = %app.name,
            flows = compiled.len(),
            dir = %out_dir.display(),
            "application compiled"
        );
        Ok(manifest)
    }
}

fn preamble(flow: &str) -> Vec<String> {
    vec![
        format!("{}{}", HEADER_PREFIX, single_line(flow)),
        format!("let {} = undefined;", BLOCK_SLOT),
    ]
}

fn single_line(text: &str) -> String {
    text.replace(['\n', '\r'], " ")
}

fn finish(flow: &Flow, lines: Vec<String>, map: BTreeMap<usize, BlockContext>) -> CompiledFlow {
    let mut source = lines.join("\n");
    source.push('\n');
    let file_name = program_file_name(&flow.name);
    let source_map = SourceMap {
        file: file_name.clone(),
        flow: flow.name.clone(),
        preamble_lines: PREAMBLE_LINES,
        digest: digest_hex(&source),
        lines: map,
    };
    CompiledFlow {
        flow: flow.name.clone(),
        file_name,
        source,
        source_map,
    }
}

/// Hex SHA-256 of `text`.
pub fn digest_hex(text: &str) -> String {
    Sha256::digest(text.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests;
