//! Editor breakpoints to generated lines and back.
//!
//! Editors address a breakpoint as (flow, 0-based step); the runtime only
//! knows (program file, 1-based line). Both directions go through the same
//! preamble offset the compiler used, so `step_at(location(f, i)) == (f, i)`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::compiler::{line_step, program_file_name, step_line, SourceMap, PROGRAM_EXT};
use crate::errors::DebugError;
use crate::flow::Application;

use super::protocol::Location;

#[derive(Debug, Clone, Default)]
pub struct BreakpointMap {
    build_dir: PathBuf,
    breakpoints: BTreeMap<String, BTreeSet<usize>>,
}

impl BreakpointMap {
    pub fn new(build_dir: impl Into<PathBuf>) -> Self {
        Self {
            build_dir: build_dir.into(),
            breakpoints: BTreeMap::new(),
        }
    }

    /// Breakpoints recorded on the flows of `app`.
    pub fn from_application(app: &Application, build_dir: impl Into<PathBuf>) -> Self {
        let mut map = Self::new(build_dir);
        for flow in &app.flows {
            for step in &flow.breakpoints {
                map.add(&flow.name, *step);
            }
        }
        map
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    pub fn add(&mut self, flow: &str, step: usize) -> bool {
        self.breakpoints.entry(flow.to_string()).or_default().insert(step)
    }

    pub fn remove(&mut self, flow: &str, step: usize) -> bool {
        let Some(steps) = self.breakpoints.get_mut(flow) else {
            return false;
        };
        let removed = steps.remove(&step);
        if steps.is_empty() {
            self.breakpoints.remove(flow);
        }
        removed
    }

    /// Every recorded (flow, step), in order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.breakpoints
            .iter()
            .flat_map(|(flow, steps)| steps.iter().map(move |step| (flow.as_str(), *step)))
    }

    /// Generated location of `step` in `flow`.
    pub fn location(&self, flow: &str, step: usize) -> Location {
        Location::new(self.build_dir.join(program_file_name(flow)), step_line(step))
    }

    /// Like [`location`](Self::location), but only for steps the compiled
    /// program actually has.
    pub fn resolve(&self, flow: &str, step: usize) -> Result<Location, DebugError> {
        let location = self.location(flow, step);
        let unmapped = || DebugError::UnmappedBreakpoint {
            flow: flow.to_string(),
            step,
        };
        let text = std::fs::read_to_string(SourceMap::map_path(&location.file))
            .map_err(|_| unmapped())?;
        let map: SourceMap = serde_json::from_str(&text)?;
        if map.lines.contains_key(&location.line) {
            Ok(location)
        } else {
            Err(unmapped())
        }
    }

    /// (flow, step) of a generated location; `None` for preamble lines and
    /// files that are not programs.
    pub fn step_at(&self, file: &Path, line: usize) -> Option<(String, usize)> {
        let name = file.file_name()?.to_str()?;
        let flow = name.strip_suffix(PROGRAM_EXT)?.strip_suffix('.')?;
        Some((flow.to_string(), line_step(line)?))
    }
}
