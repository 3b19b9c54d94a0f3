//! Loading generated programs together with their source maps.

use std::path::{Path, PathBuf};

use crate::compiler::{SourceMap, HEADER_PREFIX};
use crate::errors::RuntimeError;
use crate::parser::parse_program;

use super::types::Stmt;

/// A parsed program ready to run.
#[derive(Debug, Clone)]
pub struct Program {
    /// Canonical path when loaded from disk
    pub path: PathBuf,
    /// Flow name from the header line, else the file stem
    pub name: String,
    pub body: Vec<Stmt>,
    pub source_map: Option<SourceMap>,
}

impl Program {
    /// Parse program text. `path` is only used for naming and error reports.
    pub fn parse(path: impl Into<PathBuf>, source: &str) -> Result<Self, RuntimeError> {
        let path = path.into();
        let def = parse_program(source).map_err(|e| RuntimeError::Parse {
            path: path.clone(),
            message: e.message().to_string(),
            line: e.line(),
        })?;
        let name = source
            .lines()
            .next()
            .and_then(|first| first.strip_prefix(HEADER_PREFIX))
            .map(|name| name.trim().to_string())
            .unwrap_or_else(|| stem(&path));
        Ok(Self {
            path,
            name,
            body: def.body,
            source_map: None,
        })
    }

    /// Read and parse `path`, picking up `<path>.map.json` when it exists.
    pub fn load(path: &Path) -> Result<Self, RuntimeError> {
        let path = std::fs::canonicalize(path).map_err(|source| RuntimeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let source = std::fs::read_to_string(&path).map_err(|source| RuntimeError::Io {
            path: path.clone(),
            source,
        })?;
        let mut program = Self::parse(path.clone(), &source)?;

        let map_path = SourceMap::map_path(&path);
        if map_path.is_file() {
            let text = std::fs::read_to_string(&map_path).map_err(|source| RuntimeError::Io {
                path: map_path.clone(),
                source,
            })?;
            let map: SourceMap = serde_json::from_str(&text).map_err(|source| {
                RuntimeError::Json {
                    path: map_path.clone(),
                    source,
                }
            })?;
            program.source_map = Some(map);
        }
        Ok(program)
    }

    pub fn with_source_map(mut self, map: SourceMap) -> Self {
        self.source_map = Some(map);
        self
    }

    /// Directory sibling programs are resolved against.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
