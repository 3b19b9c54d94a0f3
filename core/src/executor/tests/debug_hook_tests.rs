//! Pausing through the debug hook

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::helpers::{plain, program, recording};
use crate::executor::{DebugHook, Interpreter, PauseInfo, PauseReason, Val};

#[derive(Default)]
struct Recorder {
    lines: BTreeSet<usize>,
    pauses: Mutex<Vec<PauseInfo>>,
}

impl Recorder {
    fn at(lines: &[usize]) -> Arc<Self> {
        Arc::new(Self {
            lines: lines.iter().copied().collect(),
            pauses: Mutex::new(Vec::new()),
        })
    }

    fn paused_lines(&self) -> Vec<usize> {
        self.pauses.lock().unwrap().iter().map(|p| p.line).collect()
    }
}

#[async_trait]
impl DebugHook for Recorder {
    fn check(&self, _file: &Path, line: usize) -> Option<PauseReason> {
        self.lines.contains(&line).then_some(PauseReason::Breakpoint)
    }

    async fn pause(&self, info: PauseInfo) {
        self.pauses.lock().unwrap().push(info);
    }
}

const SOURCE: &str = "// robotflow program main
let __block = undefined;
let a = 1; let b = 2;
for (let i of range(0, 3)) {
    a = a + i;
}
robot.t.echo({});
";

#[tokio::test]
async fn test_pauses_once_per_line_visit() {
    let recorder = Recorder::at(&[3, 5, 7]);
    let (builder, _) = recording();
    let mut vm = Interpreter::new(program(SOURCE), plain(builder)).with_hook(recorder.clone());
    vm.run().await.unwrap();

    // Line 3 holds two statements but pauses once; the loop body pauses on
    // every iteration.
    assert_eq!(recorder.paused_lines(), vec![3, 5, 5, 5, 7]);
}

#[tokio::test]
async fn test_pause_snapshot_hides_internal_names() {
    let recorder = Recorder::at(&[7]);
    let (builder, _) = recording();
    let mut vm = Interpreter::new(program(SOURCE), plain(builder)).with_hook(recorder.clone());
    vm.run().await.unwrap();

    let pauses = recorder.pauses.lock().unwrap();
    let locals = &pauses[0].locals;
    assert_eq!(locals.get_property("a"), Val::Num(4.0));
    assert_eq!(locals.get_property("i"), Val::Num(2.0));
    assert_eq!(locals.get_property("__block"), Val::Undefined);
    assert_eq!(pauses[0].reason, PauseReason::Breakpoint);
    assert!(pauses[0].block.is_unknown());
}

#[tokio::test]
async fn test_closing_brace_lines_never_pause() {
    let recorder = Recorder::at(&[6]);
    let (builder, _) = recording();
    let mut vm = Interpreter::new(program(SOURCE), plain(builder)).with_hook(recorder.clone());
    vm.run().await.unwrap();
    assert!(recorder.paused_lines().is_empty());
}
