use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value as JsonValue};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::catalog::CatalogHandle;
use crate::compiler::{program_file_name, Compiler, VARIABLES_FILE};
use crate::config::Config;
use crate::debug::{AdapterOptions, BreakpointMap, DebugAdapter, DebugServer, EditorEvent};
use crate::flow::{Application, Flow};
use crate::runtime::events::StderrSink;
use crate::runtime::variables::{parse_override, Variables};
use crate::runtime::{RunOutcome, Runtime};

#[derive(Parser)]
#[command(name = "robotflow")]
#[command(about = "RobotFlow - compile, run and debug automation flows", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Build directory (overrides config file and env vars)
    #[arg(long, global = true)]
    pub build_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile every flow of an application into the build directory
    Compile {
        /// Application directory (app.json + flows/)
        app_dir: PathBuf,

        /// Directory of extra directive descriptors
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Run a compiled program
    Run {
        /// Program file (.rflow)
        program: PathBuf,

        /// Wait for a debugger on this port before running (0 picks one)
        #[arg(long)]
        inspect: Option<u16>,

        /// Interface the debugger endpoint binds to
        #[arg(long)]
        inspect_host: Option<String>,

        /// Override an exposed application variable (name=value)
        #[arg(long = "var")]
        vars: Vec<String>,

        /// JSON object of variable overrides
        #[arg(long)]
        vars_file: Option<PathBuf>,
    },

    /// Compile an application and debug it; commands are read from stdin
    /// and editor events are written to stdout as JSON lines
    Debug {
        /// Application directory (app.json + flows/)
        app_dir: PathBuf,

        /// Flow to launch (default: the application's main flow)
        #[arg(long)]
        flow: Option<String>,

        /// Extra breakpoint as flow:step (0-based step)
        #[arg(long = "break")]
        breakpoints: Vec<String>,

        /// Debugger port (overrides config)
        #[arg(long)]
        port: Option<u16>,

        /// Directory of extra directive descriptors
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Run a single step of a flow on its own, ignoring its failures
    Step {
        /// Flow document (.flow.json)
        flow: PathBuf,

        /// 0-based step index
        index: usize,

        /// Directory of extra directive descriptors
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// List the directives known to the compiler
    Catalog {
        /// Directory of extra directive descriptors
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Print full descriptors as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a config file with the default settings
    InitConfig {
        /// Destination (default: robotflow.toml)
        #[arg(long, default_value = crate::config::CONFIG_FILE)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short = 'f', long = "force")]
        force: bool,
    },
}

/// Run the CLI by parsing process arguments. Returns the process exit code.
pub async fn run_cli() -> Result<i32> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments.
pub async fn run_cli_from_args(args: Vec<String>) -> Result<i32> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<i32> {
    // Load and validate configuration before executing any command
    let config = Config::builder()
        .config_path(cli.config.clone())
        .build_dir(cli.build_dir.clone())
        .build()?;
    init_tracing(&config.log.filter);
    debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Compile { app_dir, catalog } => {
            let app = Application::load(&app_dir)?;
            let compiler = Compiler::from_handle(&load_catalog(&config, catalog.as_deref())?);
            let manifest = match compiler.compile_application(&app, &config.build_dir) {
                Ok(manifest) => manifest,
                Err(e) => {
                    report_compile_error(&e);
                    return Ok(1);
                }
            };
            println!(
                "✓ Compiled {} flow(s) of {} into {}",
                manifest.programs.len(),
                manifest.application,
                config.build_dir.display()
            );
            Ok(0)
        }

        Commands::Run {
            program,
            inspect,
            inspect_host,
            vars,
            vars_file,
        } => {
            let overrides = collect_overrides(&config, &vars, vars_file.as_deref())?;
            let host = inspect_host.unwrap_or_else(|| config.debug.host.clone());
            run_program(&program, overrides, inspect.map(|port| (host, port))).await
        }

        Commands::Debug {
            app_dir,
            flow,
            breakpoints,
            port,
            catalog,
        } => {
            let app = Application::load(&app_dir)?;
            let compiler = Compiler::from_handle(&load_catalog(&config, catalog.as_deref())?);
            std::fs::create_dir_all(&config.build_dir)
                .with_context(|| format!("Failed to create {}", config.build_dir.display()))?;
            let build_dir = config
                .build_dir
                .canonicalize()
                .with_context(|| format!("Failed to resolve {}", config.build_dir.display()))?;
            if let Err(e) = compiler.compile_application(&app, &build_dir) {
                report_compile_error(&e);
                return Ok(1);
            }

            let mut map = BreakpointMap::from_application(&app, &build_dir);
            for arg in &breakpoints {
                let (flow, step) = parse_breakpoint(arg)?;
                map.add(&flow, step);
            }
            let flow = flow.unwrap_or_else(|| app.main_flow.clone());
            let program = build_dir.join(program_file_name(&flow));

            let options = AdapterOptions {
                runtime_program: config.runtime.program()?,
                host: config.debug.host.clone(),
                port: port.unwrap_or(config.debug.port),
                attach_timeout: config.debug.attach_timeout(),
                extra_args: Vec::new(),
            };
            debug_session(options, map, &program).await
        }

        Commands::Step {
            flow,
            index,
            catalog,
        } => {
            let flow = Flow::load(&flow)?;
            if index >= flow.steps.len() {
                anyhow::bail!("Flow {} has no step {}", flow.name, index);
            }
            let compiler = Compiler::from_handle(&load_catalog(&config, catalog.as_deref())?);
            let compiled = match compiler.compile_step_snippet(&flow, index) {
                Ok(compiled) => compiled,
                Err(e) => {
                    report_compile_error(&e);
                    return Ok(1);
                }
            };
            let snippet_dir = config.build_dir.join("snippet");
            let program = compiled.write_to(&snippet_dir)?;
            let overrides = collect_overrides(&config, &[], None)?;
            let mut variables = Variables::load(&config.build_dir.join(VARIABLES_FILE))?;
            variables.apply_overrides(&overrides);
            let outcome = Runtime::new(Arc::new(StderrSink))
                .with_globals(variables.to_globals())
                .run_file(&program)
                .await?;
            Ok(outcome.exit_code())
        }

        Commands::Catalog { catalog, json } => {
            let catalog = load_catalog(&config, catalog.as_deref())?.snapshot();
            if json {
                let descriptors: Vec<_> = catalog.descriptors().collect();
                println!("{}", serde_json::to_string_pretty(&descriptors)?);
                return Ok(0);
            }
            println!("{} directive(s):\n", catalog.len());
            for directive in catalog.descriptors() {
                println!("  {} | {}", directive.lookup_key(), directive.display());
            }
            Ok(0)
        }

        Commands::InitConfig { path, force } => {
            if path.exists() && !force {
                eprintln!("Error: {} already exists. Use --force to overwrite.", path.display());
                return Ok(1);
            }
            std::fs::write(&path, Config::default_toml()?)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("✓ Wrote {}", path.display());
            Ok(0)
        }
    }
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // Ignore a second initialisation, as happens when embedding the CLI.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn load_catalog(config: &Config, dir: Option<&Path>) -> Result<CatalogHandle> {
    let handle = CatalogHandle::default();
    if let Some(dir) = dir.or(config.catalog_dir.as_deref()) {
        let count = handle
            .reload(dir)
            .with_context(|| format!("Failed to load catalog from {}", dir.display()))?;
        info!(directives = count, dir = %dir.display(), "catalog loaded");
    }
    Ok(handle)
}

fn report_compile_error(err: &crate::errors::CompileError) {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(&format!(": {}", cause));
        source = cause.source();
    }
    eprintln!("Error: {}", message);
    for issue in err.issues().iter().skip(1) {
        eprintln!("  {}", issue);
    }
}

/// Config `[variables]`, then the overrides file, then `--var`; later wins.
fn collect_overrides(
    config: &Config,
    vars: &[String],
    vars_file: Option<&Path>,
) -> Result<BTreeMap<String, JsonValue>> {
    let mut overrides = config.variables.clone();
    if let Some(path) = vars_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file: BTreeMap<String, JsonValue> = serde_json::from_str(&text)
            .with_context(|| format!("{} must hold a JSON object", path.display()))?;
        overrides.extend(file);
    }
    for arg in vars {
        let (name, value) = parse_override(arg).map_err(anyhow::Error::msg)?;
        overrides.insert(name, value);
    }
    Ok(overrides)
}

fn parse_breakpoint(arg: &str) -> Result<(String, usize)> {
    let (flow, step) = arg
        .rsplit_once(':')
        .with_context(|| format!("Breakpoint must be flow:step, got '{}'", arg))?;
    let step = step
        .trim()
        .parse()
        .with_context(|| format!("Invalid step in breakpoint '{}'", arg))?;
    Ok((flow.trim().to_string(), step))
}

async fn run_program(
    program: &Path,
    overrides: BTreeMap<String, JsonValue>,
    inspect: Option<(String, u16)>,
) -> Result<i32> {
    let dir = program.parent().unwrap_or_else(|| Path::new("."));
    let mut variables = Variables::load(&dir.join(VARIABLES_FILE))?;
    let applied = variables.apply_overrides(&overrides);
    if applied > 0 {
        info!(applied, "variable overrides applied");
    }

    let runtime = Runtime::new(Arc::new(StderrSink)).with_globals(variables.to_globals());
    let Some((host, port)) = inspect else {
        let outcome = runtime.run_file(program).await?;
        return Ok(outcome.exit_code());
    };

    let server = DebugServer::bind(&host, port).await?;
    server.announce()?;
    server.wait_for_run().await?;
    let result = runtime.with_hook(server.hook()).run_file(program).await;
    let code = result.as_ref().map(RunOutcome::exit_code).unwrap_or(1);
    server.finish(code).await;
    Ok(result?.exit_code())
}

async fn debug_session(options: AdapterOptions, breakpoints: BreakpointMap, program: &Path) -> Result<i32> {
    let (mut adapter, mut events) = DebugAdapter::new(options, breakpoints);
    if let Err(e) = adapter.start(program).await {
        while let Ok(event) = events.try_recv() {
            print_event(&event);
        }
        return Err(e).context("Failed to start debug session");
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                print_event(&event);
                if let EditorEvent::Stopped { exit_code, .. } = event {
                    return Ok(exit_code.unwrap_or(1));
                }
            }
            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => {
                        if let Err(e) = editor_command(&mut adapter, &line).await {
                            print_json(json!({ "event": "error", "body": format!("{:#}", e) }));
                        }
                    }
                    // Editor went away: end the session.
                    Ok(None) | Err(_) => {
                        stdin_open = false;
                        adapter.stop().await;
                    }
                }
            }
        }
    }
    Ok(adapter.stop().await.unwrap_or(1))
}

/// `resume`, `step`, `props <objectId>`, `break <flow> <step>`,
/// `clear <flow> <step>` or `stop`.
async fn editor_command(adapter: &mut DebugAdapter, line: &str) -> Result<()> {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        [] => {}
        ["resume"] => adapter.resume().await?,
        ["step"] => adapter.step_over().await?,
        ["props", object_id] => {
            let properties = adapter.get_properties(object_id).await?;
            print_json(json!({ "event": "properties", "body": properties }));
        }
        ["break", flow, step] => adapter.set_breakpoint(flow, step.parse()?).await?,
        ["clear", flow, step] => adapter.remove_breakpoint(flow, step.parse()?).await?,
        ["stop"] => {
            adapter.stop().await;
        }
        other => anyhow::bail!("Unknown command: {}", other.join(" ")),
    }
    Ok(())
}

fn print_event(event: &EditorEvent) {
    match serde_json::to_value(event) {
        Ok(value) => print_json(value),
        Err(e) => eprintln!("Error: cannot encode event: {}", e),
    }
}

fn print_json(value: JsonValue) {
    println!("{}", value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_breakpoint() {
        assert_eq!(parse_breakpoint("main:3").unwrap(), ("main".to_string(), 3));
        assert!(parse_breakpoint("main").is_err());
        assert!(parse_breakpoint("main:x").is_err());
    }

    #[test]
    fn test_overrides_precedence() {
        let mut config = Config::default();
        config.variables.insert("user".into(), json!("config"));
        config.variables.insert("limit".into(), json!(1));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, br#"{"limit": 2, "mode": "fast"}"#).unwrap();

        let overrides =
            collect_overrides(&config, &["user=cli".to_string()], Some(file.path())).unwrap();
        assert_eq!(overrides["user"], json!("cli"));
        assert_eq!(overrides["limit"], json!(2));
        assert_eq!(overrides["mode"], json!("fast"));
        assert!(collect_overrides(&config, &["novalue".to_string()], None).is_err());
    }

    #[tokio::test]
    async fn test_step_runs_into_fresh_build_dir() {
        use crate::catalog::{Directive, InputSlot, InputType};

        let dir = tempfile::tempdir().unwrap();
        let flow = Flow::new("main").with_step(
            Directive::new("dataProcessing.log")
                .with_input("message", InputSlot::new(InputType::String, "hi")),
        );
        let flow_path = dir.path().join("main.flow.json");
        std::fs::write(&flow_path, serde_json::to_string(&flow).unwrap()).unwrap();
        let build_dir = dir.path().join("build");

        let code = run_cli_from_args(vec![
            "robotflow".to_string(),
            "--build-dir".to_string(),
            build_dir.to_string_lossy().to_string(),
            "step".to_string(),
            flow_path.to_string_lossy().to_string(),
            "0".to_string(),
        ])
        .await
        .unwrap();
        assert_eq!(code, 0);
        assert!(build_dir.join("snippet").is_dir());
    }

    #[test]
    fn test_cli_parses_run_with_inspect() {
        let cli = Cli::parse_from([
            "robotflow", "run", "build/main.rflow", "--inspect", "0", "--var", "a=1",
        ]);
        match cli.command {
            Commands::Run { inspect, vars, .. } => {
                assert_eq!(inspect, Some(0));
                assert_eq!(vars, vec!["a=1".to_string()]);
            }
            _ => panic!("Expected Run"),
        }
    }

    #[test]
    fn test_editor_events_encode_as_json_lines() {
        let value = serde_json::to_value(EditorEvent::Breakpoint {
            flow: "main".into(),
            step: 2,
            line: 5,
            scope_id: "locals".into(),
        })
        .unwrap();
        assert_eq!(value["event"], "breakpoint");
        assert_eq!(value["body"]["scopeId"], "locals");
    }
}
