use std::path::{Component, Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use std::sync::Once;

use candy_core::{
    asm::assemble_source,
    vm::{Executable, Vm, VmConfig},
};
use clap::{Parser, Subcommand};
use tracing::debug;


static TRACE_INIT: Once = Once::new();
const DEFAULT_TRACE_FILTER: &str = "candy::vm=debug,candy::asm=debug,candy::stdlib=debug,candy::heap=info";

#[derive(Parser, Debug)]
#[command(
    name = "candy",
    author,
    version,
    about = "Run Candy assembly programs",
    args_conflicts_with_subcommands = true
)]
struct CliArgs {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Program to assemble and run
    #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
    file: Option<PathBuf>,

    /// TOML file with VM limits
    #[arg(long, value_name = "FILE", value_parser = parse_sanitized_path)]
    config: Option<PathBuf>,

    /// Maximum call depth
    #[arg(long, value_name = "N")]
    max_depth: Option<usize>,

    /// Operand stack slots per frame
    #[arg(long, value_name = "N")]
    max_stack: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Assemble a program without running it.
    Check {
        #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
        file: PathBuf,
    },
}

fn read_file_content(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("cannot read '{}': {}", path.display(), e))
}

fn sanitize_path(raw: &str) -> anyhow::Result<PathBuf> {
    let p = Path::new(raw);
    if p.components().any(|c| matches!(c, Component::ParentDir)) {
        anyhow::bail!("Parent directory components ('..') are not allowed in file paths.");
    }
    Ok(p.to_path_buf())
}

fn parse_sanitized_path(raw: &str) -> Result<PathBuf, String> {
    sanitize_path(raw).map_err(|e| e.to_string())
}

fn env_toggle_enabled(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    !(trimmed.eq_ignore_ascii_case("0") || trimmed.eq_ignore_ascii_case("false") || trimmed.eq_ignore_ascii_case("off"))
}

fn filter_expr_from(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("1")
        || trimmed.eq_ignore_ascii_case("true")
        || trimmed.eq_ignore_ascii_case("on")
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn maybe_init_tracing() {
    let raw = match std::env::var("CANDY_TRACE") {
        Ok(value) => value,
        Err(_) => return,
    };

    if !env_toggle_enabled(&raw) {
        return;
    }

    TRACE_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let filter_expr = filter_expr_from(&raw).or_else(|| std::env::var("RUST_LOG").ok());

        let builder = fmt().with_writer(std::io::stderr);

        let builder = match filter_expr.and_then(|expr| EnvFilter::try_new(expr).ok()) {
            Some(filter) => builder.with_env_filter(filter),
            None => builder.with_env_filter(DEFAULT_TRACE_FILTER),
        };

        let _ = builder.try_init();
    });
}

/// Config file first, then flags on top.
fn resolve_config(args: &CliArgs) -> anyhow::Result<VmConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let src = read_file_content(path)?;
            VmConfig::from_toml_str(&src)
                .map_err(|e| anyhow::anyhow!("invalid config '{}': {}", path.display(), e.message()))?
        }
        None => VmConfig::default(),
    };
    if let Some(depth) = args.max_depth {
        config = config.with_max_depth(depth);
    }
    if let Some(slots) = args.max_stack {
        config = config.with_max_stack(slots);
    }
    Ok(config)
}

fn load_program(path: &Path) -> anyhow::Result<Rc<Executable>> {
    let src = read_file_content(path)?;
    let exec = assemble_source(&path.to_string_lossy(), &src)?;
    Ok(exec)
}

fn run_file(path: &Path, config: VmConfig) -> anyhow::Result<()> {
    let exec = load_program(path)?;
    let mut vm = Vm::with_config(config);
    candy_stdlib::install(&mut vm)?;
    debug!(target: "candy::vm", file = %path.display(), "running program");
    let result = vm.execute(&exec)?;
    if !result.is_empty() {
        println!("{result}");
    }
    Ok(())
}

fn run(args: CliArgs) -> anyhow::Result<()> {
    if let Some(Commands::Check { file }) = &args.command {
        let exec = load_program(file)?;
        debug!(target: "candy::asm", file = %file.display(), instructions = exec.code.len(), "check passed");
        return Ok(());
    }
    let config = resolve_config(&args)?;
    match &args.file {
        Some(file) => run_file(file, config),
        None => anyhow::bail!("no program given; try `candy --help`"),
    }
}

fn main() -> ExitCode {
    maybe_init_tracing();
    match run(CliArgs::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
