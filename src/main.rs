//! Directive Preprocess CLI
//!
//! Usage:
//!   preprocess [OPTIONS] [INPUT]
//!
//! Options:
//!   -o, --output <FILE>       Output file (writes to stdout if not provided)
//!   -t, --type <DIALECT>      Dialect or file extension to use
//!   -c, --context <FILE>      JSON or TOML context file (repeatable)
//!   -D, --define <KEY=VALUE>  Context definition (repeatable)
//!   --env                     Seed the context from the environment
//!   --dialects <FILE>         Extra dialect table (TOML format)
//!   --list-dialects           List dialects and their aliases
//!   -v, --verbose             Log directive resolution to stderr
//!   -h, --help                Print help

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use directive_preprocess::{
    Context, DialectRegistry, PreprocessConfig, PreprocessError, Preprocessor,
};

#[derive(Parser)]
#[command(name = "preprocess")]
#[command(about = "Resolve @if, @include, @echo and friends written in source comments")]
struct Cli {
    /// Input file (reads from stdin if not provided)
    input: Option<PathBuf>,

    /// Output file (writes to stdout if not provided)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Dialect or file extension (defaults to the input's extension, then html)
    #[arg(short = 't', long = "type", value_name = "DIALECT")]
    dialect: Option<String>,

    /// JSON or TOML context file; later files override earlier ones
    #[arg(short, long, value_name = "FILE")]
    context: Vec<PathBuf>,

    /// Context definition, applied after context files
    #[arg(short = 'D', long = "define", value_name = "KEY=VALUE")]
    define: Vec<String>,

    /// Seed the context from the process environment
    #[arg(long)]
    env: bool,

    /// Extra dialect table laid over the built-in dialects (TOML format)
    #[arg(long, value_name = "FILE")]
    dialects: Option<PathBuf>,

    /// List dialects and their aliases
    #[arg(long)]
    list_dialects: bool,

    /// Log directive resolution to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    // Load dialects
    let registry = match load_registry(cli.dialects.as_deref()) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Error loading dialects: {}", e);
            std::process::exit(1);
        }
    };

    if cli.list_dialects {
        print_dialects(&registry);
        return;
    }

    // Build context
    let ctx = match build_context(&cli) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let preprocessor = Preprocessor::new(PreprocessConfig::new().with_registry(registry));
    let source_name = cli
        .input
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<stdin>".to_string());

    let result = match (&cli.input, &cli.output, &cli.dialect) {
        (Some(input), Some(output), None) => {
            debug!(input = %input.display(), output = %output.display(), "file to file");
            preprocessor.preprocess_file(input, output, &ctx).await.map(|_| ())
        }
        _ => run_streams(&preprocessor, &cli, &ctx),
    };

    if let Err(e) = result {
        report_error(&e, &source_name);
        std::process::exit(1);
    }
}

fn load_registry(extra: Option<&Path>) -> Result<DialectRegistry, PreprocessError> {
    let mut registry = DialectRegistry::builtin().clone();
    if let Some(path) = extra {
        registry.merge(DialectRegistry::from_file(path)?);
        registry.validate()?;
    }
    Ok(registry)
}

fn build_context(cli: &Cli) -> Result<Context, PreprocessError> {
    let mut ctx = if cli.env {
        Context::from_env()
    } else {
        Context::new()
    };
    for path in &cli.context {
        ctx.extend(Context::from_file(path)?);
    }
    for definition in &cli.define {
        let (key, value) = Context::parse_definition(definition)?;
        ctx.insert(key, value);
    }
    Ok(ctx)
}

/// Preprocess stdin or the input file, writing to stdout or the output file
fn run_streams(preprocessor: &Preprocessor, cli: &Cli, ctx: &Context) -> Result<(), PreprocessError> {
    let (source, ctx, dialect) = match &cli.input {
        Some(path) => {
            let source = fs::read(path).map_err(|e| io_error(path, e))?;
            let dialect = match &cli.dialect {
                Some(name) => preprocessor.dialect(Some(name.as_str()))?,
                None => preprocessor.dialect_for_path(path)?,
            };
            (source, ctx.for_file(path), dialect.name().to_string())
        }
        None => {
            let mut buffer = Vec::new();
            io::stdin()
                .read_to_end(&mut buffer)
                .map_err(|e| io_error(Path::new("<stdin>"), e))?;
            let dialect = preprocessor.dialect(cli.dialect.as_deref())?;
            (buffer, ctx.clone(), dialect.name().to_string())
        }
    };

    let output = preprocessor.preprocess(source, &ctx, Some(dialect.as_str()))?;

    match &cli.output {
        Some(path) => fs::write(path, output).map_err(|e| io_error(path, e)),
        None => io::stdout()
            .write_all(output.as_bytes())
            .map_err(|e| io_error(Path::new("<stdout>"), e)),
    }
}

fn io_error(path: &Path, source: io::Error) -> PreprocessError {
    PreprocessError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn report_error(err: &PreprocessError, source_name: &str) {
    match err {
        PreprocessError::Expression(e) => eprint!("{}", e.report(source_name)),
        other => eprintln!("Error: {}", other),
    }
}

fn print_dialects(registry: &DialectRegistry) {
    for name in registry.dialect_names() {
        let aliases = registry.aliases_of(name);
        if aliases.is_empty() {
            println!("{}", name);
        } else {
            println!("{} ({})", name, aliases.join(", "));
        }
    }
}
