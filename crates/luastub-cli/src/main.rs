//! luastub CLI - Type inference for Lua projects

use std::fs;
use std::path::{Path, PathBuf};

use ariadne::{Color, Label, Report, ReportKind, Source};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use luastub_analysis::{analyze_project, AnalysisConfig, AnalysisError};
use luastub_deps::{discover_files, load_sources, order_sources};
use luastub_parser::parse;

#[derive(Parser)]
#[command(name = "luastub")]
#[command(about = "Infer types of Lua modules for stub generation", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a project and output the inferred modules as JSON
    Analyze {
        #[command(flatten)]
        project: ProjectArgs,
        /// Pretty print the output
        #[arg(short, long)]
        pretty: bool,
        /// Write the output to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the order files would be analyzed in
    Order {
        #[command(flatten)]
        project: ProjectArgs,
    },
    /// Parse a file and output the AST as JSON
    Parse {
        /// Input file
        file: PathBuf,
        /// Pretty print the output
        #[arg(short, long)]
        pretty: bool,
    },
}

#[derive(Args)]
struct ProjectArgs {
    /// Project root
    root: Option<PathBuf>,
    /// JSON file with `root`, `buckets` and `extension`
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Bucket subdirectory, in analysis order (repeatable)
    #[arg(short, long = "bucket")]
    buckets: Vec<String>,
    /// Source file extension
    #[arg(short, long)]
    extension: Option<String>,
}

impl ProjectArgs {
    /// Config file first, then flags on top
    fn load(self) -> Result<AnalysisConfig, String> {
        let mut config = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .map_err(|e| format!("Error reading {}: {}", path.display(), e))?;
                serde_json::from_str(&text)
                    .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?
            }
            None => AnalysisConfig::default(),
        };
        if let Some(root) = self.root {
            config.root = root;
        }
        if !self.buckets.is_empty() {
            config.buckets = self.buckets;
        }
        if let Some(extension) = self.extension {
            config.extension = extension.trim_start_matches('.').to_string();
        }
        Ok(config)
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Analyze {
            project,
            pretty,
            output,
        } => cmd_analyze(project, pretty, output),
        Commands::Order { project } => cmd_order(project),
        Commands::Parse { file, pretty } => cmd_parse(&file, pretty),
    };

    if let Err(message) = result {
        eprintln!("{}", message);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .init();
}

fn cmd_analyze(project: ProjectArgs, pretty: bool, output: Option<PathBuf>) -> Result<(), String> {
    let config = project.load()?;
    debug!(root = %config.root.display(), buckets = ?config.buckets, "analyzing project");

    let result = analyze_project(&config);
    for diagnostic in &result.diagnostics {
        eprintln!("{}", diagnostic);
    }

    let json = to_json(&result, pretty)?;
    match output {
        Some(path) => {
            fs::write(&path, json).map_err(|e| format!("Error writing {}: {}", path.display(), e))?;
            println!("Analyzed {} modules into {}", result.modules.len(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn cmd_order(project: ProjectArgs) -> Result<(), String> {
    let config = project.load()?;
    let paths = discover_files(&config);
    let (files, errors) = load_sources(&config, &paths);
    let resolved = order_sources(&files, &config.buckets);

    for error in errors.into_iter().chain(resolved.diagnostics) {
        eprintln!("{}", AnalysisError::from(error).to_diagnostic());
    }
    for id in &resolved.order {
        println!("{}", id);
    }
    Ok(())
}

fn cmd_parse(file: &Path, pretty: bool) -> Result<(), String> {
    let source =
        fs::read_to_string(file).map_err(|e| format!("Error reading {}: {}", file.display(), e))?;

    match parse(&source) {
        Ok(chunk) => {
            println!("{}", to_json(&chunk, pretty)?);
            Ok(())
        }
        Err(e) => {
            report_parse_error(&source, file, &e);
            Err(format!("Failed to parse {}", file.display()))
        }
    }
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String, String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    json.map_err(|e| format!("Error serializing output: {}", e))
}

fn report_parse_error(source: &str, file: &Path, error: &luastub_parser::ParseError) {
    let name = file.to_string_lossy().to_string();
    let span = error.span();
    let report = Report::build(ReportKind::Error, name.clone(), span.start)
        .with_message(error.to_string())
        .with_label(
            Label::new((name.clone(), span.start..span.end))
                .with_message(error.to_string())
                .with_color(Color::Red),
        )
        .finish();
    if let Err(e) = report.eprint((name, Source::from(source))) {
        eprintln!("{}: {}", file.display(), e);
    }
}
