//! astcc - ASTC compiler driver

use anyhow::{Context, Result};
use astcc::codegen;
use astcc::config::PipelineOptions;
use astcc::logger::{self, LogLevel};
use astcc::parser::lexer;
use astcc::{astc, Backend, CompileError, Pipeline};
use clap::{Parser, Subcommand, ValueEnum};
use crossterm::style::Stylize;
use crossterm::tty::IsTty;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Compile C into ASTC and run it on the interpreter or as native code
#[derive(Parser, Debug)]
#[command(name = "astcc")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// JSON file with pipeline options
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a C source file
    Run {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(short, long, value_enum, default_value_t = BackendArg::Interp)]
        backend: BackendArg,
    },

    /// Compile a C source file to an ASTC module
    Compile {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(short, long, value_name = "OUT")]
        output: PathBuf,
    },

    /// Interpret a stored ASTC module
    Exec {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Generate native code and write it as an RTME image
    Codegen {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(short, long, value_name = "OUT")]
        output: PathBuf,
    },

    /// Print the syntax tree of a C source file or ASTC module
    Dump {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Print the tokens of a C source file
    Tokens {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum BackendArg {
    Interp,
    Native,
}

impl From<BackendArg> for Backend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Interp => Backend::Interpreter,
            BackendArg::Native => Backend::Native,
        }
    }
}

fn main() {
    let args = Args::parse();

    let code = match dispatch(args) {
        Ok(code) => code,
        Err(err) => {
            report(&err);
            1
        }
    };
    std::process::exit(code);
}

fn load_options(args: &Args) -> Result<PipelineOptions> {
    let mut options = match &args.config {
        Some(path) => PipelineOptions::from_json_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => PipelineOptions::default(),
    };
    if args.verbose {
        options.log_level = LogLevel::Debug;
    } else if args.quiet {
        options.log_level = LogLevel::Error;
    }
    Ok(options)
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read: {}", path.display()))
}

fn source_pipeline(options: &PipelineOptions, file: &Path) -> Pipeline {
    Pipeline::new(options.clone().with_source_name(file.display().to_string()))
}

/// Run one subcommand; returns the process exit code
fn dispatch(args: Args) -> Result<i32> {
    let options = load_options(&args)?;
    logger::init_with_level(options.log_level);
    tracing::debug!(command = ?args.command, "starting");

    match args.command {
        Commands::Run { file, backend } => {
            let pipeline = source_pipeline(&options, &file);
            let source = read_source(&file)?;
            let unit = pipeline.parse(&source)?;
            let backend = Backend::from(backend);
            if backend == Backend::Native && !codegen::native_execution_supported() {
                tracing::warn!("native execution is not supported on this host");
            }
            let outcome = match backend {
                Backend::Interpreter => {
                    let (result, output) = pipeline.interpret_with_output(&unit);
                    flush_output(&output)?;
                    result?
                }
                Backend::Native => pipeline.run_native(&unit)?.status,
            };
            Ok(exit_status(outcome))
        }
        Commands::Compile { file, output } => {
            let pipeline = source_pipeline(&options, &file);
            let source = read_source(&file)?;
            pipeline
                .compile_to_file(&source, &output)
                .with_context(|| format!("Failed to compile: {}", file.display()))?;
            tracing::info!(output = %output.display(), "wrote module");
            Ok(0)
        }
        Commands::Exec { file } => {
            let pipeline = Pipeline::new(options);
            let module = pipeline
                .load_module(&file)
                .with_context(|| format!("Failed to load module: {}", file.display()))?;
            let pipeline = match module.entry.clone() {
                Some(entry_point) => Pipeline::new(PipelineOptions {
                    entry_point,
                    ..pipeline.options().clone()
                }),
                None => pipeline,
            };
            let (result, output) = pipeline.interpret_with_output(&module.unit);
            flush_output(&output)?;
            Ok(exit_status(result?))
        }
        Commands::Codegen { file, output } => {
            let pipeline = source_pipeline(&options, &file);
            let source = read_source(&file)?;
            let unit = pipeline.parse(&source)?;
            let image = pipeline.runtime_image(&unit)?;
            image
                .save(&output)
                .with_context(|| format!("Failed to write image: {}", output.display()))?;
            tracing::info!(
                output = %output.display(),
                code_size = image.code.len(),
                entry = image.entry_point_offset,
                "wrote runtime image"
            );
            Ok(0)
        }
        Commands::Dump { file } => {
            let unit = if is_astc_file(&file) {
                astc::load_astc(&file)
                    .with_context(|| format!("Failed to load module: {}", file.display()))?
                    .unit
            } else {
                let source = read_source(&file)?;
                source_pipeline(&options, &file).parse(&source)?
            };
            println!("{:#?}", unit);
            Ok(0)
        }
        Commands::Tokens { file } => {
            let source = read_source(&file)?;
            let tokens = lexer::tokenize(&source, &file.display().to_string());
            let mut stdout = std::io::stdout().lock();
            for token in &tokens {
                writeln!(stdout, "{:>4}:{:<3} {}", token.location.line, token.location.column, token)?;
            }
            let errors = lexer::lex_errors(&tokens);
            if errors.is_empty() {
                Ok(0)
            } else {
                Err(CompileError::Lex(errors).into())
            }
        }
    }
}

fn is_astc_file(path: &Path) -> bool {
    if path.extension().is_some_and(|ext| ext == "astc") {
        return true;
    }
    fs::read(path).is_ok_and(|bytes| bytes.starts_with(&astc::file::ASTC_MAGIC))
}

fn flush_output(output: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

/// Process status of a program result: its low 8 bits
fn exit_status(status: i64) -> i32 {
    (status & 0xFF) as i32
}

fn report(err: &anyhow::Error) {
    let colored = std::io::stderr().is_tty();
    let stage = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<CompileError>())
        .map(|e| e.stage());

    let label = match stage {
        Some(stage) => format!("error[{}]", stage),
        None => "error".to_string(),
    };
    if colored {
        eprintln!("{}: {}", label.red().bold(), err);
    } else {
        eprintln!("{}: {}", label, err);
    }
    // A stage error already includes its cause in its message
    if err.downcast_ref::<CompileError>().is_some() {
        return;
    }
    for cause in err.chain().skip(1) {
        if colored {
            eprintln!("  {} {}", "caused by:".yellow(), cause);
        } else {
            eprintln!("  caused by: {}", cause);
        }
    }
}
