//! shader-bundler - flatten GLSL includes and embed the result in C headers
//!
//! # Commands
//!
//! - `shader-bundler bundle` - Resolve includes, keep reachable definitions, minify
//! - `shader-bundler embed` - Convert a file, string or stdin into a C header
//!
//! # Usage
//!
//! ```bash
//! # Print the bundled shader
//! shader-bundler bundle shaders/scene.frag
//!
//! # Bundle straight into a header
//! shader-bundler bundle shaders/scene.frag -o scene.frag.h --embed scene.frag --mode text
//!
//! # Convert anything else
//! shader-bundler embed font.h --file font.bin
//! ```

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use shader_bundler::embed::{self, EmbedMode};
use shader_bundler::BundleOptions;

/// Flatten GLSL includes, keeping only reachable definitions
#[derive(Parser)]
#[command(name = "shader-bundler")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve includes in a shader and write the bundled source
    Bundle(BundleArgs),

    /// Convert a file, string or stdin into a C header
    Embed(EmbedArgs),
}

#[derive(Args)]
struct BundleArgs {
    /// Root shader file
    input: PathBuf,

    /// Output file (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Keep comments in the output
    #[arg(long)]
    keep_comments: bool,

    /// Keep blank lines and line structure
    #[arg(long)]
    keep_newlines: bool,

    /// Keep the original spacing around operators
    #[arg(long)]
    keep_spaces: bool,

    /// Wrap the bundle in a C header, using NAME for the array
    #[arg(long, value_name = "NAME")]
    embed: Option<String>,

    /// Header payload format, with --embed
    #[arg(short, long, value_enum, default_value_t = EmbedMode::Text)]
    mode: EmbedMode,
}

#[derive(Args)]
#[command(group(clap::ArgGroup::new("input").required(true).args(["file", "string", "stdin"])))]
struct EmbedArgs {
    /// Output header file (.h)
    output: PathBuf,

    /// Input file to convert
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// String to convert
    #[arg(short, long)]
    string: Option<String>,

    /// Read from stdin
    #[arg(long)]
    stdin: bool,

    /// Array name (defaults to the input file name)
    #[arg(short, long)]
    name: Option<String>,

    /// Header payload format
    #[arg(short, long, value_enum, default_value_t = EmbedMode::Binary)]
    mode: EmbedMode,
}

fn write_output(output: Option<&Path>, contents: &[u8]) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, contents)
            .with_context(|| format!("Error writing to output file {}", path.display())),
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            handle.write_all(contents)?;
            handle.flush()?;
            Ok(())
        }
    }
}

fn run_bundle(args: BundleArgs) -> Result<()> {
    let options = BundleOptions {
        strip_comments: !args.keep_comments,
        collapse_newlines: !args.keep_newlines,
        normalize_spaces: !args.keep_spaces,
    };

    let bundle = shader_bundler::bundle_shader(&args.input, &options)
        .with_context(|| format!("Error processing {}", args.input.display()))?;

    tracing::info!(
        "bundled {} ({} bytes, {} warnings)",
        args.input.display(),
        bundle.source.len(),
        bundle.diagnostics.len()
    );

    let contents = match &args.embed {
        Some(name) => embed::header(bundle.source.as_bytes(), name, args.mode).into_bytes(),
        None => bundle.source.into_bytes(),
    };
    write_output(args.output.as_deref(), &contents)
}

fn run_embed(args: EmbedArgs) -> Result<()> {
    let (data, name) = if let Some(file) = &args.file {
        let data =
            std::fs::read(file).with_context(|| format!("Error reading {}", file.display()))?;
        let name = match &args.name {
            Some(name) => name.clone(),
            None => embed::identifier_for_path(file),
        };
        (data, name)
    } else {
        let name = match &args.name {
            Some(name) => name.clone(),
            None => bail!("--name is required when using --string or --stdin"),
        };
        let data = match &args.string {
            Some(string) => string.clone().into_bytes(),
            None => {
                let mut data = Vec::new();
                std::io::stdin()
                    .read_to_end(&mut data)
                    .context("Error reading stdin")?;
                data
            }
        };
        (data, name)
    };

    let header = embed::header(&data, &name, args.mode);
    write_output(Some(args.output.as_path()), header.as_bytes())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Bundle(args) => run_bundle(args),
        Commands::Embed(args) => run_embed(args),
    }
}
