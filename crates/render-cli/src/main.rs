//! Render CLI - Universal data-driven templates for generating textual output

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod error;
mod exit_codes;
mod input;
mod output;
mod render;

use render::RenderOptions;

#[derive(Parser)]
#[command(name = "render")]
#[command(author = "Render Contributors")]
#[command(version)]
#[command(about = "render - Universal data-driven templates for generating textual output", long_about = None)]
struct Cli {
    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// The template file to process
    #[arg(long = "in", value_name = "FILE", conflicts_with = "indir")]
    input: Option<PathBuf>,

    /// The output file; stdout when not set
    #[arg(long = "out", value_name = "FILE", conflicts_with = "indir")]
    output: Option<PathBuf>,

    /// A directory of templates to process
    #[arg(long, value_name = "DIR")]
    indir: Option<PathBuf>,

    /// Where to write rendered directory templates; stdout when not set
    #[arg(long, value_name = "DIR", requires = "indir")]
    outdir: Option<PathBuf>,

    /// Configuration file(s), merged in order
    #[arg(long = "config", value_name = "FILE")]
    configs: Vec<PathBuf>,

    /// Set a variable (path.to.key=value), applied after configuration
    #[arg(long = "var", value_name = "PATH=VALUE")]
    vars: Vec<String>,

    /// Print <no value> for missing keys instead of failing
    #[arg(long)]
    unsafe_ignore_missing_keys: bool,
}

fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            let code = if err.use_stderr() {
                exit_codes::USAGE_ERROR
            } else {
                exit_codes::SUCCESS
            };
            std::process::exit(code);
        }
    };

    init_logging(cli.debug);

    let options = RenderOptions {
        input: cli.input,
        output: cli.output,
        input_dir: cli.indir,
        output_dir: cli.outdir,
        configs: cli.configs,
        vars: cli.vars,
        ignore_missing_keys: cli.unsafe_ignore_missing_keys,
    };

    if let Err(err) = render::run(&options) {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

/// Log to stderr; `RUST_LOG` overrides the level picked by `--debug`
fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
