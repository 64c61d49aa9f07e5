//! The render command: build the context, render every input, write results

use std::fs;
use std::path::{Path, PathBuf};

use render_core::{TemplateContext, Values};
use render_engine::Engine;

use crate::error::{CliError, Result};
use crate::input::{self, TemplateSource};
use crate::output::{self, Rendered};

/// Options for one invocation
#[derive(Debug, Default)]
pub struct RenderOptions {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub input_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub configs: Vec<PathBuf>,
    pub vars: Vec<String>,
    pub ignore_missing_keys: bool,
}

pub fn run(options: &RenderOptions) -> Result<()> {
    let context = build_context(&options.configs, &options.vars)?;
    let engine = Engine::new(!options.ignore_missing_keys);
    if options.ignore_missing_keys {
        tracing::debug!("missing keys print <no value>");
    }

    let sources = match (&options.input, &options.input_dir) {
        (Some(path), _) => vec![input::read_file(path)?],
        (None, Some(dir)) => input::read_dir(dir)?,
        (None, None) => vec![input::read_stdin()?],
    };

    // Render everything before writing anything
    let rendered = render_all(&engine, &context, sources)?;

    match (&options.output, &options.output_dir) {
        (Some(path), _) => {
            let content: String = rendered.iter().map(|r| r.content.as_str()).collect();
            output::write_file(path, &content)
        }
        (None, Some(dir)) => output::write_tree(dir, &rendered),
        (None, None) => output::write_stdout(&rendered),
    }
}

/// Merge configuration files in order, then apply variables
pub fn build_context(configs: &[PathBuf], vars: &[String]) -> Result<TemplateContext> {
    let mut values = Values::new();
    for path in configs {
        values.merge(&load_config(path)?);
        tracing::debug!(path = %path.display(), "loaded config");
    }
    TemplateContext::build(values, vars).map_err(CliError::Variable)
}

fn load_config(path: &Path) -> Result<Values> {
    let text = fs::read_to_string(path).map_err(|e| CliError::io(path, e))?;
    Values::from_yaml(&text).map_err(|e| CliError::config(path, e))
}

fn render_all(engine: &Engine, context: &TemplateContext, sources: Vec<TemplateSource>) -> Result<Vec<Rendered>> {
    sources
        .into_iter()
        .map(|source| {
            let content = engine.render_string(&source.text, context, &source.label)?;
            Ok(Rendered {
                label: source.label,
                relative: source.relative,
                content,
            })
        })
        .collect()
}
