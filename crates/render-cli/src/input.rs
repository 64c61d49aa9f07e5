//! Template input discovery

use std::fs;
use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{CliError, Result};

/// Label used for errors in templates read from stdin
pub const STDIN_LABEL: &str = "stdin";

/// One template to render
#[derive(Debug, Clone)]
pub struct TemplateSource {
    /// Name used in error locations
    pub label: String,
    /// Path relative to `--indir`, for directory renders
    pub relative: Option<PathBuf>,
    pub text: String,
}

/// Read the template piped on stdin
///
/// An interactive terminal on stdin means nothing was piped in.
pub fn read_stdin() -> Result<TemplateSource> {
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Err(CliError::no_input());
    }

    let mut text = String::new();
    stdin
        .read_to_string(&mut text)
        .map_err(|e| CliError::io(Path::new(STDIN_LABEL), e))?;

    Ok(TemplateSource {
        label: STDIN_LABEL.to_string(),
        relative: None,
        text,
    })
}

/// Read a single template file
pub fn read_file(path: &Path) -> Result<TemplateSource> {
    let text = fs::read_to_string(path).map_err(|e| CliError::io(path, e))?;
    Ok(TemplateSource {
        label: path.display().to_string(),
        relative: None,
        text,
    })
}

/// Read every regular file below `dir`, sorted by path
pub fn read_dir(dir: &Path) -> Result<Vec<TemplateSource>> {
    if !dir.is_dir() {
        return Err(CliError::input_with_help(
            format!("--indir {} is not a directory", dir.display()),
            "Pass a directory holding the templates to render",
        ));
    }

    let mut sources = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            CliError::io(&path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(dir).unwrap_or(path).to_path_buf();
        let mut source = read_file(path)?;
        source.relative = Some(relative);
        sources.push(source);
    }

    tracing::debug!(dir = %dir.display(), count = sources.len(), "discovered templates");
    Ok(sources)
}
