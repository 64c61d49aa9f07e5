//! Writing rendered output

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{CliError, Result};

/// A rendered template, ready to be written
#[derive(Debug)]
pub struct Rendered {
    pub label: String,
    pub relative: Option<std::path::PathBuf>,
    pub content: String,
}

/// Concatenate every result to stdout, in order
pub fn write_stdout(rendered: &[Rendered]) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for item in rendered {
        out.write_all(item.content.as_bytes())
            .map_err(|e| CliError::io(Path::new("stdout"), e))?;
    }
    out.flush().map_err(|e| CliError::io(Path::new("stdout"), e))
}

/// Write one result to `path`, creating parent directories
pub fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| CliError::io(parent, e))?;
    }
    fs::write(path, content).map_err(|e| CliError::io(path, e))?;
    tracing::debug!(path = %path.display(), bytes = content.len(), "wrote output");
    Ok(())
}

/// Mirror directory results under `outdir`
pub fn write_tree(outdir: &Path, rendered: &[Rendered]) -> Result<()> {
    for item in rendered {
        let relative = item
            .relative
            .as_deref()
            .unwrap_or_else(|| Path::new(&item.label));
        write_file(&outdir.join(relative), &item.content)?;
    }
    Ok(())
}
