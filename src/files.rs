//! File and directory rendering on top of the core engine: per-file
//! rendering with dialect auto-detection, and recursive directory
//! rewriting with glob include/exclude filters and an optional rename
//! callback.

use crate::error::{KakikaeError, Result};
use crate::{Dialect, Rewriter};
use std::fs;
use std::path::{Path, PathBuf};

const HTML_EXTENSIONS: &[&str] = &["html", "htm", "xhtml", "xml", "svg", "vue"];

/// Pick a dialect from the file extension and the leading content: a
/// document starting with a doctype or markup is HTML even when its
/// extension says otherwise.
pub fn detect_dialect(path: &Path, head: &str) -> Dialect {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        if HTML_EXTENSIONS.iter().any(|h| ext.eq_ignore_ascii_case(h)) {
            return Dialect::Html;
        }
    }
    let trimmed = head.trim_start();
    if trimmed.starts_with("<!DOCTYPE") || trimmed.starts_with("<?xml") || trimmed.starts_with('<')
    {
        return Dialect::Html;
    }
    Dialect::Text
}

/// Options for [`Rewriter::render_dir`].
pub struct DirOptions {
    pub source: PathBuf,
    /// Where rendered files are written; `None` renders in memory only.
    pub target: Option<PathBuf>,
    /// Glob patterns on relative paths; empty means everything.
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Maps a relative output path to a new relative path.
    pub rename: Option<Box<dyn Fn(&Path) -> PathBuf>>,
}

impl DirOptions {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: None,
            include: Vec::new(),
            exclude: Vec::new(),
            rename: None,
        }
    }
}

/// One rendered file of a directory run.
pub struct RenderedFile {
    pub source: PathBuf,
    pub target: Option<PathBuf>,
    pub output: String,
}

impl Rewriter {
    /// Read, auto-detect the dialect and render one file.
    pub fn render_file(
        &self,
        path: impl AsRef<Path>,
        scope: &serde_json::Value,
    ) -> Result<String> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)?;
        let dialect = detect_dialect(path, &source);
        let name = path.to_string_lossy().into_owned();
        self.compile_named(&source, Some(&name), dialect)?
            .render(scope)
    }

    /// Render one file and write the result to `target`, creating
    /// parent directories as needed.
    pub fn render_file_to(
        &self,
        path: impl AsRef<Path>,
        target: impl AsRef<Path>,
        scope: &serde_json::Value,
    ) -> Result<String> {
        let output = self.render_file(path.as_ref(), scope)?;
        let target = target.as_ref();
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(target, &output)?;
        Ok(output)
    }

    /// Recursively render every matching file under a directory.
    pub fn render_dir(
        &self,
        opts: &DirOptions,
        scope: &serde_json::Value,
    ) -> Result<Vec<RenderedFile>> {
        let include = compile_globs(&opts.include)?;
        let exclude = compile_globs(&opts.exclude)?;
        let mut files = Vec::new();
        collect_files(&opts.source, &mut files)?;
        files.sort();

        let mut rendered = Vec::new();
        for path in files {
            let rel = match path.strip_prefix(&opts.source) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => continue,
            };
            let rel_text = rel.to_string_lossy().replace('\\', "/");
            if !include.is_empty() && !include.iter().any(|p| p.matches(&rel_text)) {
                continue;
            }
            if exclude.iter().any(|p| p.matches(&rel_text)) {
                continue;
            }
            let target = opts.target.as_ref().map(|dir| {
                let out_rel = match &opts.rename {
                    Some(rename) => rename(&rel),
                    None => rel.clone(),
                };
                dir.join(out_rel)
            });
            let output = match &target {
                Some(target) => self.render_file_to(&path, target, scope)?,
                None => self.render_file(&path, scope)?,
            };
            rendered.push(RenderedFile {
                source: path,
                target,
                output,
            });
        }
        tracing::debug!(files = rendered.len(), "directory rewrite finished");
        Ok(rendered)
    }
}

fn compile_globs(patterns: &[String]) -> Result<Vec<glob::Pattern>> {
    patterns
        .iter()
        .map(|p| {
            glob::Pattern::new(p).map_err(|e| KakikaeError::Options {
                message: format!("invalid glob pattern '{p}': {e}"),
            })
        })
        .collect()
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_by_extension() {
        assert_eq!(
            detect_dialect(Path::new("page.html"), "anything"),
            Dialect::Html
        );
        assert_eq!(
            detect_dialect(Path::new("page.XML"), "anything"),
            Dialect::Html
        );
        assert_eq!(detect_dialect(Path::new("main.rs"), "fn main() {}"), Dialect::Text);
    }

    #[test]
    fn test_detect_by_leading_content() {
        assert_eq!(
            detect_dialect(Path::new("page.tpl"), "<!DOCTYPE html>\n<html>"),
            Dialect::Html
        );
        assert_eq!(
            detect_dialect(Path::new("page.tpl"), "  <div>x</div>"),
            Dialect::Html
        );
        assert_eq!(
            detect_dialect(Path::new("notes.tpl"), "plain text"),
            Dialect::Text
        );
    }
}
