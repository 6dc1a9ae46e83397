//! File and directory rendering: dialect auto-detection, glob filters
//! and rename callbacks.

use kakikae::files::{detect_dialect, DirOptions};
use kakikae::{Dialect, Rewriter};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

mod detection {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn extension_wins_over_content() {
        assert_eq!(detect_dialect(Path::new("a.html"), "plain"), Dialect::Html);
        assert_eq!(detect_dialect(Path::new("a.vue"), "plain"), Dialect::Html);
        assert_eq!(detect_dialect(Path::new("a.rs"), "fn main() {}"), Dialect::Text);
    }

    #[test]
    fn leading_markup_forces_html() {
        assert_eq!(
            detect_dialect(Path::new("page.tpl"), "<!DOCTYPE html>"),
            Dialect::Html
        );
        assert_eq!(
            detect_dialect(Path::new("page.tpl"), "  <div>x</div>"),
            Dialect::Html
        );
        assert_eq!(detect_dialect(Path::new("page.tpl"), "x = 1"), Dialect::Text);
    }
}

mod single_files {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_a_text_file_with_directives() {
        let dir = TempDir::new().unwrap();
        let path = write(
            dir.path(),
            "app.conf",
            "host = {{ host }}\n//=IF(debug)\nlog = trace\n//=END IF\n",
        );
        let rw = Rewriter::new().unwrap();
        let out = rw
            .render_file(&path, &json!({"host": "example.com", "debug": false}))
            .unwrap();
        assert_eq!(out, "host = example.com\n");
    }

    #[test]
    fn renders_an_html_file_by_extension() {
        let dir = TempDir::new().unwrap();
        let path = write(
            dir.path(),
            "index.html",
            r#"<ul><li v-for="u of users">{{ u }}</li></ul>"#,
        );
        let rw = Rewriter::new().unwrap();
        let out = rw.render_file(&path, &json!({"users": ["ada", "bob"]})).unwrap();
        assert_eq!(out, "<ul><li>ada</li><li>bob</li></ul>");
    }

    #[test]
    fn render_file_to_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let source = write(dir.path(), "in.txt", "v={{ v }}\n");
        let target = dir.path().join("out/deep/in.txt");
        let rw = Rewriter::new().unwrap();
        rw.render_file_to(&source, &target, &json!({"v": 1})).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "v=1\n");
    }

    #[test]
    fn diagnostics_carry_the_file_name() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "bad.txt", "//=IF(a)\nno end\n");
        let rw = Rewriter::new().unwrap();
        let err = rw.render_file(&path, &json!({"a": true})).unwrap_err();
        assert!(err.to_string().contains("bad.txt"));
    }
}

mod directories {
    use super::*;
    use pretty_assertions::assert_eq;

    fn seed(dir: &Path) {
        write(dir, "a.txt", "a={{ n }}\n");
        write(dir, "sub/b.html", r#"<b v-if="on">B</b>"#);
        write(dir, "notes.log", "skip {{ me }}\n");
    }

    #[test]
    fn renders_everything_when_no_filters_given() {
        let src = TempDir::new().unwrap();
        write(src.path(), "a.txt", "a={{ n }}\n");
        write(src.path(), "sub/b.txt", "b={{ n }}\n");
        let rw = Rewriter::new().unwrap();
        let rendered = rw
            .render_dir(&DirOptions::new(src.path()), &json!({"n": 1}))
            .unwrap();
        assert_eq!(rendered.len(), 2);
        assert_eq!(rendered[0].output, "a=1\n");
        assert_eq!(rendered[1].output, "b=1\n");
        // in-memory only: no targets were written
        assert!(rendered.iter().all(|f| f.target.is_none()));
    }

    #[test]
    fn exclude_globs_drop_files() {
        let src = TempDir::new().unwrap();
        seed(src.path());
        let rw = Rewriter::new().unwrap();
        let mut opts = DirOptions::new(src.path());
        opts.exclude = vec!["*.log".to_owned()];
        let rendered = rw.render_dir(&opts, &json!({"n": 2, "on": true})).unwrap();
        let sources: Vec<String> = rendered
            .iter()
            .map(|f| f.source.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(sources, vec!["a.txt", "b.html"]);
        assert_eq!(rendered[1].output, "<b>B</b>");
    }

    #[test]
    fn include_globs_select_files() {
        let src = TempDir::new().unwrap();
        seed(src.path());
        let rw = Rewriter::new().unwrap();
        let mut opts = DirOptions::new(src.path());
        opts.include = vec!["sub/*".to_owned()];
        let rendered = rw.render_dir(&opts, &json!({"on": false})).unwrap();
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].output, "");
    }

    #[test]
    fn writes_into_the_target_tree_with_rename() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write(src.path(), "conf.txt.tpl", "port={{ port }}\n");
        let rw = Rewriter::new().unwrap();
        let mut opts = DirOptions::new(src.path());
        opts.target = Some(dst.path().to_path_buf());
        opts.rename = Some(Box::new(|rel: &Path| {
            // conf.txt.tpl -> conf.txt
            rel.with_extension("")
        }));
        let rendered = rw.render_dir(&opts, &json!({"port": 8080})).unwrap();
        assert_eq!(rendered.len(), 1);
        let target = dst.path().join("conf.txt");
        assert_eq!(rendered[0].target.as_deref(), Some(target.as_path()));
        assert_eq!(fs::read_to_string(&target).unwrap(), "port=8080\n");
    }
}
