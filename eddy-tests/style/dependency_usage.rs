//! Dependency Usage Enforcement
//!
//! Every entry under `[dependencies]` of an Eddy manifest must be named by a
//! path or `use` somewhere in that crate's Rust files. Dev and build
//! dependencies are not checked.

use std::fs;
use std::path::{Path, PathBuf};

/// Crate roots, relative to this package
const CRATE_ROOTS: &[&str] = &["../eddy-core", "../eddy-sim", "../eddy-cli", "."];

fn declared_dependencies(manifest: &str) -> Vec<String> {
    let mut section = "";
    let mut names = Vec::new();
    for line in manifest.lines().map(str::trim) {
        if line.starts_with('[') {
            section = line;
            continue;
        }
        if section != "[dependencies]" || line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((name, _)) = line.split_once('=') {
            names.push(name.trim().to_string());
        }
    }
    names
}

fn mentions_crate(source: &str, dependency: &str) -> bool {
    let ident = dependency.replace('-', "_");
    let path = format!("{ident}::");
    let import = format!("use {ident}");
    source
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("//"))
        .any(|line| line.contains(&path) || line.starts_with(&import))
}

fn find_rust_files(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if path.file_name().is_some_and(|name| name != "target") {
                find_rust_files(&path, files)?;
            }
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            files.push(path);
        }
    }
    Ok(())
}

fn unused_dependencies(root: &Path) -> std::io::Result<Vec<String>> {
    let manifest = fs::read_to_string(root.join("Cargo.toml"))?;
    let mut files = Vec::new();
    find_rust_files(root, &mut files)?;
    let sources = files
        .iter()
        .map(fs::read_to_string)
        .collect::<std::io::Result<Vec<_>>>()?;

    Ok(declared_dependencies(&manifest)
        .into_iter()
        .filter(|dependency| !sources.iter().any(|source| mentions_crate(source, dependency)))
        .collect())
}

#[test]
fn test_only_dependencies_table_is_read() {
    let manifest = r#"
[package]
name = "sample"

[dependencies]
# Workspace crates
eddy-core = { path = "../eddy-core" }
tracing = "0.1"

[dev-dependencies]
tempfile = "3"
"#;

    assert_eq!(declared_dependencies(manifest), vec!["eddy-core", "tracing"]);
}

#[test]
fn test_commented_mentions_do_not_count() {
    let source = "// log_sink::emit() would go here\nfn main() {}\n";

    assert!(!mentions_crate(source, "log-sink"));
    assert!(mentions_crate("use log_sink::Writer;\n", "log-sink"));
    assert!(mentions_crate("    let w = log_sink::open(path)?;\n", "log_sink"));
}

#[test]
fn dependency_usage_enforcement() {
    let mut unused = Vec::new();
    for root in CRATE_ROOTS {
        let root = Path::new(root);
        for dependency in unused_dependencies(root).expect("Failed to scan crate") {
            unused.push(format!("{}: {dependency}", root.display()));
        }
    }

    assert!(unused.is_empty(), "Unused dependencies: {unused:?}");
}
