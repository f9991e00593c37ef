//! Production Code Enforcement
//!
//! Production code propagates errors instead of calling `unwrap` or
//! `expect`, and does not silence dead code warnings. Everything after the
//! first `#[cfg(test)]` of a file, `tests.rs` files and comment lines are
//! exempt.

use std::fs;
use std::path::{Path, PathBuf};

/// Crate source roots, relative to this package
const SOURCE_ROOTS: &[&str] = &["../eddy-core/src", "../eddy-sim/src", "../eddy-cli/src"];

/// Forbidden pattern and the reason it is forbidden
const RULES: &[(&str, &str)] = &[
    (".unwrap()", "unwrap in production code"),
    (".expect(", "expect in production code"),
    ("allow(dead_code", "dead code allowance"),
];

#[derive(Debug)]
struct Violation {
    file_path: String,
    line_number: usize,
    rule: &'static str,
    context: String,
}

struct ProductionCodeChecker {
    violations: Vec<Violation>,
    files_checked: usize,
}

impl ProductionCodeChecker {
    fn new() -> Self {
        Self {
            violations: Vec::new(),
            files_checked: 0,
        }
    }

    fn find_rust_files(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                Self::find_rust_files(&path, files)?;
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                files.push(path);
            }
        }
        Ok(())
    }

    fn is_test_file(path: &Path) -> bool {
        path.file_name()
            .is_some_and(|name| name == "tests.rs" || name.to_string_lossy().ends_with("_tests.rs"))
    }

    /// Checks source text, stopping at the test module.
    fn check_source(&mut self, file_path: &str, content: &str) {
        for (index, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.starts_with("#[cfg(test)]") {
                break;
            }
            if trimmed.starts_with("//") {
                continue;
            }
            for (pattern, rule) in RULES {
                if trimmed.contains(pattern) {
                    self.violations.push(Violation {
                        file_path: file_path.to_string(),
                        line_number: index + 1,
                        rule,
                        context: trimmed.to_string(),
                    });
                }
            }
        }
    }

    fn check_workspace(&mut self) -> std::io::Result<()> {
        let mut files = Vec::new();
        for root in SOURCE_ROOTS {
            Self::find_rust_files(Path::new(root), &mut files)?;
        }
        files.sort();

        for file in files.iter().filter(|file| !Self::is_test_file(file)) {
            let content = fs::read_to_string(file)?;
            self.files_checked += 1;
            self.check_source(&file.to_string_lossy(), &content);
        }
        Ok(())
    }

    fn report_violations(&self) -> bool {
        if self.violations.is_empty() {
            println!(
                "Production code enforcement: {} files checked, no violations found",
                self.files_checked
            );
            return true;
        }

        println!("Production code violations found:");
        for violation in &self.violations {
            println!(
                "{}:{} ({})",
                violation.file_path, violation.line_number, violation.rule
            );
            println!("  {}", violation.context);
        }
        println!(
            "Found {} violation(s) in {} file(s) checked",
            self.violations.len(),
            self.files_checked
        );
        println!("Return an error with `?` instead, or move the code under #[cfg(test)].");
        false
    }
}

#[test]
fn test_violations_are_detected_before_test_module() {
    let mut checker = ProductionCodeChecker::new();
    let source = r#"
fn load() -> u32 {
    // a comment mentioning .unwrap() is fine
    parse().unwrap()
}

#[allow(dead_code)]
fn unused() {}

#[cfg(test)]
mod tests {
    fn helper() {
        parse().expect("test code may panic");
    }
}
"#;

    checker.check_source("sample.rs", source);

    let lines: Vec<_> = checker
        .violations
        .iter()
        .map(|violation| (violation.line_number, violation.rule))
        .collect();
    assert_eq!(
        lines,
        vec![(4, "unwrap in production code"), (7, "dead code allowance")]
    );
}

#[test]
fn test_test_files_are_exempt() {
    assert!(ProductionCodeChecker::is_test_file(Path::new(
        "eddy-sim/src/harness/tests.rs"
    )));
    assert!(!ProductionCodeChecker::is_test_file(Path::new(
        "eddy-sim/src/harness/tasks.rs"
    )));
}

#[test]
fn production_code_enforcement() {
    let mut checker = ProductionCodeChecker::new();

    checker
        .check_workspace()
        .expect("Failed to scan crate sources");

    assert!(
        checker.report_violations(),
        "Panicking shortcuts found in production code - see output above"
    );
}
