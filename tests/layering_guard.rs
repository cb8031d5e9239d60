//! Layering guardrails for the vocabulary crate.
//!
//! `tracebridge_core` holds names, units and error types shared by every layer. It must stay free of
//! runtime machinery: no async runtime, no logging, no serialization, and never a dependency back on
//! the `tracebridge` crate. This test scans its `Cargo.toml` and fails if `[dependencies]` names
//! anything outside the allow-list.

const ALLOWED: &[&str] = &["thiserror"];

#[test]
fn core_crate_has_no_runtime_dependencies() {
    let manifest = include_str!("../crates/tracebridge_core/Cargo.toml");
    let mut in_dependencies = false;

    for raw_line in manifest.lines() {
        let line = raw_line.trim();
        // Track when we enter/exit the `[dependencies]` table.
        if line.starts_with('[') {
            in_dependencies = line == "[dependencies]";
            continue;
        }

        if !in_dependencies || line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line_no_comment = line.split('#').next().unwrap_or("").trim();
        let Some((dependency, _)) = line_no_comment.split_once('=') else {
            continue;
        };
        let dependency = dependency.trim();
        assert!(
            ALLOWED.contains(&dependency),
            "`{dependency}` must not appear in tracebridge_core [dependencies]; allowed: {ALLOWED:?}"
        );
    }
}

#[test]
fn root_crate_depends_on_core_by_path() {
    let manifest = include_str!("../Cargo.toml");
    assert!(
        manifest
            .lines()
            .any(|line| line.trim_start().starts_with("tracebridge_core") && line.contains("path")),
        "the root crate must depend on crates/tracebridge_core by path"
    );
}
