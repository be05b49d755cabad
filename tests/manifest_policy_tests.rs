#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Manifest policy tests.
//!
//! These keep Cargo.toml honest: the panic-free lint set stays at deny level,
//! optional backends stay behind their features, every demo declares the
//! features it needs, and no feature re-enables what tokio already has.

use std::path::PathBuf;

fn project_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

fn read_project_file(relative_path: &str) -> String {
    let path = project_root().join(relative_path);
    std::fs::read_to_string(&path).unwrap_or_else(|e| {
        panic!(
            "Failed to read '{}': {}. This file is required by project policy.",
            path.display(),
            e
        )
    })
}

const REQUIRED_DENY_LINTS: &[&str] = &[
    "unwrap_used",
    "expect_used",
    "panic",
    "todo",
    "unimplemented",
    "indexing_slicing",
];

#[test]
fn cargo_toml_has_all_panic_free_lints() {
    let cargo = read_project_file("Cargo.toml");
    assert!(
        cargo.contains("[lints.clippy]"),
        "Cargo.toml is missing its [lints.clippy] section"
    );
    for lint in REQUIRED_DENY_LINTS {
        let pattern = format!("{lint} = \"deny\"");
        assert!(
            cargo.contains(&pattern),
            "Cargo.toml is missing `{pattern}` in [lints.clippy]. \
             Library code must stay panic-free."
        );
    }
}

#[test]
fn network_backends_are_optional() {
    let cargo = read_project_file("Cargo.toml");
    for dependency in ["tokio-tungstenite", "reqwest"] {
        let line = cargo
            .lines()
            .find(|line| line.starts_with(&format!("{dependency} =")))
            .unwrap_or_else(|| panic!("{dependency} is not declared"));
        assert!(
            line.contains("optional = true"),
            "{dependency} must stay behind a feature: {line}"
        );
    }
}

/// Feature each optional backend type lives behind.
const BACKEND_FEATURES: &[(&str, &str)] = &[
    ("WebSocketTransport", "transport-websocket"),
    ("HttpSessionAllocator", "allocation-http"),
];

#[test]
fn every_demo_is_registered_with_its_backend_features() {
    let cargo = read_project_file("Cargo.toml");
    let demos = std::fs::read_dir(project_root().join("demos")).unwrap();
    for entry in demos {
        let name = entry.unwrap().file_name().to_string_lossy().into_owned();
        let Some(stem) = name.strip_suffix(".rs") else {
            continue;
        };
        let block = cargo
            .split("[[example]]")
            .find(|block| block.contains(&format!("name = \"{stem}\"")))
            .unwrap_or_else(|| panic!("demo {name} has no [[example]] entry"));
        assert!(
            block.contains(&format!("path = \"demos/{name}\"")),
            "demo {name} is registered with the wrong path"
        );

        let source = read_project_file(&format!("demos/{name}"));
        for (backend, feature) in BACKEND_FEATURES {
            if source.contains(backend) {
                let required = block
                    .lines()
                    .find(|line| line.starts_with("required-features"))
                    .unwrap_or_else(|| panic!("demo {name} uses {backend} without required-features"));
                assert!(
                    required.contains(&format!("\"{feature}\"")),
                    "demo {name} uses {backend} but does not require `{feature}`"
                );
            }
        }
    }
}

#[test]
fn features_do_not_repeat_base_tokio_features() {
    let cargo = read_project_file("Cargo.toml");
    let tokio_line = cargo
        .lines()
        .find(|line| line.starts_with("tokio ="))
        .expect("tokio is not declared");
    let features = cargo
        .split("[features]")
        .nth(1)
        .and_then(|rest| rest.split("\n[").next())
        .expect("Cargo.toml has no [features] table");

    for line in features.lines() {
        for feature in line.split('"').filter_map(|item| item.strip_prefix("tokio/")) {
            assert!(
                !tokio_line.contains(&format!("\"{feature}\"")),
                "feature line `{line}` enables tokio `{feature}`, which is always on"
            );
        }
    }
}
