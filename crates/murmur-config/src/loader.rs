// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::CoreConfig;

/// Ordered list of config file locations searched from lowest to highest priority.
/// Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // 1. System-wide default
    paths.push(PathBuf::from("/etc/murmur/config.yaml"));
    paths.push(PathBuf::from("/etc/murmur/config.yml"));

    // 2. XDG / home
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/murmur/config.yaml"));
        paths.push(home.join(".config/murmur/config.yml"));
    }
    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("murmur/config.yaml"));
        paths.push(cfg.join("murmur/config.yml"));
    }

    // 3. Workspace-local
    paths.push(PathBuf::from(".murmur/config.yaml"));
    paths.push(PathBuf::from(".murmur/config.yml"));
    paths.push(PathBuf::from("murmur.yaml"));
    paths.push(PathBuf::from("murmur.yml"));

    paths
}

/// Load configuration by merging all discovered YAML files.
/// The `extra` argument may provide an explicit path (e.g. an embedding
/// application's own config flag).
pub fn load(extra: Option<&Path>) -> anyhow::Result<CoreConfig> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let layer: serde_yaml::Value = serde_yaml::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            merge_yaml(&mut merged, layer);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        let text =
            std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
        let layer: serde_yaml::Value =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", p.display()))?;
        merge_yaml(&mut merged, layer);
    }

    let config: CoreConfig = if matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty())
    {
        CoreConfig::default()
    } else {
        serde_yaml::from_value(merged).unwrap_or_default()
    };
    config.validate().map_err(anyhow::Error::from)?;
    Ok(config)
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("murmur.yaml");
        std::fs::write(&path, "default_tool_timeout_secs: 7\n").unwrap();
        let cfg = load(Some(&path)).unwrap();
        assert_eq!(cfg.default_tool_timeout_secs, 7);
        // Untouched fields keep defaults.
        assert_eq!(cfg.discovery_interval_secs, 5);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("murmur.yaml");
        std::fs::write(&path, "model:\n  temperature: 9.0\n").unwrap();
        assert!(load(Some(&path)).is_err());
    }

    #[test]
    fn merge_scalar_conflict_src_wins() {
        let mut dst: serde_yaml::Value = serde_yaml::from_str("a: 1\nb: 2").unwrap();
        let src: serde_yaml::Value = serde_yaml::from_str("b: 3").unwrap();
        merge_yaml(&mut dst, src);
        assert_eq!(dst["a"], serde_yaml::Value::from(1));
        assert_eq!(dst["b"], serde_yaml::Value::from(3));
    }

    #[test]
    fn merge_nested_mappings() {
        let mut dst: serde_yaml::Value = serde_yaml::from_str("model:\n  top_p: 0.5").unwrap();
        let src: serde_yaml::Value = serde_yaml::from_str("model:\n  max_tokens: 100").unwrap();
        merge_yaml(&mut dst, src);
        assert_eq!(dst["model"]["top_p"], serde_yaml::Value::from(0.5));
        assert_eq!(dst["model"]["max_tokens"], serde_yaml::Value::from(100));
    }
}
