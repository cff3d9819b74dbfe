//! JSON configuration: extra alignment rows, feature rules and overrides
//! layered over the documented tables.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use typekey_core::{
    AlignmentRow, AlignmentTable, Feature, FeatureRule, FeatureRules, Overrides, Resolver,
};

/// Maximum configuration file size in bytes (1MB)
const MAX_CONFIG_SIZE: u64 = 1_000_000;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverConfig {
    /// Rows added to (or replacing) the documented alignment table.
    #[serde(default)]
    pub alignment: Vec<AlignmentRow>,
    /// Start from an empty alignment table instead of the documented one.
    #[serde(default)]
    pub replace_alignment: bool,
    #[serde(default)]
    pub feature_rules: Vec<FeatureRule>,
    /// Explicit bit count; bypasses the alignment table.
    #[serde(default)]
    pub irrelevant_bits: Option<u32>,
    /// Per-feature force on/off, keyed by feature name.
    #[serde(default)]
    pub features: BTreeMap<String, bool>,
}

impl ResolverConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid resolver configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let meta = std::fs::metadata(path)
            .with_context(|| format!("cannot read config '{}'", path.display()))?;
        if meta.len() > MAX_CONFIG_SIZE {
            return Err(anyhow!(
                "config '{}' exceeds {}MB limit ({} bytes)",
                path.display(),
                MAX_CONFIG_SIZE / 1_000_000,
                meta.len()
            ));
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config '{}'", path.display()))?;
        Self::from_json(&text).with_context(|| format!("in '{}'", path.display()))
    }

    pub fn into_resolver(self) -> Result<Resolver> {
        let mut alignment = if self.replace_alignment {
            AlignmentTable::empty()
        } else {
            AlignmentTable::documented()
        };
        for row in self.alignment {
            alignment.insert(row);
        }

        let mut features = FeatureRules::documented();
        for rule in self.feature_rules {
            features.push(rule);
        }

        let mut overrides = Overrides {
            irrelevant_bits: self.irrelevant_bits,
            ..Overrides::default()
        };
        for (name, on) in self.features {
            let feature = Feature::from_name(&name)
                .ok_or_else(|| anyhow!("unknown feature '{}' in overrides", name))?;
            overrides = overrides.feature(feature, on);
        }

        Ok(Resolver::new(alignment, features, overrides))
    }
}

/// Resolver from an optional config file; documented tables otherwise.
pub fn load_resolver(path: Option<&Path>) -> Result<Resolver> {
    match path {
        Some(p) => {
            let resolver = ResolverConfig::load(p)?.into_resolver()?;
            tracing::debug!(config = %p.display(), rows = resolver.alignment.rows().len(), "loaded resolver config");
            Ok(resolver)
        }
        None => Ok(Resolver::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use typekey_core::{BuildMode, PointerWidth, ToolchainFamily};

    #[test]
    fn empty_config_is_documented_tables() {
        let resolver = ResolverConfig::from_json("{}").unwrap().into_resolver().unwrap();
        assert_eq!(resolver, Resolver::default());
    }

    #[test]
    fn rows_and_rules_extend_tables() {
        let cfg = ResolverConfig::from_json(
            r#"{
                "alignment": [
                    { "toolchain": "gcc", "pointer_width": 64, "build_mode": "release", "irrelevant_bits": 3 }
                ],
                "feature_rules": [ { "toolchain": "gcc", "feature": "noexcept", "min_version": 460 } ],
                "features": { "vla": true }
            }"#,
        )
        .unwrap();
        let resolver = cfg.into_resolver().unwrap();
        assert_eq!(
            resolver
                .alignment
                .lookup(ToolchainFamily::Gcc, PointerWidth::W64, BuildMode::Release),
            Some(3)
        );
        let p = resolver.resolve(&"gcc-480/64/release".parse().unwrap()).unwrap();
        assert!(p.supports(Feature::Noexcept));
        assert!(p.supports(Feature::Vla));
    }

    #[test]
    fn replace_alignment_starts_empty() {
        let cfg = ResolverConfig::from_json(
            r#"{ "replace_alignment": true,
                 "alignment": [ { "pointer_width": 32, "build_mode": "debug", "irrelevant_bits": 1 } ] }"#,
        )
        .unwrap();
        let resolver = cfg.into_resolver().unwrap();
        assert_eq!(resolver.alignment.rows().len(), 1);
        assert!(resolver.resolve(&"msvc/64/debug".parse().unwrap()).is_err());
    }

    #[test]
    fn rejects_unknown_fields_and_features() {
        assert!(ResolverConfig::from_json(r#"{ "bits": 3 }"#).is_err());
        assert!(ResolverConfig::from_json(r#"{ "alignment": [ { "pointer_width": 16, "build_mode": "debug", "irrelevant_bits": 1 } ] }"#).is_err());
        let cfg = ResolverConfig::from_json(r#"{ "features": { "coroutines": true } }"#).unwrap();
        assert!(cfg.into_resolver().is_err());
    }
}
