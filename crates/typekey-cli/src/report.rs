//! Printable renderings of profiles and tables.

use anyhow::Result;
use serde::Serialize;
use typekey_core::{AlignmentTable, CapabilityProfile, Resolver, TargetDescription};

/// SHA-256 of the profile's JSON rendering, prefixed with "sha256:".
/// Two builds whose digests match derive identical keys.
pub fn profile_digest(profile: &CapabilityProfile) -> Result<String> {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(profile)?);
    Ok(format!("sha256:{:x}", hasher.finalize()))
}

#[derive(Debug, Serialize)]
pub struct ProfileReport {
    pub target: String,
    pub table_version: u32,
    pub profile: CapabilityProfile,
    pub stamp: String,
    pub digest: String,
}

impl ProfileReport {
    pub fn new(target: &TargetDescription, profile: CapabilityProfile) -> Result<Self> {
        Ok(Self {
            target: target.to_string(),
            table_version: AlignmentTable::VERSION,
            stamp: profile.stamp().to_string(),
            digest: profile_digest(&profile)?,
            profile,
        })
    }

    pub fn render_pretty(&self) -> String {
        let p = &self.profile;
        let mut out = String::new();
        out.push_str(&format!("target:          {}\n", self.target));
        out.push_str(&format!("toolchain:       {}\n", p.toolchain()));
        out.push_str(&format!("pointer width:   {}\n", p.pointer_width()));
        out.push_str(&format!("build mode:      {}\n", p.build_mode()));
        out.push_str(&format!(
            "irrelevant bits: {} (table v{}, assumes {}-byte alignment)\n",
            p.irrelevant_bits(),
            self.table_version,
            p.assumed_alignment()
        ));
        out.push_str(&format!("features:        {}\n", p.features()));
        out.push_str(&format!("stamp:           {}\n", self.stamp));
        out.push_str(&format!("digest:          {}\n", self.digest));
        out
    }
}

pub fn render_tables(resolver: &Resolver) -> String {
    let mut out = format!("alignment table v{}\n", AlignmentTable::VERSION);
    for row in resolver.alignment.rows() {
        let scope = row
            .toolchain
            .map(|t| t.to_string())
            .unwrap_or_else(|| "*".to_string());
        out.push_str(&format!(
            "  {:<6} {:>2}-bit {:<7} irrelevant_bits={}\n",
            scope, row.pointer_width, row.build_mode, row.irrelevant_bits
        ));
    }
    out.push_str("feature rules\n");
    for rule in resolver.features.rules() {
        out.push_str(&format!(
            "  {:<6} {:<22} >= {}\n",
            rule.toolchain,
            rule.feature.name(),
            rule.min_version
        ));
    }
    if let Some(bits) = resolver.overrides.irrelevant_bits {
        out.push_str(&format!("override: irrelevant_bits={}\n", bits));
    }
    for (feature, on) in &resolver.overrides.features {
        out.push_str(&format!("override: {}={}\n", feature.name(), on));
    }
    out
}
