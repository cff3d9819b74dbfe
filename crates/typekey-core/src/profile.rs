//! Capability profile resolution.
//!
//! A profile is resolved once from a [`TargetDescription`] and is immutable
//! afterwards. Everything downstream (key derivation, code generation)
//! receives it explicitly.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use tracing::{debug, warn};
use typekey_target::target::{BuildMode, PointerWidth, TargetDescription};
use typekey_target::toolchain::Toolchain;

use crate::alignment::AlignmentTable;
use crate::features::{Feature, FeatureRules, FeatureSet};

/// Resolved, immutable target facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CapabilityProfile {
    toolchain: Toolchain,
    pointer_width: PointerWidth,
    build_mode: BuildMode,
    irrelevant_bits: u32,
    features: FeatureSet,
}

impl CapabilityProfile {
    /// Build a profile without consulting any table. Meant for tests and for
    /// adopters that measured their own target.
    ///
    /// # Panics
    /// Panics if `irrelevant_bits` is not smaller than the pointer width.
    pub fn synthetic(pointer_width: PointerWidth, build_mode: BuildMode, irrelevant_bits: u32) -> Self {
        assert!(
            irrelevant_bits < pointer_width.bits(),
            "irrelevant_bits must be smaller than the pointer width"
        );
        Self {
            toolchain: Toolchain::unversioned(typekey_target::toolchain::ToolchainFamily::Rustc),
            pointer_width,
            build_mode,
            irrelevant_bits,
            features: FeatureSet::empty(),
        }
    }

    /// Same target, different bit count. The result has its own stamp, so its
    /// keys never mix with keys of `self`.
    pub fn with_irrelevant_bits(self, irrelevant_bits: u32) -> Result<Self, ResolveError> {
        check_bits(irrelevant_bits, self.pointer_width)?;
        Ok(Self {
            irrelevant_bits,
            ..self
        })
    }

    pub fn toolchain(&self) -> Toolchain {
        self.toolchain
    }

    pub fn pointer_width(&self) -> PointerWidth {
        self.pointer_width
    }

    pub fn build_mode(&self) -> BuildMode {
        self.build_mode
    }

    pub fn irrelevant_bits(&self) -> u32 {
        self.irrelevant_bits
    }

    pub fn features(&self) -> FeatureSet {
        self.features
    }

    pub fn supports(&self, feature: Feature) -> bool {
        self.features.contains(feature)
    }

    /// Smallest alignment (in bytes) this profile assumes for identity tables.
    pub fn assumed_alignment(&self) -> u64 {
        1u64 << self.irrelevant_bits
    }

    pub fn stamp(&self) -> ProfileStamp {
        ProfileStamp::of(self.pointer_width, self.build_mode, self.irrelevant_bits)
    }
}

impl fmt::Display for CapabilityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}-bit {}: irrelevant_bits={} features={}",
            self.toolchain, self.pointer_width, self.build_mode, self.irrelevant_bits, self.features
        )
    }
}

/// Compact fingerprint of the facts that affect key derivation.
///
/// Layout: bit 0 = width (1 for 64), bit 1 = mode (1 for release),
/// bits 2.. = irrelevant bit count.
///
/// Only [`ProfileStamp::of`] builds one; a raw value cannot be passed off as
/// a stamp.
///
/// ```compile_fail
/// use typekey_core::ProfileStamp;
///
/// let forged = ProfileStamp(0x13);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ProfileStamp(u16);

impl ProfileStamp {
    pub const fn of(width: PointerWidth, mode: BuildMode, irrelevant_bits: u32) -> Self {
        let w = matches!(width, PointerWidth::W64) as u16;
        let m = matches!(mode, BuildMode::Release) as u16;
        ProfileStamp(w | (m << 1) | ((irrelevant_bits as u16) << 2))
    }

    pub fn irrelevant_bits(self) -> u32 {
        (self.0 >> 2) as u32
    }
}

impl fmt::Debug for ProfileStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for ProfileStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = if self.0 & 1 != 0 { 64 } else { 32 };
        let mode = if self.0 & 2 != 0 { "release" } else { "debug" };
        write!(f, "{}/{}>>{}", width, mode, self.irrelevant_bits())
    }
}

/// Errors raised while resolving a profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Target facts that were not supplied
    MissingParameters(Vec<&'static str>),
    /// No alignment row for this target and no override
    NoAlignmentEntry {
        toolchain: Toolchain,
        pointer_width: PointerWidth,
        build_mode: BuildMode,
    },
    /// Override would discard the whole address
    InvalidOverride {
        irrelevant_bits: u32,
        pointer_width: PointerWidth,
    },
    /// Alignment table row would discard the whole address
    InvalidTableEntry {
        irrelevant_bits: u32,
        pointer_width: PointerWidth,
        build_mode: BuildMode,
    },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::MissingParameters(names) => {
                write!(f, "cannot resolve capability profile: missing target parameter(s): {}", names.join(", "))
            }
            ResolveError::NoAlignmentEntry {
                toolchain,
                pointer_width,
                build_mode,
            } => write!(
                f,
                "no irrelevant-bit entry for {} {}-bit {}; measure the target and add a table row or set an explicit override",
                toolchain, pointer_width, build_mode
            ),
            ResolveError::InvalidOverride {
                irrelevant_bits,
                pointer_width,
            } => write!(
                f,
                "irrelevant_bits override {} must be smaller than the pointer width {}",
                irrelevant_bits, pointer_width
            ),
            ResolveError::InvalidTableEntry {
                irrelevant_bits,
                pointer_width,
                build_mode,
            } => write!(
                f,
                "alignment table row for {}-bit {} has irrelevant_bits {}, which must be smaller than the pointer width",
                pointer_width, build_mode, irrelevant_bits
            ),
        }
    }
}

impl std::error::Error for ResolveError {}

fn check_bits(irrelevant_bits: u32, width: PointerWidth) -> Result<(), ResolveError> {
    if irrelevant_bits >= width.bits() {
        return Err(ResolveError::InvalidOverride {
            irrelevant_bits,
            pointer_width: width,
        });
    }
    Ok(())
}

/// Explicit adopter decisions applied after the tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub irrelevant_bits: Option<u32>,
    pub features: BTreeMap<Feature, bool>,
}

impl Overrides {
    pub fn irrelevant_bits(mut self, bits: u32) -> Self {
        self.irrelevant_bits = Some(bits);
        self
    }

    pub fn feature(mut self, feature: Feature, on: bool) -> Self {
        self.features.insert(feature, on);
        self
    }
}

/// Tables plus overrides; turns target descriptions into profiles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolver {
    pub alignment: AlignmentTable,
    pub features: FeatureRules,
    pub overrides: Overrides,
}

impl Resolver {
    pub fn new(alignment: AlignmentTable, features: FeatureRules, overrides: Overrides) -> Self {
        Self {
            alignment,
            features,
            overrides,
        }
    }

    pub fn resolve(&self, target: &TargetDescription) -> Result<CapabilityProfile, ResolveError> {
        let mut missing = Vec::new();
        if target.pointer_width.is_none() {
            missing.push("pointer_width");
        }
        if target.build_mode.is_none() {
            missing.push("build_mode");
        }
        let (Some(pointer_width), Some(build_mode)) = (target.pointer_width, target.build_mode) else {
            return Err(ResolveError::MissingParameters(missing));
        };

        let irrelevant_bits = match self.overrides.irrelevant_bits {
            Some(bits) => {
                debug!(bits, %target, "irrelevant_bits taken from override");
                check_bits(bits, pointer_width)?;
                bits
            }
            None => {
                let bits = self
                    .alignment
                    .lookup(target.toolchain.family, pointer_width, build_mode)
                    .ok_or(ResolveError::NoAlignmentEntry {
                        toolchain: target.toolchain,
                        pointer_width,
                        build_mode,
                    })?;
                if bits >= pointer_width.bits() {
                    return Err(ResolveError::InvalidTableEntry {
                        irrelevant_bits: bits,
                        pointer_width,
                        build_mode,
                    });
                }
                bits
            }
        };

        if !self.features.covers(target.toolchain.family) {
            warn!(
                toolchain = %target.toolchain,
                "no feature rules for toolchain family; all features reported unavailable"
            );
        } else if target.toolchain.version.is_none() {
            warn!(
                toolchain = %target.toolchain,
                "toolchain version unknown; all features reported unavailable"
            );
        }

        let mut features = self.features.evaluate(&target.toolchain);
        for (&feature, &on) in &self.overrides.features {
            features.set(feature, on);
        }

        let profile = CapabilityProfile {
            toolchain: target.toolchain,
            pointer_width,
            build_mode,
            irrelevant_bits,
            features,
        };
        debug!(%profile, "resolved capability profile");
        Ok(profile)
    }
}

/// Resolve with the documented tables and no overrides.
pub fn resolve_capability_profile(target: &TargetDescription) -> Result<CapabilityProfile, ResolveError> {
    Resolver::default().resolve(target)
}

/// Profile of the running build, resolved on first use.
pub fn host_profile() -> Result<&'static CapabilityProfile, ResolveError> {
    static HOST: OnceLock<Result<CapabilityProfile, ResolveError>> = OnceLock::new();
    HOST.get_or_init(|| resolve_capability_profile(&TargetDescription::host()))
        .as_ref()
        .map_err(Clone::clone)
}
