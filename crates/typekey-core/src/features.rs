//! Toolchain feature flags consumed by the code-generation layer.
//!
//! Internally this uses a `u32` bitmask. Up to 32 features can be modeled
//! without changing the representation.
//!
//! Availability is data: a `FeatureRules` table maps (toolchain family,
//! feature) to the minimum toolchain version that supports it. Anything the
//! table cannot vouch for is reported as unavailable.

use std::fmt;
use typekey_target::toolchain::{Toolchain, ToolchainFamily};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum Feature {
    Alignof = 0,
    Alloca = 1,
    /// Defaulted and deleted function declarations.
    DefaultedDeletedFns = 2,
    FuncName = 3,
    /// No-exceptions-escape annotation.
    Noexcept = 4,
    Nullptr = 5,
    RvalueRefs = 6,
    StaticAssert = 7,
    /// Stack-scoped dynamic-size arrays.
    Vla = 8,
}

impl Feature {
    #[inline]
    pub fn bit(self) -> u32 {
        1u32 << (self as u8)
    }

    pub fn name(self) -> &'static str {
        match self {
            Feature::Alignof => "alignof",
            Feature::Alloca => "alloca",
            Feature::DefaultedDeletedFns => "defaulted_deleted_fns",
            Feature::FuncName => "func_name",
            Feature::Noexcept => "noexcept",
            Feature::Nullptr => "nullptr",
            Feature::RvalueRefs => "rvalue_refs",
            Feature::StaticAssert => "static_assert",
            Feature::Vla => "vla",
        }
    }

    pub fn from_name(name: &str) -> Option<Feature> {
        ALL_FEATURES.iter().copied().find(|f| f.name() == name)
    }
}

/// All known features, in discriminant order.
pub const ALL_FEATURES: &[Feature] = &[
    Feature::Alignof,
    Feature::Alloca,
    Feature::DefaultedDeletedFns,
    Feature::FuncName,
    Feature::Noexcept,
    Feature::Nullptr,
    Feature::RvalueRefs,
    Feature::StaticAssert,
    Feature::Vla,
];

/// A set of available features.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FeatureSet {
    mask: u32,
}

impl FeatureSet {
    pub const fn empty() -> Self {
        Self { mask: 0 }
    }

    pub fn from_features(features: impl IntoIterator<Item = Feature>) -> Self {
        let mut set = Self::empty();
        for f in features {
            set.insert(f);
        }
        set
    }

    #[inline]
    pub fn contains(&self, f: Feature) -> bool {
        (self.mask & f.bit()) != 0
    }

    #[inline]
    pub fn insert(&mut self, f: Feature) {
        self.mask |= f.bit();
    }

    #[inline]
    pub fn remove(&mut self, f: Feature) {
        self.mask &= !f.bit();
    }

    #[inline]
    pub fn set(&mut self, f: Feature, on: bool) {
        if on {
            self.insert(f)
        } else {
            self.remove(f)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }

    pub fn len(&self) -> usize {
        self.mask.count_ones() as usize
    }

    /// Iterate present features in discriminant order.
    pub fn iter(&self) -> impl Iterator<Item = Feature> {
        let mask = self.mask;
        ALL_FEATURES
            .iter()
            .copied()
            .filter(move |f| (mask & f.bit()) != 0)
    }
}

impl fmt::Debug for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, feat) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", feat.name())?;
        }
        write!(f, "}}")
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for FeatureSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

/// `feature` is available on `family` from `min_version` onwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureRule {
    pub toolchain: ToolchainFamily,
    pub feature: Feature,
    pub min_version: u32,
}

/// Version thresholds per toolchain family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureRules {
    rules: Vec<FeatureRule>,
}

impl Default for FeatureRules {
    fn default() -> Self {
        Self::documented()
    }
}

impl FeatureRules {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Thresholds recorded for MSVC (`_MSC_VER` numbering). `Vla` has no
    /// row: it is only ever enabled through an explicit override.
    pub fn documented() -> Self {
        use Feature::*;
        let msvc = |feature, min_version| FeatureRule {
            toolchain: ToolchainFamily::Msvc,
            feature,
            min_version,
        };
        Self {
            rules: vec![
                msvc(Alloca, 1400),
                msvc(Nullptr, 1600),
                msvc(RvalueRefs, 1600),
                msvc(StaticAssert, 1600),
                msvc(Alignof, 1700),
                msvc(DefaultedDeletedFns, 1800),
                msvc(FuncName, 1900),
                msvc(Noexcept, 1900),
            ],
        }
    }

    /// Add a rule. A later rule for the same (family, feature) replaces the
    /// earlier one.
    pub fn push(&mut self, rule: FeatureRule) {
        self.rules
            .retain(|r| !(r.toolchain == rule.toolchain && r.feature == rule.feature));
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[FeatureRule] {
        &self.rules
    }

    pub fn covers(&self, family: ToolchainFamily) -> bool {
        self.rules.iter().any(|r| r.toolchain == family)
    }

    /// Features available on `toolchain`. An unknown version yields the
    /// empty set.
    pub fn evaluate(&self, toolchain: &Toolchain) -> FeatureSet {
        let Some(version) = toolchain.version else {
            return FeatureSet::empty();
        };
        FeatureSet::from_features(
            self.rules
                .iter()
                .filter(|r| r.toolchain == toolchain.family && version >= r.min_version)
                .map(|r| r.feature),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msvc_2010_has_nullptr_but_not_noexcept() {
        let set = FeatureRules::documented().evaluate(&Toolchain::new(ToolchainFamily::Msvc, 1600));
        assert!(set.contains(Feature::Nullptr));
        assert!(set.contains(Feature::RvalueRefs));
        assert!(set.contains(Feature::StaticAssert));
        assert!(set.contains(Feature::Alloca));
        assert!(!set.contains(Feature::Alignof));
        assert!(!set.contains(Feature::Noexcept));
    }

    #[test]
    fn msvc_2015_has_everything_but_vla() {
        let set = FeatureRules::documented().evaluate(&Toolchain::new(ToolchainFamily::Msvc, 1900));
        assert_eq!(set.len(), ALL_FEATURES.len() - 1);
        assert!(!set.contains(Feature::Vla));
    }

    #[test]
    fn unknown_version_is_conservative() {
        let set = FeatureRules::documented().evaluate(&Toolchain::unversioned(ToolchainFamily::Msvc));
        assert!(set.is_empty());
    }

    #[test]
    fn uncovered_family_is_conservative() {
        let rules = FeatureRules::documented();
        assert!(!rules.covers(ToolchainFamily::Gcc));
        assert!(rules.evaluate(&Toolchain::new(ToolchainFamily::Gcc, 1300)).is_empty());
    }

    #[test]
    fn pushed_rule_replaces_existing() {
        let mut rules = FeatureRules::documented();
        rules.push(FeatureRule {
            toolchain: ToolchainFamily::Msvc,
            feature: Feature::Noexcept,
            min_version: 1700,
        });
        let set = rules.evaluate(&Toolchain::new(ToolchainFamily::Msvc, 1800));
        assert!(set.contains(Feature::Noexcept));
        assert_eq!(
            rules.rules().iter().filter(|r| r.feature == Feature::Noexcept).count(),
            1
        );
    }

    #[test]
    fn set_display_in_discriminant_order() {
        let set = FeatureSet::from_features([Feature::Vla, Feature::Alignof]);
        assert_eq!(set.to_string(), "{alignof, vla}");
        assert_eq!(Feature::from_name("defaulted_deleted_fns"), Some(Feature::DefaultedDeletedFns));
    }
}
