//! Measuring identity-table alignment on a target.
//!
//! Sample type-identity addresses across many distinct types, then find the
//! largest power of two dividing all of them. That exponent is the most
//! bits a profile may discard for the target.

use std::collections::HashSet;
use std::fmt;

use crate::identity::TypeIdentityPtr;
use crate::key::KeyDeriver;
use crate::profile::CapabilityProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeError {
    /// No non-null sample to measure
    NoSamples,
    /// Profile discards bits that do discriminate between types
    OverAggressive { configured: u32, measured: u32 },
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::NoSamples => write!(f, "no usable type-identity samples"),
            ProbeError::OverAggressive { configured, measured } => write!(
                f,
                "profile discards {} bits but sampled identity tables are only aligned to {} bits; distinct types will share keys",
                configured, measured
            ),
        }
    }
}

impl std::error::Error for ProbeError {}

/// Exponent of the largest power of two dividing every non-null sample.
pub fn measure_irrelevant_bits<I>(samples: I) -> Option<u32>
where
    I: IntoIterator<Item = TypeIdentityPtr>,
{
    samples
        .into_iter()
        .filter(|p| !p.is_null())
        .map(|p| p.addr().trailing_zeros())
        .min()
}

/// How well a profile separates a set of sampled identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CollisionReport {
    /// Samples that produced a key.
    pub samples: usize,
    pub distinct_identities: usize,
    pub distinct_keys: usize,
}

impl CollisionReport {
    /// Identities that landed on a key already taken by another identity.
    pub fn collisions(&self) -> usize {
        self.distinct_identities - self.distinct_keys
    }

    pub fn collision_rate(&self) -> f64 {
        if self.distinct_identities == 0 {
            return 0.0;
        }
        self.collisions() as f64 / self.distinct_identities as f64
    }
}

impl fmt::Display for CollisionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} samples, {} distinct identities, {} distinct keys, {} collisions ({:.2}%)",
            self.samples,
            self.distinct_identities,
            self.distinct_keys,
            self.collisions(),
            self.collision_rate() * 100.0
        )
    }
}

/// Derive keys for `samples` under `profile` and count collisions.
/// Samples that cannot produce a key (null, out of range) are skipped.
pub fn collision_report<I>(samples: I, profile: &CapabilityProfile) -> CollisionReport
where
    I: IntoIterator<Item = TypeIdentityPtr>,
{
    let deriver = KeyDeriver::new(profile);
    let mut identities = HashSet::new();
    let mut keys = HashSet::new();
    let mut report = CollisionReport::default();
    for ptr in samples {
        let Ok(key) = deriver.derive(ptr) else {
            continue;
        };
        report.samples += 1;
        if identities.insert(ptr) {
            keys.insert(key.value());
        }
    }
    report.distinct_identities = identities.len();
    report.distinct_keys = keys.len();
    report
}

/// Check `profile` against measured samples. Returns the measured bit count.
pub fn audit<I>(samples: I, profile: &CapabilityProfile) -> Result<u32, ProbeError>
where
    I: IntoIterator<Item = TypeIdentityPtr>,
{
    let measured = measure_irrelevant_bits(samples).ok_or(ProbeError::NoSamples)?;
    if profile.irrelevant_bits() > measured {
        return Err(ProbeError::OverAggressive {
            configured: profile.irrelevant_bits(),
            measured,
        });
    }
    Ok(measured)
}

#[cfg(test)]
mod tests {
    use super::*;
    use typekey_target::target::{BuildMode, PointerWidth};

    fn addrs(values: &[u64]) -> Vec<TypeIdentityPtr> {
        values.iter().copied().map(TypeIdentityPtr::from_addr).collect()
    }

    #[test]
    fn measures_common_alignment() {
        assert_eq!(measure_irrelevant_bits(addrs(&[0x1000, 0x1010, 0x1030])), Some(4));
        assert_eq!(measure_irrelevant_bits(addrs(&[0x1000, 0x1008])), Some(3));
        assert_eq!(measure_irrelevant_bits(addrs(&[0, 0x40])), Some(6));
        assert_eq!(measure_irrelevant_bits(addrs(&[0])), None);
    }

    #[test]
    fn duplicate_identities_are_not_collisions() {
        let p = CapabilityProfile::synthetic(PointerWidth::W64, BuildMode::Release, 4);
        let r = collision_report(addrs(&[0x1000, 0x1000, 0x1010]), &p);
        assert_eq!(r.samples, 3);
        assert_eq!(r.distinct_identities, 2);
        assert_eq!(r.collisions(), 0);
    }

    #[test]
    fn counts_merged_identities() {
        let p = CapabilityProfile::synthetic(PointerWidth::W64, BuildMode::Release, 5);
        let r = collision_report(addrs(&[0x1000, 0x1010, 0x1020, 0x1030]), &p);
        assert_eq!(r.distinct_keys, 2);
        assert_eq!(r.collisions(), 2);
        assert!((r.collision_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn audit_flags_over_aggressive_profile() {
        let samples = addrs(&[0x2008, 0x2010]);
        let ok = CapabilityProfile::synthetic(PointerWidth::W64, BuildMode::Debug, 3);
        let bad = CapabilityProfile::synthetic(PointerWidth::W64, BuildMode::Release, 4);
        assert_eq!(audit(samples.clone(), &ok), Ok(3));
        assert_eq!(
            audit(samples, &bad),
            Err(ProbeError::OverAggressive {
                configured: 4,
                measured: 3
            })
        );
        assert_eq!(audit(Vec::new(), &ok), Err(ProbeError::NoSamples));
    }
}
