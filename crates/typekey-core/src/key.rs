//! Dispatch key derivation.
//!
//! A key is the type-identity address with its irrelevant low bits shifted
//! out. One shift, no multiply, no memory access.

use std::fmt;

use typekey_target::target::PointerWidth;

use crate::identity::TypeIdentityPtr;
use crate::profile::{CapabilityProfile, ProfileStamp};

/// Errors from key derivation and key comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyError {
    /// Caller passed a null type-identity pointer
    NullIdentity,
    /// Address does not fit the profile's pointer width
    AddressOutOfRange { addr: u64, width: PointerWidth },
    /// Key derived under a different profile
    ProfileMismatch {
        expected: ProfileStamp,
        found: ProfileStamp,
    },
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyError::NullIdentity => write!(f, "null type-identity pointer"),
            KeyError::AddressOutOfRange { addr, width } => {
                write!(f, "address {:#x} does not fit in {} bits", addr, width)
            }
            KeyError::ProfileMismatch { expected, found } => write!(
                f,
                "dispatch key derived under profile {} used where {} is required",
                found, expected
            ),
        }
    }
}

impl std::error::Error for KeyError {}

/// Compact per-type lookup key, tagged with the profile it came from.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatchKey {
    value: u64,
    stamp: ProfileStamp,
}

impl DispatchKey {
    #[inline]
    pub fn value(self) -> u64 {
        self.value
    }

    #[inline]
    pub fn stamp(self) -> ProfileStamp {
        self.stamp
    }

    /// Compare two keys, refusing keys from different profiles.
    pub fn try_eq(self, other: DispatchKey) -> Result<bool, KeyError> {
        if self.stamp != other.stamp {
            return Err(KeyError::ProfileMismatch {
                expected: self.stamp,
                found: other.stamp,
            });
        }
        Ok(self.value == other.value)
    }
}

impl fmt::Debug for DispatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}@{}", self.value, self.stamp)
    }
}

impl fmt::Display for DispatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.value)
    }
}

/// Hot-path form of a profile: just the shift, the width limit and the stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyDeriver {
    shift: u32,
    width: PointerWidth,
    stamp: ProfileStamp,
}

impl KeyDeriver {
    pub fn new(profile: &CapabilityProfile) -> Self {
        Self {
            shift: profile.irrelevant_bits(),
            width: profile.pointer_width(),
            stamp: profile.stamp(),
        }
    }

    pub fn stamp(&self) -> ProfileStamp {
        self.stamp
    }

    #[inline]
    pub fn derive(&self, ptr: TypeIdentityPtr) -> Result<DispatchKey, KeyError> {
        let addr = ptr.addr();
        if addr == 0 {
            return Err(KeyError::NullIdentity);
        }
        if addr > self.width.max_addr() {
            return Err(KeyError::AddressOutOfRange {
                addr,
                width: self.width,
            });
        }
        Ok(DispatchKey {
            value: addr >> self.shift,
            stamp: self.stamp,
        })
    }
}

/// Key for `ptr` under `profile`.
#[inline]
pub fn derive_key(ptr: TypeIdentityPtr, profile: &CapabilityProfile) -> Result<DispatchKey, KeyError> {
    KeyDeriver::new(profile).derive(ptr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use typekey_target::target::BuildMode;

    #[test]
    fn shifts_out_irrelevant_bits() {
        let p = CapabilityProfile::synthetic(PointerWidth::W64, BuildMode::Release, 4);
        let k = derive_key(TypeIdentityPtr::from_addr(0x00007ffa1b2c3450), &p).unwrap();
        assert_eq!(k.value(), 0x7ffa1b2c345);
    }

    #[test]
    fn null_is_rejected() {
        let p = CapabilityProfile::synthetic(PointerWidth::W32, BuildMode::Debug, 2);
        assert_eq!(derive_key(TypeIdentityPtr::NULL, &p), Err(KeyError::NullIdentity));
    }

    #[test]
    fn wide_address_rejected_under_32_bit_profile() {
        let p = CapabilityProfile::synthetic(PointerWidth::W32, BuildMode::Release, 3);
        let err = derive_key(TypeIdentityPtr::from_addr(0x1_0000_0000), &p).unwrap_err();
        assert!(matches!(err, KeyError::AddressOutOfRange { .. }));
        let ok = derive_key(TypeIdentityPtr::from_addr(0xffff_fff8), &p).unwrap();
        assert_eq!(ok.value(), 0x1fff_ffff);
    }

    #[test]
    fn try_eq_refuses_foreign_profile() {
        let debug = CapabilityProfile::synthetic(PointerWidth::W64, BuildMode::Debug, 3);
        let release = CapabilityProfile::synthetic(PointerWidth::W64, BuildMode::Release, 4);
        let ptr = TypeIdentityPtr::from_addr(0x1000);
        let a = derive_key(ptr, &debug).unwrap();
        let b = derive_key(ptr, &release).unwrap();
        assert!(matches!(a.try_eq(b), Err(KeyError::ProfileMismatch { .. })));
        assert_eq!(a.try_eq(a), Ok(true));
        assert_ne!(a, b);
    }
}
