//! Profile-bound key storage.
//!
//! Dispatch tables key their entries by [`DispatchKey`] value. Values from
//! two profiles live in unrelated key spaces, so every slot map is bound to
//! one [`ProfileStamp`] and turns away keys carrying any other.

use std::collections::HashMap;

use crate::key::{DispatchKey, KeyError};
use crate::profile::{CapabilityProfile, ProfileStamp};

#[derive(Debug, Clone)]
pub struct KeySlots<V> {
    stamp: ProfileStamp,
    slots: HashMap<u64, V>,
}

impl<V> KeySlots<V> {
    pub fn new(profile: &CapabilityProfile) -> Self {
        Self::for_stamp(profile.stamp())
    }

    pub fn for_stamp(stamp: ProfileStamp) -> Self {
        Self {
            stamp,
            slots: HashMap::new(),
        }
    }

    pub fn stamp(&self) -> ProfileStamp {
        self.stamp
    }

    fn check(&self, key: DispatchKey) -> Result<u64, KeyError> {
        if key.stamp() != self.stamp {
            return Err(KeyError::ProfileMismatch {
                expected: self.stamp,
                found: key.stamp(),
            });
        }
        Ok(key.value())
    }

    /// Returns the previous value stored under `key`.
    pub fn insert(&mut self, key: DispatchKey, value: V) -> Result<Option<V>, KeyError> {
        let k = self.check(key)?;
        Ok(self.slots.insert(k, value))
    }

    pub fn get(&self, key: DispatchKey) -> Result<Option<&V>, KeyError> {
        let k = self.check(key)?;
        Ok(self.slots.get(&k))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::TypeIdentityPtr;
    use crate::key::derive_key;
    use typekey_target::target::{BuildMode, PointerWidth};

    #[test]
    fn stores_and_finds_same_profile_keys() {
        let p = CapabilityProfile::synthetic(PointerWidth::W64, BuildMode::Release, 4);
        let mut slots = KeySlots::new(&p);
        let k = derive_key(TypeIdentityPtr::from_addr(0x4000), &p).unwrap();
        assert_eq!(slots.insert(k, "circle"), Ok(None));
        assert_eq!(slots.get(k), Ok(Some(&"circle")));
        assert_eq!(slots.insert(k, "disc"), Ok(Some("circle")));
        assert_eq!(slots.len(), 1);
    }

    #[test]
    fn rejects_keys_from_other_profile() {
        let debug = CapabilityProfile::synthetic(PointerWidth::W64, BuildMode::Debug, 3);
        let release = CapabilityProfile::synthetic(PointerWidth::W64, BuildMode::Release, 4);
        let mut slots = KeySlots::new(&release);
        let foreign = derive_key(TypeIdentityPtr::from_addr(0x4000), &debug).unwrap();
        assert!(matches!(slots.insert(foreign, 1), Err(KeyError::ProfileMismatch { .. })));
        assert!(matches!(slots.get(foreign), Err(KeyError::ProfileMismatch { .. })));
        assert!(slots.is_empty());
    }
}
