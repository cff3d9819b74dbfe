#![deny(unused_must_use)]
#![warn(clippy::dbg_macro, clippy::todo, clippy::unimplemented)]
#![forbid(unsafe_code)]

pub mod alignment;
pub mod features;
pub mod identity;
mod key;
pub mod probe;
mod profile;
mod slots;

pub use alignment::{AlignmentRow, AlignmentTable};
pub use features::{Feature, FeatureRule, FeatureRules, FeatureSet};
pub use identity::{TypeIdentity, TypeIdentityPtr};
pub use key::{derive_key, DispatchKey, KeyDeriver, KeyError};
pub use profile::{
    host_profile, resolve_capability_profile, CapabilityProfile, Overrides, ProfileStamp,
    ResolveError, Resolver,
};
pub use slots::KeySlots;

// Target vocabulary, so dependents need only this crate.
pub use typekey_target::target::{BuildMode, PointerWidth, TargetDescription, TargetParseError};
pub use typekey_target::toolchain::{Toolchain, ToolchainFamily};
