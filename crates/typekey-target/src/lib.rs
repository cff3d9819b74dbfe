pub mod toolchain {
    use serde::{Deserialize, Serialize};
    use std::fmt;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum ToolchainFamily {
        Msvc,
        Gcc,
        Clang,
        Rustc,
    }

    impl ToolchainFamily {
        pub const ALL: [ToolchainFamily; 4] = [
            ToolchainFamily::Msvc,
            ToolchainFamily::Gcc,
            ToolchainFamily::Clang,
            ToolchainFamily::Rustc,
        ];

        pub fn name(self) -> &'static str {
            match self {
                ToolchainFamily::Msvc => "msvc",
                ToolchainFamily::Gcc => "gcc",
                ToolchainFamily::Clang => "clang",
                ToolchainFamily::Rustc => "rustc",
            }
        }

        pub fn from_name(name: &str) -> Option<Self> {
            Self::ALL.into_iter().find(|f| f.name() == name)
        }
    }

    impl fmt::Display for ToolchainFamily {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.name())
        }
    }

    /// Toolchain identity. `version` uses the toolchain's own numbering
    /// (e.g. `_MSC_VER` style 1900 for MSVC).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Toolchain {
        pub family: ToolchainFamily,
        pub version: Option<u32>,
    }

    impl Toolchain {
        pub const fn new(family: ToolchainFamily, version: u32) -> Self {
            Self {
                family,
                version: Some(version),
            }
        }

        pub const fn unversioned(family: ToolchainFamily) -> Self {
            Self {
                family,
                version: None,
            }
        }
    }

    impl fmt::Display for Toolchain {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self.version {
                Some(v) => write!(f, "{}-{}", self.family, v),
                None => write!(f, "{}", self.family),
            }
        }
    }
}

pub mod target {
    use super::toolchain::{Toolchain, ToolchainFamily};
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use std::str::FromStr;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(try_from = "u32", into = "u32")]
    pub enum PointerWidth {
        W32,
        W64,
    }

    impl PointerWidth {
        pub const fn bits(self) -> u32 {
            match self {
                PointerWidth::W32 => 32,
                PointerWidth::W64 => 64,
            }
        }

        /// Largest address representable at this width.
        pub const fn max_addr(self) -> u64 {
            match self {
                PointerWidth::W32 => u32::MAX as u64,
                PointerWidth::W64 => u64::MAX,
            }
        }

        pub const fn host() -> Self {
            if cfg!(target_pointer_width = "64") {
                PointerWidth::W64
            } else {
                PointerWidth::W32
            }
        }
    }

    impl TryFrom<u32> for PointerWidth {
        type Error = String;

        fn try_from(bits: u32) -> Result<Self, Self::Error> {
            match bits {
                32 => Ok(PointerWidth::W32),
                64 => Ok(PointerWidth::W64),
                other => Err(format!("unsupported pointer width {other} (expected 32 or 64)")),
            }
        }
    }

    impl From<PointerWidth> for u32 {
        fn from(w: PointerWidth) -> u32 {
            w.bits()
        }
    }

    impl fmt::Display for PointerWidth {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.bits())
        }
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum BuildMode {
        Debug,
        Release,
    }

    impl BuildMode {
        pub const fn host() -> Self {
            if cfg!(debug_assertions) {
                BuildMode::Debug
            } else {
                BuildMode::Release
            }
        }

        pub fn name(self) -> &'static str {
            match self {
                BuildMode::Debug => "debug",
                BuildMode::Release => "release",
            }
        }
    }

    impl fmt::Display for BuildMode {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.name())
        }
    }

    /// What is known about a build target. `None` marks a fact that could
    /// not be determined; profile resolution refuses to guess it.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct TargetDescription {
        pub toolchain: Toolchain,
        pub pointer_width: Option<PointerWidth>,
        pub build_mode: Option<BuildMode>,
    }

    impl TargetDescription {
        pub const fn new(toolchain: Toolchain, pointer_width: PointerWidth, build_mode: BuildMode) -> Self {
            Self {
                toolchain,
                pointer_width: Some(pointer_width),
                build_mode: Some(build_mode),
            }
        }

        /// The build this code was compiled as.
        pub const fn host() -> Self {
            Self::new(
                Toolchain::unversioned(ToolchainFamily::Rustc),
                PointerWidth::host(),
                BuildMode::host(),
            )
        }
    }

    impl fmt::Display for TargetDescription {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}/", self.toolchain)?;
            match self.pointer_width {
                Some(w) => write!(f, "{}/", w)?,
                None => write!(f, "?/")?,
            }
            match self.build_mode {
                Some(m) => write!(f, "{}", m),
                None => write!(f, "?"),
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum TargetParseError {
        /// Wrong number of `/`-separated components
        Shape { input: String },
        UnknownToolchain { name: String },
        BadVersion { text: String },
        BadWidth { text: String },
        BadMode { text: String },
    }

    impl fmt::Display for TargetParseError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                TargetParseError::Shape { input } => write!(
                    f,
                    "malformed target '{}': expected <toolchain>[-<version>]/<width>/<mode> or 'host'",
                    input
                ),
                TargetParseError::UnknownToolchain { name } => {
                    write!(f, "unknown toolchain '{}' (expected msvc, gcc, clang or rustc)", name)
                }
                TargetParseError::BadVersion { text } => {
                    write!(f, "toolchain version '{}' is not a number", text)
                }
                TargetParseError::BadWidth { text } => {
                    write!(f, "pointer width '{}' must be 32, 64 or ?", text)
                }
                TargetParseError::BadMode { text } => {
                    write!(f, "build mode '{}' must be debug, release or ?", text)
                }
            }
        }
    }

    impl std::error::Error for TargetParseError {}

    impl FromStr for TargetDescription {
        type Err = TargetParseError;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            let s = s.trim();
            if s == "host" {
                return Ok(Self::host());
            }

            let parts: Vec<&str> = s.split('/').collect();
            let [tc, width, mode] = parts.as_slice() else {
                return Err(TargetParseError::Shape { input: s.to_string() });
            };

            let toolchain = parse_toolchain(tc)?;

            let pointer_width = match *width {
                "?" => None,
                "32" => Some(PointerWidth::W32),
                "64" => Some(PointerWidth::W64),
                other => {
                    return Err(TargetParseError::BadWidth {
                        text: other.to_string(),
                    })
                }
            };

            let build_mode = match *mode {
                "?" => None,
                "debug" => Some(BuildMode::Debug),
                "release" => Some(BuildMode::Release),
                other => {
                    return Err(TargetParseError::BadMode {
                        text: other.to_string(),
                    })
                }
            };

            Ok(Self {
                toolchain,
                pointer_width,
                build_mode,
            })
        }
    }

    fn parse_toolchain(text: &str) -> Result<Toolchain, TargetParseError> {
        let (name, version) = match text.split_once('-') {
            Some((name, v)) => {
                let version = v.parse::<u32>().map_err(|_| TargetParseError::BadVersion {
                    text: v.to_string(),
                })?;
                (name, Some(version))
            }
            None => (text, None),
        };
        let family = ToolchainFamily::from_name(name).ok_or_else(|| TargetParseError::UnknownToolchain {
            name: name.to_string(),
        })?;
        Ok(Toolchain { family, version })
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn parses_full_description() {
            let t: TargetDescription = "msvc-1900/64/release".parse().unwrap();
            assert_eq!(t.toolchain, Toolchain::new(ToolchainFamily::Msvc, 1900));
            assert_eq!(t.pointer_width, Some(PointerWidth::W64));
            assert_eq!(t.build_mode, Some(BuildMode::Release));
        }

        #[test]
        fn unknown_facts_stay_unknown() {
            let t: TargetDescription = "gcc/?/?".parse().unwrap();
            assert_eq!(t.toolchain.version, None);
            assert_eq!(t.pointer_width, None);
            assert_eq!(t.build_mode, None);
        }

        #[test]
        fn host_keyword() {
            let t: TargetDescription = "host".parse().unwrap();
            assert_eq!(t, TargetDescription::host());
            assert_eq!(t.toolchain.family, ToolchainFamily::Rustc);
        }

        #[test]
        fn display_parses_back() {
            let t: TargetDescription = "clang-15/32/debug".parse().unwrap();
            assert_eq!(t.to_string(), "clang-15/32/debug");
            let u: TargetDescription = "rustc/?/release".parse().unwrap();
            assert_eq!(u.to_string().parse::<TargetDescription>().unwrap(), u);
        }

        #[test]
        fn errors_name_the_component() {
            assert!(matches!(
                "msvc/16/debug".parse::<TargetDescription>(),
                Err(TargetParseError::BadWidth { .. })
            ));
            assert!(matches!(
                "msvc/64/fast".parse::<TargetDescription>(),
                Err(TargetParseError::BadMode { .. })
            ));
            assert!(matches!(
                "icc/64/debug".parse::<TargetDescription>(),
                Err(TargetParseError::UnknownToolchain { .. })
            ));
            assert!(matches!(
                "msvc-x/64/debug".parse::<TargetDescription>(),
                Err(TargetParseError::BadVersion { .. })
            ));
            assert!(matches!(
                "msvc/64".parse::<TargetDescription>(),
                Err(TargetParseError::Shape { .. })
            ));
        }

        #[test]
        fn pointer_width_serializes_as_number() {
            assert_eq!(PointerWidth::try_from(32), Ok(PointerWidth::W32));
            assert!(PointerWidth::try_from(16).is_err());
            assert_eq!(u32::from(PointerWidth::W64), 64);
        }
    }
}
