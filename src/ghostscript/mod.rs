//! Ghostscript integration: profile resolution, executable detection,
//! and the compression executor.

pub mod executor;

use std::fmt;
use std::path::{Path, PathBuf};

/// Compression profile selected by the caller.
///
/// The names describe the output quality: `Low` selects the engine's
/// maximum-compression preset, `High` its highest-fidelity preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Low,
    Medium,
    High,
}

/// Unrecognized profile name
#[derive(Debug, Clone, thiserror::Error)]
#[error("unrecognized compression profile: {0}")]
pub struct InvalidProfile(pub String);

impl Profile {
    /// Resolve a caller-supplied profile name. Absent input defaults to
    /// `Medium`; names are case-sensitive.
    pub fn resolve(input: Option<&str>) -> Result<Self, InvalidProfile> {
        match input {
            None => Ok(Profile::Medium),
            Some("low") => Ok(Profile::Low),
            Some("medium") => Ok(Profile::Medium),
            Some("high") => Ok(Profile::High),
            Some(other) => Err(InvalidProfile(other.to_string())),
        }
    }

    /// The `-dPDFSETTINGS` preset this profile maps to
    pub fn preset(&self) -> &'static str {
        match self {
            Profile::Low => "/screen",
            Profile::Medium => "/ebook",
            Profile::High => "/printer",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Low => "low",
            Profile::Medium => "medium",
            Profile::High => "high",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candidate command names probed when no executable is configured
const CANDIDATE_COMMANDS: &[&str] = &["gs", "gswin64c", "gswin32c"];

/// Locate the Ghostscript executable.
///
/// A configured value containing a path separator is checked directly;
/// a bare command name is searched on the PATH. With no configured value,
/// the known candidate names are probed in order.
pub fn detect_executable(configured: Option<&str>) -> Option<PathBuf> {
    if let Some(command) = configured {
        let candidate = Path::new(command);
        if candidate.components().count() > 1 {
            return is_executable(candidate).then(|| candidate.to_path_buf());
        }
        return search_path(command);
    }

    CANDIDATE_COMMANDS
        .iter()
        .find_map(|command| search_path(command))
}

fn search_path(command: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(command))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some("low"), Profile::Low)]
    #[case(Some("medium"), Profile::Medium)]
    #[case(Some("high"), Profile::High)]
    #[case(None, Profile::Medium)]
    fn test_resolve_recognized_profiles(
        #[case] input: Option<&str>,
        #[case] expected: Profile,
    ) {
        assert_eq!(Profile::resolve(input).unwrap(), expected);
    }

    #[rstest]
    #[case("LOW")]
    #[case("Medium")]
    #[case("maximum")]
    #[case("")]
    #[case(" medium ")]
    fn test_resolve_rejects_unknown_profiles(#[case] input: &str) {
        let error = Profile::resolve(Some(input)).unwrap_err();
        assert_eq!(error.0, input);
    }

    #[test]
    fn test_presets_are_distinct() {
        let presets = [
            Profile::Low.preset(),
            Profile::Medium.preset(),
            Profile::High.preset(),
        ];
        assert_eq!(presets, ["/screen", "/ebook", "/printer"]);
    }

    #[test]
    fn test_display_matches_wire_name() {
        assert_eq!(Profile::Low.to_string(), "low");
        assert_eq!(Profile::Medium.to_string(), "medium");
        assert_eq!(Profile::High.to_string(), "high");
    }

    #[test]
    fn test_detect_executable_missing_path_is_none() {
        assert!(detect_executable(Some("/nonexistent/dir/gs-missing")).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_detect_executable_finds_configured_path() {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("gs");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let detected = detect_executable(Some(path.to_str().unwrap()));
        assert_eq!(detected, Some(path));
    }
}
