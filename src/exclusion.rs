//! Pattern-based exclusion of files from team manifests

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fmt;
use std::path::Path;

/// Hidden per-team directory owned by the engine
pub const STATE_DIR: &str = ".teamsync";

/// Suffix of files still being received
pub const TMP_SUFFIX: &str = ".teamsync-tmp";

#[derive(Debug)]
pub enum ExclusionError {
	InvalidPattern(String),
}

impl fmt::Display for ExclusionError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ExclusionError::InvalidPattern(msg) => write!(f, "Invalid exclusion pattern: {}", msg),
		}
	}
}

impl std::error::Error for ExclusionError {}

/// Matcher over team-relative, slash-separated paths
#[derive(Debug, Clone)]
pub struct PatternMatcher {
	/// Built-in patterns, always applied
	always_exclude: GlobSet,

	/// User-configured patterns
	exclude_set: GlobSet,
}

impl PatternMatcher {
	pub fn new(exclude_patterns: &[String]) -> Result<Self, ExclusionError> {
		let always_exclude = Self::build_always_excluded()?;
		let exclude_set = Self::build_glob_set(exclude_patterns)?;
		Ok(Self { always_exclude, exclude_set })
	}

	fn build_always_excluded() -> Result<GlobSet, ExclusionError> {
		let patterns = [
			format!("{}/**", STATE_DIR),
			format!("**/*{}", TMP_SUFFIX),
			".Trash-*/**".to_string(),
			"lost+found/**".to_string(),
			"**/.DS_Store".to_string(),
			"**/Thumbs.db".to_string(),
			"**/desktop.ini".to_string(),
			"**/*.swp".to_string(),
			"**/.nfs*".to_string(),
		];
		Self::build_glob_set(&patterns)
	}

	fn build_glob_set(patterns: &[String]) -> Result<GlobSet, ExclusionError> {
		let mut builder = GlobSetBuilder::new();
		for pattern in patterns {
			let glob = Glob::new(pattern)
				.map_err(|e| ExclusionError::InvalidPattern(format!("{}: {}", pattern, e)))?;
			builder.add(glob);
		}
		builder.build().map_err(|e| {
			ExclusionError::InvalidPattern(format!("Failed to build pattern set: {}", e))
		})
	}

	pub fn is_excluded(&self, path: &Path) -> bool {
		self.always_exclude.is_match(path) || self.exclude_set.is_match(path)
	}
}

impl Default for PatternMatcher {
	fn default() -> Self {
		// Empty user set always compiles
		Self {
			always_exclude: Self::build_always_excluded().unwrap_or_else(|_| GlobSet::empty()),
			exclude_set: GlobSet::empty(),
		}
	}
}


// vim: ts=4
