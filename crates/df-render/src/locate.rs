//! Finding the Graphviz `dot` executable.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::config::RenderConfig;
use crate::process::probe;

const PROBE_FLAG: &str = "-V";
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Process environment read once, up front.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeEnvironment {
    /// Value of the configured override variable.
    pub override_path: Option<PathBuf>,
    /// Entries of `PATH`, in order.
    pub search_path: Vec<PathBuf>,
    pub current_dir: Option<PathBuf>,
}

impl ProbeEnvironment {
    /// Snapshot the live process environment.
    #[must_use]
    pub fn capture(config: &RenderConfig) -> Self {
        Self::from_vars(
            env::var_os(&config.override_env),
            env::var_os("PATH"),
            env::current_dir().ok(),
        )
    }

    #[must_use]
    pub fn from_vars(
        override_value: Option<OsString>,
        path_value: Option<OsString>,
        current_dir: Option<PathBuf>,
    ) -> Self {
        let override_path = override_value
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        let search_path = path_value
            .map(|value| env::split_paths(&value).collect())
            .unwrap_or_default();
        Self {
            override_path,
            search_path,
            current_dir,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoverySource {
    Configured,
    EnvironmentOverride,
    SearchPath,
    WellKnown,
    Bundled,
}

impl DiscoverySource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configured => "configured",
            Self::EnvironmentOverride => "environment-override",
            Self::SearchPath => "search-path",
            Self::WellKnown => "well-known",
            Self::Bundled => "bundled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocatedExecutable {
    pub path: PathBuf,
    pub source: DiscoverySource,
}

/// One place the locator looked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryCandidate {
    pub path: PathBuf,
    pub source: DiscoverySource,
}

/// Which discovery steps a strategy uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryScope {
    /// Configured path, override, `PATH`, well-known paths, bundled copies.
    #[default]
    Full,
    /// Configured path, override and `PATH` only.
    Narrow,
}

#[derive(Debug, Clone)]
pub struct ExecutableLocator {
    file_name: String,
    configured: Option<PathBuf>,
    environment: ProbeEnvironment,
    well_known_paths: Vec<PathBuf>,
    bundled_dirs: Vec<PathBuf>,
    walk_depth: usize,
    scope: DiscoveryScope,
}

impl ExecutableLocator {
    #[must_use]
    pub fn new(config: &RenderConfig, environment: &ProbeEnvironment) -> Self {
        Self {
            file_name: config.program_file_name(),
            configured: config.executable.clone(),
            environment: environment.clone(),
            well_known_paths: config.well_known_paths.clone(),
            bundled_dirs: config.bundled_dirs.clone(),
            walk_depth: config.walk_depth,
            scope: DiscoveryScope::Full,
        }
    }

    #[must_use]
    pub fn with_scope(mut self, scope: DiscoveryScope) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub fn scope(&self) -> DiscoveryScope {
        self.scope
    }

    /// Every path the locator would consider, in search order.
    #[must_use]
    pub fn candidates(&self) -> Vec<DiscoveryCandidate> {
        let mut candidates = Vec::new();
        let mut push = |path: PathBuf, source| candidates.push(DiscoveryCandidate { path, source });

        if let Some(path) = &self.configured {
            push(path.clone(), DiscoverySource::Configured);
        }
        if let Some(path) = &self.environment.override_path {
            push(path.clone(), DiscoverySource::EnvironmentOverride);
        }
        for dir in &self.environment.search_path {
            push(dir.join(&self.file_name), DiscoverySource::SearchPath);
        }
        if self.scope == DiscoveryScope::Narrow {
            return candidates;
        }

        for path in &self.well_known_paths {
            push(path.clone(), DiscoverySource::WellKnown);
        }
        if let Some(start) = &self.environment.current_dir {
            for ancestor in start.ancestors().take(self.walk_depth + 1) {
                for dir in &self.bundled_dirs {
                    push(
                        ancestor.join(dir).join(&self.file_name),
                        DiscoverySource::Bundled,
                    );
                }
            }
        }
        candidates
    }

    /// First usable candidate. Well-known paths must also answer `-V`.
    #[must_use]
    pub fn locate(&self) -> Option<LocatedExecutable> {
        for candidate in self.candidates() {
            if !is_executable_file(&candidate.path) {
                continue;
            }
            if candidate.source == DiscoverySource::WellKnown
                && !probe(&candidate.path, PROBE_FLAG, PROBE_TIMEOUT)
            {
                debug!(path = %candidate.path.display(), "well-known executable failed probe");
                continue;
            }
            debug!(
                path = %candidate.path.display(),
                source = candidate.source.as_str(),
                "located graphviz executable"
            );
            return Some(LocatedExecutable {
                path: candidate.path,
                source: candidate.source,
            });
        }
        debug!(file_name = %self.file_name, "graphviz executable not found");
        None
    }
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;
    use std::path::PathBuf;

    use super::{DiscoveryScope, DiscoverySource, ExecutableLocator, ProbeEnvironment};
    use crate::config::RenderConfig;

    fn config() -> RenderConfig {
        RenderConfig {
            executable: Some(PathBuf::from("/opt/custom/dot")),
            well_known_paths: vec![PathBuf::from("/usr/bin/dot")],
            bundled_dirs: vec![PathBuf::from("graphviz/bin")],
            walk_depth: 1,
            ..RenderConfig::default()
        }
    }

    fn environment() -> ProbeEnvironment {
        ProbeEnvironment {
            override_path: Some(PathBuf::from("/env/dot")),
            search_path: vec![PathBuf::from("/a"), PathBuf::from("/b")],
            current_dir: Some(PathBuf::from("/work/project")),
        }
    }

    #[test]
    fn candidates_follow_search_order() {
        let locator = ExecutableLocator::new(&config(), &environment());
        let sources: Vec<DiscoverySource> = locator
            .candidates()
            .into_iter()
            .map(|candidate| candidate.source)
            .collect();
        assert_eq!(
            sources,
            vec![
                DiscoverySource::Configured,
                DiscoverySource::EnvironmentOverride,
                DiscoverySource::SearchPath,
                DiscoverySource::SearchPath,
                DiscoverySource::WellKnown,
                DiscoverySource::Bundled,
                DiscoverySource::Bundled,
            ]
        );
    }

    #[test]
    fn bundled_walk_visits_ancestors() {
        let locator = ExecutableLocator::new(&config(), &environment());
        let bundled: Vec<PathBuf> = locator
            .candidates()
            .into_iter()
            .filter(|candidate| candidate.source == DiscoverySource::Bundled)
            .map(|candidate| candidate.path)
            .collect();
        let file_name = RenderConfig::default().program_file_name();
        assert_eq!(
            bundled,
            vec![
                PathBuf::from("/work/project/graphviz/bin").join(&file_name),
                PathBuf::from("/work/graphviz/bin").join(&file_name),
            ]
        );
    }

    #[test]
    fn narrow_scope_stops_after_search_path() {
        let locator =
            ExecutableLocator::new(&config(), &environment()).with_scope(DiscoveryScope::Narrow);
        assert_eq!(locator.candidates().len(), 4);
    }

    #[test]
    fn environment_parsing_ignores_empty_override() {
        let environment = ProbeEnvironment::from_vars(Some(OsString::new()), None, None);
        assert!(environment.override_path.is_none());
        assert!(environment.search_path.is_empty());
    }

    #[test]
    fn nothing_found_in_empty_environment() {
        let config = RenderConfig {
            well_known_paths: Vec::new(),
            ..RenderConfig::default()
        };
        let locator = ExecutableLocator::new(&config, &ProbeEnvironment::default());
        assert!(locator.candidates().is_empty());
        assert!(locator.locate().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn locates_executable_on_search_path() {
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let empty = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dot");
        fs::write(&path, "#!/bin/sh\nexit 0\n").expect("write script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");

        let environment = ProbeEnvironment {
            override_path: None,
            search_path: vec![empty.path().to_path_buf(), dir.path().to_path_buf()],
            current_dir: None,
        };
        let config = RenderConfig {
            well_known_paths: Vec::new(),
            ..RenderConfig::default()
        };
        let located = ExecutableLocator::new(&config, &environment)
            .locate()
            .expect("found on PATH");
        assert_eq!(located.path, path);
        assert_eq!(located.source, DiscoverySource::SearchPath);
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_files_are_skipped() {
        use std::fs;

        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("dot"), "not a program").expect("write file");
        let environment = ProbeEnvironment {
            override_path: None,
            search_path: vec![dir.path().to_path_buf()],
            current_dir: None,
        };
        let config = RenderConfig {
            well_known_paths: Vec::new(),
            ..RenderConfig::default()
        };
        assert!(ExecutableLocator::new(&config, &environment).locate().is_none());
    }
}
