// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{ConfigParseError, ConfigParseErrorKind, ProfileNotFound},
    watch::WatchSettings,
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};
use tracing::warn;

/// Overall configuration for threadwatch.
///
/// This is the root data structure for threadwatch configuration. Most runner-specific
/// configuration is managed through [profiles](RunnerProfile), obtained through the
/// [`profile`](Self::profile) method.
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    workspace_root: Utf8PathBuf,
    default_profile: DefaultProfileImpl,
    other_profiles: BTreeMap<String, CustomProfileImpl>,
}

impl RunnerConfig {
    /// The default location of the config within the workspace root: `.config/threadwatch.toml`.
    pub const CONFIG_PATH: &'static str = ".config/threadwatch.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// The name of the default profile.
    pub const DEFAULT_PROFILE: &'static str = "default";

    /// Reads the configuration from the given sources.
    ///
    /// If `config_file` is `None`, `.config/threadwatch.toml` within the workspace root is used if
    /// it exists. An explicitly specified config file must exist.
    pub fn from_sources(
        workspace_root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        Self::from_sources_impl(workspace_root, config_file, |config_file, unknown| {
            warn_unknown_keys(config_file, unknown)
        })
    }

    // A custom unknown_callback can be passed in while testing.
    fn from_sources_impl(
        workspace_root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
        mut unknown_callback: impl FnMut(&Utf8Path, &BTreeSet<String>),
    ) -> Result<Self, ConfigParseError> {
        let workspace_root = workspace_root.into();
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = workspace_root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let (deserialized, unknown) = Self::build_and_deserialize_config(builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;
        if !unknown.is_empty() {
            unknown_callback(&config_file, &unknown);
        }

        let (default_profile, other_profiles) = deserialized
            .into_profiles()
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;

        Ok(Self {
            workspace_root,
            default_profile,
            other_profiles,
        })
    }

    /// Returns the default config, without reading anything from disk.
    pub fn default_config(workspace_root: impl Into<Utf8PathBuf>) -> Self {
        let (deserialized, _) = Self::build_and_deserialize_config(Self::make_default_config())
            .expect("default config is always valid");
        let (default_profile, other_profiles) = deserialized
            .into_profiles()
            .expect("default config is always valid");

        Self {
            workspace_root: workspace_root.into(),
            default_profile,
            other_profiles,
        }
    }

    /// Returns the workspace root the config was read relative to.
    pub fn workspace_root(&self) -> &Utf8Path {
        &self.workspace_root
    }

    /// Returns the profile with the given name, or an error if it isn't known.
    pub fn profile(&self, name: impl AsRef<str>) -> Result<RunnerProfile<'_>, ProfileNotFound> {
        let name = name.as_ref();
        let custom_profile = match name {
            Self::DEFAULT_PROFILE => None,
            other => Some(
                self.other_profiles
                    .get(other)
                    .ok_or_else(|| ProfileNotFound::new(other, self.all_profiles()))?,
            ),
        };

        Ok(RunnerProfile {
            name: name.to_owned(),
            default_profile: &self.default_profile,
            custom_profile,
        })
    }

    fn all_profiles(&self) -> impl Iterator<Item = &str> + '_ {
        std::iter::once(Self::DEFAULT_PROFILE).chain(self.other_profiles.keys().map(String::as_str))
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    /// This returns a tuple of (config, ignored paths).
    fn build_and_deserialize_config(
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<(RunnerConfigDeserialize, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config = RunnerConfigDeserialize::deserialize(ignored_de)
            .map_err(|error| ConfigParseErrorKind::DeserializeError(Box::new(error)))?;

        Ok((config, ignored))
    }
}

fn warn_unknown_keys(config_file: &Utf8Path, unknown: &BTreeSet<String>) {
    let mut unknown_str = String::new();
    if unknown.len() == 1 {
        // Print this on the same line.
        unknown_str.push_str("key: ");
        unknown_str.extend(unknown.iter().map(String::as_str));
    } else {
        unknown_str.push_str("keys:\n");
        for ignored_key in unknown {
            unknown_str.push('\n');
            unknown_str.push_str("  - ");
            unknown_str.push_str(ignored_key);
        }
    }

    warn!("ignoring unknown configuration in {config_file}: {unknown_str}");
}

/// A threadwatch profile.
///
/// Returned by [`RunnerConfig::profile`].
#[derive(Clone, Debug)]
pub struct RunnerProfile<'cfg> {
    name: String,
    default_profile: &'cfg DefaultProfileImpl,
    custom_profile: Option<&'cfg CustomProfileImpl>,
}

impl<'cfg> RunnerProfile<'cfg> {
    /// Returns the name of the profile.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if tests run with a watcher armed around them.
    pub fn watch_workers(&self) -> bool {
        self.custom_profile
            .and_then(|profile| profile.watch_workers)
            .unwrap_or(self.default_profile.watch_workers)
    }

    /// Returns how long to wait for the workers created by a test to exit, unless the test
    /// overrides it.
    pub fn shutdown_timeout(&self) -> Duration {
        self.custom_profile
            .and_then(|profile| profile.shutdown_timeout)
            .unwrap_or(self.default_profile.shutdown_timeout)
    }

    /// Returns the delay used on either side of the test body while the watcher is armed.
    pub fn settle_delay(&self) -> Duration {
        self.custom_profile
            .and_then(|profile| profile.settle_delay)
            .unwrap_or(self.default_profile.settle_delay)
    }

    /// Returns how often created workers are checked for liveness.
    pub fn liveness_poll_interval(&self) -> Duration {
        self.custom_profile
            .and_then(|profile| profile.liveness_poll_interval)
            .unwrap_or(self.default_profile.liveness_poll_interval)
    }

    /// Returns how often the watcher takes a census of live workers.
    pub fn census_poll_interval(&self) -> Duration {
        self.custom_profile
            .and_then(|profile| profile.census_poll_interval)
            .unwrap_or(self.default_profile.census_poll_interval)
    }

    /// Returns true if backtraces are captured for worker panics.
    pub fn capture_backtraces(&self) -> bool {
        self.custom_profile
            .and_then(|profile| profile.capture_backtraces)
            .unwrap_or(self.default_profile.capture_backtraces)
    }

    /// Returns true if worker panics are also passed on to the previously installed panic hook.
    pub fn forward_panics(&self) -> bool {
        self.custom_profile
            .and_then(|profile| profile.forward_panics)
            .unwrap_or(self.default_profile.forward_panics)
    }

    /// Returns the thread name prefixes of workers that are never waited for.
    pub fn background_threads(&self) -> &'cfg [String] {
        self.custom_profile
            .and_then(|profile| profile.background_threads.as_deref())
            .unwrap_or(&self.default_profile.background_threads)
    }

    /// Returns the settings used to arm the watcher.
    pub fn watch_settings(&self) -> WatchSettings {
        WatchSettings {
            census_poll_interval: self.census_poll_interval(),
            capture_backtraces: self.capture_backtraces(),
            forward_panics: self.forward_panics(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RunnerConfigDeserialize {
    #[serde(default)]
    profile: BTreeMap<String, CustomProfileImpl>,
}

impl RunnerConfigDeserialize {
    fn into_profiles(
        mut self,
    ) -> Result<(DefaultProfileImpl, BTreeMap<String, CustomProfileImpl>), ConfigParseErrorKind>
    {
        for (name, profile) in &self.profile {
            profile.check_non_zero(name)?;
        }

        let default_profile = self
            .profile
            .remove(RunnerConfig::DEFAULT_PROFILE)
            .expect("default profile is present in the default config");
        Ok((DefaultProfileImpl::new(default_profile), self.profile))
    }
}

#[derive(Clone, Debug)]
struct DefaultProfileImpl {
    watch_workers: bool,
    shutdown_timeout: Duration,
    settle_delay: Duration,
    liveness_poll_interval: Duration,
    census_poll_interval: Duration,
    capture_backtraces: bool,
    forward_panics: bool,
    background_threads: Vec<String>,
}

impl DefaultProfileImpl {
    fn new(p: CustomProfileImpl) -> Self {
        Self {
            watch_workers: p
                .watch_workers
                .expect("watch-workers present in default profile"),
            shutdown_timeout: p
                .shutdown_timeout
                .expect("shutdown-timeout present in default profile"),
            settle_delay: p
                .settle_delay
                .expect("settle-delay present in default profile"),
            liveness_poll_interval: p
                .liveness_poll_interval
                .expect("liveness-poll-interval present in default profile"),
            census_poll_interval: p
                .census_poll_interval
                .expect("census-poll-interval present in default profile"),
            capture_backtraces: p
                .capture_backtraces
                .expect("capture-backtraces present in default profile"),
            forward_panics: p
                .forward_panics
                .expect("forward-panics present in default profile"),
            background_threads: p
                .background_threads
                .expect("background-threads present in default profile"),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CustomProfileImpl {
    #[serde(default)]
    watch_workers: Option<bool>,
    #[serde(default, with = "humantime_serde::option")]
    shutdown_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    settle_delay: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    liveness_poll_interval: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    census_poll_interval: Option<Duration>,
    #[serde(default)]
    capture_backtraces: Option<bool>,
    #[serde(default)]
    forward_panics: Option<bool>,
    #[serde(default)]
    background_threads: Option<Vec<String>>,
}

impl CustomProfileImpl {
    fn check_non_zero(&self, profile: &str) -> Result<(), ConfigParseErrorKind> {
        let intervals = [
            ("liveness-poll-interval", self.liveness_poll_interval),
            ("census-poll-interval", self.census_poll_interval),
        ];
        for (key, value) in intervals {
            if value == Some(Duration::ZERO) {
                return Err(ConfigParseErrorKind::ZeroDuration {
                    profile: profile.to_owned(),
                    key,
                });
            }
        }
        Ok(())
    }
}
