// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for threadwatch.
//!
//! Configuration is read from an embedded default config, with an optional
//! `.config/threadwatch.toml` in the workspace root (or an explicitly specified file) layered on
//! top. Settings are grouped into profiles: `[profile.default]` carries every setting, and custom
//! profiles inherit whatever they don't set from it.

mod imp;

pub use imp::*;
