//! Filesystem locations.

use std::path::PathBuf;

pub const CONFIG_FILE: &str = "vbx.toml";

/// Per-user config file, e.g. `~/.config/vbx/vbx.toml`.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("vbx").join(CONFIG_FILE))
}
