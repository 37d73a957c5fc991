//! Parsing of VBoxManage's machine-readable output.
//!
//! `showvminfo --machinereadable` emits one `key=value` pair per line,
//! where either side may be double-quoted (quotes stripped, no escape
//! processing). `list vms` emits `"name" {uuid}` lines. Unknown keys are
//! ignored so newer VBoxManage releases keep working; malformed values for
//! known keys abort the whole parse.

use crate::error::VbxError;
use crate::machine::{self, Machine};

/// Split one `showvminfo --machinereadable` line into a key/value pair.
///
/// Returns `None` for lines without `=`. Values may be empty.
pub(crate) fn parse_info_line(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.trim_end().split_once('=')?;
    Some((unquote(key), unquote(value)))
}

fn unquote(s: &str) -> &str {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// Parse a full `showvminfo --machinereadable` block into a fresh
/// [`Machine`] snapshot.
///
/// The snapshot is built in a local value and only returned on full
/// success, so a caller replacing an existing snapshot never observes a
/// partially-updated one.
pub(crate) fn parse_machine(out: &str) -> Result<Machine, VbxError> {
    let mut m = Machine::default();
    for line in out.lines() {
        let Some((key, value)) = parse_info_line(line) else {
            continue;
        };
        match key {
            "name" => m.name = value.to_string(),
            "UUID" => m.uuid = value.to_string(),
            "VMState" => m.state = value.parse()?,
            "memory" => m.memory_mb = parse_uint("memory", value)?,
            "cpus" => m.cpus = parse_uint("cpus", value)?,
            "vram" => m.vram_mb = parse_uint("vram", value)?,
            "CfgFile" => {
                m.cfg_file = value.to_string();
                m.base_folder = machine::base_folder_of(value);
            }
            "ostype" => m.os_type = value.to_string(),
            "description" => m.description = value.to_string(),
            _ => {}
        }
    }
    Ok(m)
}

fn parse_uint(field: &'static str, value: &str) -> Result<u32, VbxError> {
    value.parse().map_err(|_| VbxError::Parse {
        field,
        value: value.to_string(),
    })
}

/// Extract `(name, uuid)` from a `list vms` line of the form
/// `"name" {uuid}`. Lines with any other shape yield `None`.
pub(crate) fn parse_list_line(line: &str) -> Option<(&str, &str)> {
    let rest = line.trim().strip_prefix('"')?;
    let (name, rest) = rest.rsplit_once("\" {")?;
    let uuid = rest.strip_suffix('}')?;
    if name.is_empty() || uuid.is_empty() {
        return None;
    }
    if !uuid.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
        return None;
    }
    Some((name, uuid))
}

// ── Tests ────────────────────────────────────────────────
