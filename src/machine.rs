//! Shared vocabulary for machine state and configuration.
//!
//! A `Machine` is a snapshot: it reflects what `showvminfo` reported at the
//! last successful refresh and nothing newer. Lifecycle operations route on
//! the snapshot's `state`, so callers decide how much staleness they accept
//! before calling `Vbx::refresh`.

use std::path::Path;
use std::str::FromStr;

use crate::error::VbxError;

// ── Machine state ────────────────────────────────────────

/// Runtime state as reported by `showvminfo`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MachineState {
    #[default]
    Poweroff,
    Running,
    Paused,
    Saved,
    Aborted,
}

impl MachineState {
    pub fn as_str(self) -> &'static str {
        match self {
            MachineState::Poweroff => "poweroff",
            MachineState::Running => "running",
            MachineState::Paused => "paused",
            MachineState::Saved => "saved",
            MachineState::Aborted => "aborted",
        }
    }
}

impl FromStr for MachineState {
    type Err = VbxError;

    /// Strict: a state string outside the five known values is a parse
    /// error, not a silent passthrough.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "poweroff" => Ok(MachineState::Poweroff),
            "running" => Ok(MachineState::Running),
            "paused" => Ok(MachineState::Paused),
            "saved" => Ok(MachineState::Saved),
            "aborted" => Ok(MachineState::Aborted),
            other => Err(VbxError::Parse {
                field: "VMState",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Hardware feature flags ───────────────────────────────

/// One boolean hardware/feature toggle, named after its `modifyvm` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Acpi,
    IoApic,
    RtcUseUtc,
    CpuHotplug,
    Pae,
    LongMode,
    Hpet,
    HwVirtEx,
    TripleFaultReset,
    NestedPaging,
    LargePages,
    VtxVpid,
    VtxUx,
    Accelerate3d,
    Usb,
    UsbEhci,
    UsbXhci,
}

impl Flag {
    /// Every flag, in the order `modifyvm` arguments are emitted.
    pub const ALL: [Flag; 17] = [
        Flag::Acpi,
        Flag::IoApic,
        Flag::RtcUseUtc,
        Flag::CpuHotplug,
        Flag::Pae,
        Flag::LongMode,
        Flag::Hpet,
        Flag::HwVirtEx,
        Flag::TripleFaultReset,
        Flag::NestedPaging,
        Flag::LargePages,
        Flag::VtxVpid,
        Flag::VtxUx,
        Flag::Accelerate3d,
        Flag::Usb,
        Flag::UsbEhci,
        Flag::UsbXhci,
    ];

    /// The `modifyvm` option this flag maps to.
    pub fn option(self) -> &'static str {
        match self {
            Flag::Acpi => "--acpi",
            Flag::IoApic => "--ioapic",
            Flag::RtcUseUtc => "--rtcuseutc",
            Flag::CpuHotplug => "--cpuhotplug",
            Flag::Pae => "--pae",
            Flag::LongMode => "--longmode",
            Flag::Hpet => "--hpet",
            Flag::HwVirtEx => "--hwvirtex",
            Flag::TripleFaultReset => "--triplefaultreset",
            Flag::NestedPaging => "--nestedpaging",
            Flag::LargePages => "--largepages",
            Flag::VtxVpid => "--vtxvpid",
            Flag::VtxUx => "--vtxux",
            Flag::Accelerate3d => "--accelerate3d",
            Flag::Usb => "--usb",
            Flag::UsbEhci => "--usbehci",
            Flag::UsbXhci => "--usbxhci",
        }
    }

    fn mask(self) -> u32 {
        1 << (self as u32)
    }
}

/// Bitset over [`Flag`]. Every bit is independent and defaults to off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags(u32);

impl Flags {
    pub fn contains(self, flag: Flag) -> bool {
        self.0 & flag.mask() == flag.mask()
    }

    pub fn set(&mut self, flag: Flag) {
        self.0 |= flag.mask();
    }

    pub fn clear(&mut self, flag: Flag) {
        self.0 &= !flag.mask();
    }

    pub fn set_to(&mut self, flag: Flag, on: bool) {
        if on {
            self.set(flag);
        } else {
            self.clear(flag);
        }
    }

    /// The on/off wire form `modifyvm` expects for this flag.
    pub fn as_on_off(self, flag: Flag) -> &'static str {
        if self.contains(flag) { "on" } else { "off" }
    }
}

// ── Boot devices ─────────────────────────────────────────

/// A device type assignable to one of the four boot slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootDevice {
    None,
    Floppy,
    Dvd,
    Disk,
    Net,
}

impl BootDevice {
    pub fn as_str(self) -> &'static str {
        match self {
            BootDevice::None => "none",
            BootDevice::Floppy => "floppy",
            BootDevice::Dvd => "dvd",
            BootDevice::Disk => "disk",
            BootDevice::Net => "net",
        }
    }
}

impl FromStr for BootDevice {
    type Err = VbxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(BootDevice::None),
            "floppy" => Ok(BootDevice::Floppy),
            "dvd" => Ok(BootDevice::Dvd),
            "disk" => Ok(BootDevice::Disk),
            "net" => Ok(BootDevice::Net),
            other => Err(VbxError::Parse {
                field: "boot device",
                value: other.to_string(),
            }),
        }
    }
}

// ── Machine snapshot ─────────────────────────────────────

/// Observable configuration and runtime state of one virtual machine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Machine {
    pub name: String,
    pub uuid: String,
    pub state: MachineState,
    pub cpus: u32,
    /// Main memory in MB.
    pub memory_mb: u32,
    /// Video memory in MB.
    pub vram_mb: u32,
    pub cfg_file: String,
    /// Directory holding the config file; derived from `cfg_file`.
    pub base_folder: String,
    pub os_type: String,
    pub flags: Flags,
    /// At most the first four entries are applied (`--boot1..--boot4`).
    pub boot_order: Vec<BootDevice>,
    pub description: String,
}

impl Machine {
    /// Identifier used to address the machine in commands: the name when
    /// set, otherwise the UUID.
    pub fn id(&self) -> &str {
        if self.name.is_empty() {
            &self.uuid
        } else {
            &self.name
        }
    }
}

/// Derive the base folder from a config file path.
pub(crate) fn base_folder_of(cfg_file: &str) -> String {
    Path::new(cfg_file)
        .parent()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

// ── Tests ────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_parses_all_known_values() {
        for (text, state) in [
            ("poweroff", MachineState::Poweroff),
            ("running", MachineState::Running),
            ("paused", MachineState::Paused),
            ("saved", MachineState::Saved),
            ("aborted", MachineState::Aborted),
        ] {
            assert_eq!(text.parse::<MachineState>().unwrap(), state);
            assert_eq!(state.as_str(), text);
        }
    }

    #[test]
    fn state_rejects_unknown_value() {
        let err = "gurumeditation".parse::<MachineState>().unwrap_err();
        assert!(matches!(err, VbxError::Parse { field: "VMState", .. }));
    }

    #[test]
    fn flags_default_off() {
        let flags = Flags::default();
        for flag in Flag::ALL {
            assert!(!flags.contains(flag));
            assert_eq!(flags.as_on_off(flag), "off");
        }
    }

    #[test]
    fn each_flag_independent() {
        // Setting one bit must not disturb any other.
        for flag in Flag::ALL {
            let mut flags = Flags::default();
            flags.set(flag);
            for other in Flag::ALL {
                let expected = if other == flag { "on" } else { "off" };
                assert_eq!(flags.as_on_off(other), expected, "{:?}", other);
            }
            flags.clear(flag);
            assert_eq!(flags, Flags::default());
        }
    }

    #[test]
    fn set_to_round_trips() {
        let mut flags = Flags::default();
        flags.set_to(Flag::Usb, true);
        flags.set_to(Flag::UsbEhci, true);
        flags.set_to(Flag::Usb, false);
        assert!(!flags.contains(Flag::Usb));
        assert!(flags.contains(Flag::UsbEhci));
    }

    #[test]
    fn boot_device_round_trips() {
        for text in ["none", "floppy", "dvd", "disk", "net"] {
            assert_eq!(text.parse::<BootDevice>().unwrap().as_str(), text);
        }
        assert!("cdrom".parse::<BootDevice>().is_err());
    }

    #[test]
    fn id_prefers_name_over_uuid() {
        let m = Machine {
            name: "demo".into(),
            uuid: "1234-uuid".into(),
            ..Machine::default()
        };
        assert_eq!(m.id(), "demo");

        let unnamed = Machine {
            uuid: "1234-uuid".into(),
            ..Machine::default()
        };
        assert_eq!(unnamed.id(), "1234-uuid");
    }

    #[test]
    fn base_folder_is_cfg_file_parent() {
        assert_eq!(base_folder_of("/vms/demo/demo.vbox"), "/vms/demo");
        assert_eq!(base_folder_of(""), "");
    }
}
