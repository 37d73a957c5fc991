//! Peripheral device descriptors and their VBoxManage argument mapping.
//!
//! These are plain data holders; attaching one to a machine is a single
//! `modifyvm`/`storagectl`/`storageattach`/`controlvm natpf` invocation.

use std::fmt;
use std::net::Ipv4Addr;

use crate::error::VbxError;
use crate::machine::Machine;
use crate::manage::Runner;
use crate::vbox::{Vbx, argv};

// ── Network interfaces ───────────────────────────────────

/// Attachment mode of a virtual NIC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NicNetwork {
    Absent,
    Disconnected,
    Nat,
    Bridged,
    Internal,
    HostOnly,
    Generic,
}

impl NicNetwork {
    pub fn as_str(self) -> &'static str {
        match self {
            NicNetwork::Absent => "none",
            NicNetwork::Disconnected => "null",
            NicNetwork::Nat => "nat",
            NicNetwork::Bridged => "bridged",
            NicNetwork::Internal => "intnet",
            NicNetwork::HostOnly => "hostonly",
            NicNetwork::Generic => "generic",
        }
    }
}

/// Emulated NIC hardware model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NicHardware {
    AmdPcNetPciII,
    AmdPcNetFastIII,
    IntelPro1000MtDesktop,
    IntelPro1000TServer,
    IntelPro1000MtServer,
    Virtio,
}

impl NicHardware {
    pub fn as_str(self) -> &'static str {
        match self {
            NicHardware::AmdPcNetPciII => "Am79C970A",
            NicHardware::AmdPcNetFastIII => "Am79C973",
            NicHardware::IntelPro1000MtDesktop => "82540EM",
            NicHardware::IntelPro1000TServer => "82543GC",
            NicHardware::IntelPro1000MtServer => "82545EM",
            NicHardware::Virtio => "virtio",
        }
    }
}

/// One virtual network adapter.
#[derive(Debug, Clone)]
pub struct Nic {
    pub network: NicNetwork,
    pub hardware: NicHardware,
    /// Host-only adapter to bind when `network` is [`NicNetwork::HostOnly`].
    pub host_only_adapter: String,
}

// ── Storage ──────────────────────────────────────────────

/// System bus a storage controller sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysBus {
    Ide,
    Sata,
    Scsi,
    Floppy,
}

impl SysBus {
    pub fn as_str(self) -> &'static str {
        match self {
            SysBus::Ide => "ide",
            SysBus::Sata => "sata",
            SysBus::Scsi => "scsi",
            SysBus::Floppy => "floppy",
        }
    }
}

/// Controller chipset to emulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtlChipset {
    LsiLogic,
    LsiLogicSas,
    BusLogic,
    IntelAhci,
    Piix3,
    Piix4,
    Ich6,
    I82078,
}

impl CtlChipset {
    pub fn as_str(self) -> &'static str {
        match self {
            CtlChipset::LsiLogic => "LSILogic",
            CtlChipset::LsiLogicSas => "LSILogicSAS",
            CtlChipset::BusLogic => "BusLogic",
            CtlChipset::IntelAhci => "IntelAHCI",
            CtlChipset::Piix3 => "PIIX3",
            CtlChipset::Piix4 => "PIIX4",
            CtlChipset::Ich6 => "ICH6",
            CtlChipset::I82078 => "I82078",
        }
    }
}

/// One storage controller. Optional fields are omitted from the argument
/// list when unset.
#[derive(Debug, Clone, Default)]
pub struct StorageController {
    pub sys_bus: Option<SysBus>,
    pub ports: u16,
    pub chipset: Option<CtlChipset>,
    pub host_io_cache: bool,
    pub bootable: bool,
}

/// Kind of drive a medium is attached as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveType {
    Dvd,
    Hdd,
    Fdd,
}

impl DriveType {
    pub fn as_str(self) -> &'static str {
        match self {
            DriveType::Dvd => "dvddrive",
            DriveType::Hdd => "hdd",
            DriveType::Fdd => "fdd",
        }
    }
}

/// One medium attached to a controller port/device slot.
#[derive(Debug, Clone)]
pub struct StorageMedium {
    pub port: u16,
    pub device: u16,
    pub drive_type: DriveType,
    /// Path to the medium, or one of VBoxManage's magic values
    /// (`none`, `emptydrive`).
    pub medium: String,
}

// ── NAT port forwarding ──────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PfProto {
    Tcp,
    Udp,
}

impl PfProto {
    pub fn as_str(self) -> &'static str {
        match self {
            PfProto::Tcp => "tcp",
            PfProto::Udp => "udp",
        }
    }
}

/// A NAT port-forwarding rule. The wire form consumed by `natpf<N>` is
/// `name,proto,host ip,host port,guest ip,guest port`, with absent
/// addresses rendered as empty fields.
#[derive(Debug, Clone)]
pub struct PortForward {
    pub name: String,
    pub proto: PfProto,
    pub host_ip: Option<Ipv4Addr>,
    pub host_port: u16,
    pub guest_ip: Option<Ipv4Addr>,
    pub guest_port: u16,
}

impl fmt::Display for PortForward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opt = |ip: &Option<Ipv4Addr>| ip.map(|i| i.to_string()).unwrap_or_default();
        write!(
            f,
            "{},{},{},{},{},{}",
            self.name,
            self.proto.as_str(),
            opt(&self.host_ip),
            self.host_port,
            opt(&self.guest_ip),
            self.guest_port
        )
    }
}

// ── Attachment operations ────────────────────────────────

impl<R: Runner> Vbx<R> {
    /// Configure the NIC in the given slot.
    pub async fn set_nic(&self, m: &Machine, slot: u32, nic: &Nic) -> Result<(), VbxError> {
        let mut args = argv(&["modifyvm", m.id()]);
        args.push(format!("--nic{slot}"));
        args.push(nic.network.as_str().to_string());
        args.push(format!("--nictype{slot}"));
        args.push(nic.hardware.as_str().to_string());
        args.push(format!("--cableconnected{slot}"));
        args.push("on".to_string());
        if nic.network == NicNetwork::HostOnly {
            args.push(format!("--hostonlyadapter{slot}"));
            args.push(nic.host_only_adapter.clone());
        }
        self.vbm(args).await
    }

    /// Add a NAT port-forwarding rule to the NIC in the given slot.
    pub async fn add_nat_pf(
        &self,
        m: &Machine,
        slot: u32,
        rule: &PortForward,
    ) -> Result<(), VbxError> {
        let args = vec![
            "controlvm".to_string(),
            m.id().to_string(),
            format!("natpf{slot}"),
            rule.to_string(),
        ];
        self.vbm(args).await
    }

    /// Delete the named NAT port-forwarding rule from the given slot.
    pub async fn del_nat_pf(&self, m: &Machine, slot: u32, name: &str) -> Result<(), VbxError> {
        let args = vec![
            "controlvm".to_string(),
            m.id().to_string(),
            format!("natpf{slot}"),
            "delete".to_string(),
            name.to_string(),
        ];
        self.vbm(args).await
    }

    /// Add a storage controller with the given name.
    pub async fn add_storage_ctl(
        &self,
        m: &Machine,
        name: &str,
        ctl: &StorageController,
    ) -> Result<(), VbxError> {
        let mut args = argv(&["storagectl", m.id(), "--name", name]);
        if let Some(bus) = ctl.sys_bus {
            args.push("--add".to_string());
            args.push(bus.as_str().to_string());
        }
        if ctl.ports > 0 {
            args.push("--portcount".to_string());
            args.push(ctl.ports.to_string());
        }
        if let Some(chipset) = ctl.chipset {
            args.push("--controller".to_string());
            args.push(chipset.as_str().to_string());
        }
        args.push("--hostiocache".to_string());
        args.push(on_off(ctl.host_io_cache).to_string());
        args.push("--bootable".to_string());
        args.push(on_off(ctl.bootable).to_string());
        self.vbm(args).await
    }

    /// Remove the named storage controller.
    pub async fn del_storage_ctl(&self, m: &Machine, name: &str) -> Result<(), VbxError> {
        self.vbm(argv(&["storagectl", m.id(), "--name", name, "--remove"]))
            .await
    }

    /// Attach a medium to the named storage controller.
    pub async fn attach_storage(
        &self,
        m: &Machine,
        ctl_name: &str,
        medium: &StorageMedium,
    ) -> Result<(), VbxError> {
        let args = argv(&[
            "storageattach",
            m.id(),
            "--storagectl",
            ctl_name,
            "--port",
            &medium.port.to_string(),
            "--device",
            &medium.device.to_string(),
            "--type",
            medium.drive_type.as_str(),
            "--medium",
            &medium.medium,
        ]);
        self.vbm(args).await
    }
}

fn on_off(b: bool) -> &'static str {
    if b { "on" } else { "off" }
}

// ── Tests ────────────────────────────────────────────────
