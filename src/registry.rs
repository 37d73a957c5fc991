//! Registry queries: lookup, enumeration, creation.
//!
//! The VirtualBox registry is external, globally shared state. Every query
//! constructs fresh [`Machine`] snapshots; nothing is cached or shared
//! between callers.

use crate::error::VbxError;
use crate::machine::Machine;
use crate::manage::Runner;
use crate::vbox::{Vbx, argv, command_failed};
use crate::vminfo;

/// Marker VBoxManage prints on stderr when a lookup target is not
/// registered. Anything else in stderr stays a generic command failure.
const NOT_FOUND_MARKER: &str = "Could not find a registered machine";

impl<R: Runner> Vbx<R> {
    /// Find a machine by name or UUID.
    pub async fn get_machine(&self, id: &str) -> Result<Machine, VbxError> {
        let args = argv(&["showvminfo", id, "--machinereadable"]);
        let out = self.runner.run(&args).await?;
        if !out.success {
            if out.stderr.contains(NOT_FOUND_MARKER) {
                return Err(VbxError::MachineNotFound { id: id.to_string() });
            }
            return Err(command_failed(&args, &out));
        }
        vminfo::parse_machine(&out.stdout)
    }

    /// Enumerate all registered machines, resolving each entry to a full
    /// snapshot. A failure resolving any single entry aborts the listing;
    /// malformed `list vms` lines are skipped.
    pub async fn list_machines(&self) -> Result<Vec<Machine>, VbxError> {
        let out = self.vbm_out(argv(&["list", "vms"])).await?;
        let mut machines = Vec::new();
        for line in out.lines() {
            let Some((name, _uuid)) = vminfo::parse_list_line(line) else {
                continue;
            };
            machines.push(self.get_machine(name).await?);
        }
        Ok(machines)
    }

    /// Create and register a new machine, optionally pinning its base
    /// folder. The name-collision check is list-then-create and therefore
    /// not atomic; two concurrent creators can still race at the registry.
    pub async fn create_machine(
        &self,
        name: &str,
        base_folder: Option<&str>,
    ) -> Result<Machine, VbxError> {
        if name.is_empty() {
            return Err(VbxError::Validation {
                message: "machine name must not be empty".into(),
            });
        }

        let existing = self.list_machines().await?;
        if existing.iter().any(|m| m.name == name) {
            return Err(VbxError::MachineExists {
                name: name.to_string(),
            });
        }

        let mut args = argv(&["createvm", "--name", name, "--register"]);
        if let Some(folder) = base_folder
            && !folder.is_empty()
        {
            args.push("--basefolder".to_string());
            args.push(folder.to_string());
        }
        self.vbm(args).await?;
        tracing::info!(name, "machine created");

        self.get_machine(name).await
    }
}

// ── Tests ────────────────────────────────────────────────
