//! VBoxManage-backed control layer.
//!
//! [`Vbx`] owns the command runner and executes lifecycle plans from
//! `lifecycle.rs` against it. Every operation is a sequence of awaited
//! external invocations; nothing runs concurrently and nothing is locked,
//! so concurrent callers racing on the same machine must serialize above
//! this layer.

use std::time::Duration;

use crate::error::VbxError;
use crate::lifecycle::{
    PausePlan, PoweroffPlan, PrestartPlan, SavePlan, StartPlan, StopPlan, route_pause,
    route_poweroff, route_prestart, route_save, route_start, route_stop,
};
use crate::machine::{Flag, Machine, MachineState};
use crate::manage::{CmdOutput, Runner, VBoxManage};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Handle to the external hypervisor tool.
pub struct Vbx<R = VBoxManage> {
    pub(crate) runner: R,
    poll_interval: Duration,
    stop_timeout: Option<Duration>,
}

impl Vbx<VBoxManage> {
    /// Runner resolved from the environment (`VBX_MANAGE`, then PATH).
    pub fn new() -> Self {
        Self::with_runner(VBoxManage::from_env())
    }
}

impl Default for Vbx<VBoxManage> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Runner> Vbx<R> {
    pub fn with_runner(runner: R) -> Self {
        Self {
            runner,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stop_timeout: None,
        }
    }

    /// Cadence of the `stop` poll loop.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Deadline for the `stop` poll loop. `None` waits forever.
    pub fn stop_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stop_timeout = timeout;
        self
    }

    // ── Command helpers ──────────────────────────────────

    pub(crate) async fn vbm(&self, args: Vec<String>) -> Result<(), VbxError> {
        let out = self.runner.run(&args).await?;
        if !out.success {
            return Err(command_failed(&args, &out));
        }
        Ok(())
    }

    pub(crate) async fn vbm_out(&self, args: Vec<String>) -> Result<String, VbxError> {
        let out = self.runner.run(&args).await?;
        if !out.success {
            return Err(command_failed(&args, &out));
        }
        Ok(out.stdout)
    }

    // ── Snapshot refresh ─────────────────────────────────

    /// Re-query the machine and replace the whole snapshot. On error the
    /// previous snapshot is left untouched.
    pub async fn refresh(&self, m: &mut Machine) -> Result<(), VbxError> {
        let id = m.id().to_string();
        *m = self.get_machine(&id).await?;
        Ok(())
    }

    // ── Lifecycle operations ─────────────────────────────

    /// Start the machine headless, or resume it when paused. No-op when
    /// already running. Does not refresh the snapshot.
    pub async fn start(&self, m: &Machine) -> Result<(), VbxError> {
        match route_start(m.state) {
            StartPlan::Resume => {
                self.vbm(argv(&["controlvm", m.id(), "resume"])).await
            }
            StartPlan::StartHeadless => {
                tracing::info!(id = m.id(), "starting machine");
                self.vbm(argv(&["startvm", m.id(), "--type", "headless"]))
                    .await
            }
            StartPlan::Noop => Ok(()),
        }
    }

    /// Suspend the machine to disk. A paused machine is resumed first.
    pub async fn save(&self, m: &Machine) -> Result<(), VbxError> {
        match route_save(m.state) {
            SavePlan::Noop => return Ok(()),
            SavePlan::ResumeThenSave => self.start(m).await?,
            SavePlan::Save => {}
        }
        self.vbm(argv(&["controlvm", m.id(), "savestate"])).await
    }

    /// Pause a running machine. No-op from every other state.
    pub async fn pause(&self, m: &Machine) -> Result<(), VbxError> {
        match route_pause(m.state) {
            PausePlan::Pause => self.vbm(argv(&["controlvm", m.id(), "pause"])).await,
            PausePlan::Noop => Ok(()),
        }
    }

    /// Gracefully stop the machine: press the ACPI power button, sleep one
    /// poll interval, refresh, until the observed state is poweroff.
    ///
    /// ACPI shutdown is asynchronous and VBoxManage exposes no blocking
    /// wait for it, hence the client-side poll. With no configured
    /// [`stop_timeout`](Self::stop_timeout) this blocks for as long as the
    /// guest keeps ignoring the button.
    pub async fn stop(&self, m: &mut Machine) -> Result<(), VbxError> {
        match route_stop(m.state) {
            StopPlan::Noop => return Ok(()),
            StopPlan::ResumeThenPoll => self.start(m).await?,
            StopPlan::Poll => {}
        }

        let started = tokio::time::Instant::now();
        while m.state != MachineState::Poweroff {
            if let Some(limit) = self.stop_timeout
                && started.elapsed() >= limit
            {
                return Err(VbxError::StopTimeout {
                    id: m.id().to_string(),
                    waited_s: limit.as_secs(),
                });
            }
            self.vbm(argv(&["controlvm", m.id(), "acpipowerbutton"]))
                .await?;
            tokio::time::sleep(self.poll_interval).await;
            self.refresh(m).await?;
        }
        tracing::info!(id = m.id(), "machine powered off");
        Ok(())
    }

    /// Force the machine off. Unsaved state is discarded and the disk
    /// image may end up inconsistent.
    pub async fn poweroff(&self, m: &Machine) -> Result<(), VbxError> {
        match route_poweroff(m.state) {
            PoweroffPlan::Force => {
                tracing::info!(id = m.id(), "forcing machine off");
                self.vbm(argv(&["controlvm", m.id(), "poweroff"])).await
            }
            PoweroffPlan::Noop => Ok(()),
        }
    }

    /// Gracefully stop, then start again. A paused or suspended machine is
    /// started (and the snapshot refreshed) first so the stop acts on the
    /// live state.
    pub async fn restart(&self, m: &mut Machine) -> Result<(), VbxError> {
        if route_prestart(m.state) == PrestartPlan::Start {
            self.start(m).await?;
            self.refresh(m).await?;
        }
        self.stop(m).await?;
        self.start(m).await
    }

    /// Force a reset. Unsaved state is discarded.
    pub async fn reset(&self, m: &Machine) -> Result<(), VbxError> {
        if route_prestart(m.state) == PrestartPlan::Start {
            self.start(m).await?;
        }
        self.vbm(argv(&["controlvm", m.id(), "reset"])).await
    }

    /// Power the machine off if needed, then unregister it and delete its
    /// files. Irreversible; consumes the snapshot.
    pub async fn delete(&self, m: Machine) -> Result<(), VbxError> {
        self.poweroff(&m).await?;
        tracing::info!(id = m.id(), "unregistering and deleting machine");
        self.vbm(argv(&["unregistervm", m.id(), "--delete"])).await
    }

    // ── Settings application ─────────────────────────────

    /// Apply the full snapshot's settings via one `modifyvm` invocation,
    /// then refresh.
    pub async fn modify(&self, m: &mut Machine) -> Result<(), VbxError> {
        let mut args = argv(&[
            "modifyvm",
            m.id(),
            "--firmware",
            "bios",
            "--bioslogofadein",
            "off",
            "--bioslogofadeout",
            "off",
            "--bioslogodisplaytime",
            "0",
            "--biosbootmenu",
            "disabled",
            "--ostype",
            &m.os_type,
            "--cpus",
            &m.cpus.to_string(),
            "--memory",
            &m.memory_mb.to_string(),
            "--vram",
            &m.vram_mb.to_string(),
            "--description",
            &m.description,
        ]);
        for flag in Flag::ALL {
            args.push(flag.option().to_string());
            args.push(m.flags.as_on_off(flag).to_string());
        }
        // Only four slots (--boot1..--boot4); extra entries are dropped.
        for (i, dev) in m.boot_order.iter().take(4).enumerate() {
            args.push(format!("--boot{}", i + 1));
            args.push(dev.as_str().to_string());
        }
        self.vbm(args).await?;
        self.refresh(m).await
    }

    /// Apply the commonly-tuned subset (CPU, memory, USB, description),
    /// then refresh.
    pub async fn modify_simple(&self, m: &mut Machine) -> Result<(), VbxError> {
        let args = argv(&[
            "modifyvm",
            m.id(),
            "--cpus",
            &m.cpus.to_string(),
            "--memory",
            &m.memory_mb.to_string(),
            "--usb",
            m.flags.as_on_off(Flag::Usb),
            "--usbehci",
            m.flags.as_on_off(Flag::UsbEhci),
            "--usbxhci",
            m.flags.as_on_off(Flag::UsbXhci),
            "--description",
            &m.description,
        ]);
        self.vbm(args).await?;
        self.refresh(m).await
    }
}

pub(crate) fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

pub(crate) fn command_failed(args: &[String], out: &CmdOutput) -> VbxError {
    VbxError::CommandFailed {
        command: args.first().cloned().unwrap_or_default(),
        stderr: out.stderr.trim().to_string(),
    }
}

// ── Tests ────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::machine::BootDevice;
    use crate::manage::mock::{MockRunner, fail, ok};

    fn info_block(state: &str) -> String {
        format!(
            "name=\"demo\"\nUUID=\"1234-uuid\"\nVMState=\"{state}\"\nmemory=512\ncpus=2\nvram=16\nCfgFile=\"/vms/demo/demo.vbox\"\n"
        )
    }

    fn machine_in(state: MachineState) -> Machine {
        Machine {
            name: "demo".into(),
            uuid: "1234-uuid".into(),
            state,
            ..Machine::default()
        }
    }

    /// Runner that answers `showvminfo` with a scripted sequence of states
    /// (the last one repeating) and accepts everything else.
    fn scripted_states(states: &[&'static str]) -> MockRunner {
        let queue = Mutex::new(states.iter().copied().collect::<VecDeque<_>>());
        MockRunner::new(move |args: &[String]| {
            if args[0] == "showvminfo" {
                let mut q = queue.lock().unwrap();
                let state = if q.len() > 1 {
                    q.pop_front().unwrap()
                } else {
                    *q.front().unwrap()
                };
                ok(&info_block(state))
            } else {
                ok("")
            }
        })
    }

    fn fast<R: Runner>(vbx: Vbx<R>) -> Vbx<R> {
        vbx.poll_interval(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn start_resumes_paused_machine() {
        let mock = MockRunner::new(|_| ok(""));
        let vbx = Vbx::with_runner(&mock);
        vbx.start(&machine_in(MachineState::Paused)).await.unwrap();
        assert_eq!(mock.calls(), vec![argv(&["controlvm", "demo", "resume"])]);
    }

    #[tokio::test]
    async fn start_boots_headless_from_saved() {
        let mock = MockRunner::new(|_| ok(""));
        let vbx = Vbx::with_runner(&mock);
        vbx.start(&machine_in(MachineState::Saved)).await.unwrap();
        assert_eq!(
            mock.calls(),
            vec![argv(&["startvm", "demo", "--type", "headless"])]
        );
    }

    #[tokio::test]
    async fn start_is_noop_when_running() {
        let mock = MockRunner::new(|_| ok(""));
        let vbx = Vbx::with_runner(&mock);
        vbx.start(&machine_in(MachineState::Running)).await.unwrap();
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn save_resumes_then_saves_when_paused() {
        let mock = MockRunner::new(|_| ok(""));
        let vbx = Vbx::with_runner(&mock);
        vbx.save(&machine_in(MachineState::Paused)).await.unwrap();
        assert_eq!(
            mock.calls(),
            vec![
                argv(&["controlvm", "demo", "resume"]),
                argv(&["controlvm", "demo", "savestate"]),
            ]
        );
    }

    #[tokio::test]
    async fn save_is_noop_when_already_saved() {
        let mock = MockRunner::new(|_| ok(""));
        let vbx = Vbx::with_runner(&mock);
        vbx.save(&machine_in(MachineState::Saved)).await.unwrap();
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn pause_only_acts_on_running() {
        let mock = MockRunner::new(|_| ok(""));
        let vbx = Vbx::with_runner(&mock);
        vbx.pause(&machine_in(MachineState::Running)).await.unwrap();
        assert_eq!(mock.calls(), vec![argv(&["controlvm", "demo", "pause"])]);

        let idle = MockRunner::new(|_| ok(""));
        let vbx = Vbx::with_runner(&idle);
        for state in [
            MachineState::Paused,
            MachineState::Poweroff,
            MachineState::Aborted,
            MachineState::Saved,
        ] {
            vbx.pause(&machine_in(state)).await.unwrap();
        }
        assert_eq!(idle.call_count(), 0);
    }

    #[tokio::test]
    async fn stop_polls_until_poweroff() {
        let mock = scripted_states(&["running", "running", "poweroff"]);
        let vbx = fast(Vbx::with_runner(&mock));
        let mut m = machine_in(MachineState::Running);
        vbx.stop(&mut m).await.unwrap();

        assert_eq!(m.state, MachineState::Poweroff);
        let calls = mock.calls();
        // Three button presses, each followed by a refresh.
        let buttons = calls.iter().filter(|c| c[2] == "acpipowerbutton").count();
        let refreshes = calls.iter().filter(|c| c[0] == "showvminfo").count();
        assert_eq!(buttons, 3);
        assert_eq!(refreshes, 3);
    }

    #[tokio::test]
    async fn stop_is_noop_when_down() {
        let mock = MockRunner::new(|_| ok(""));
        let vbx = Vbx::with_runner(&mock);
        for state in [
            MachineState::Poweroff,
            MachineState::Aborted,
            MachineState::Saved,
        ] {
            let mut m = machine_in(state);
            vbx.stop(&mut m).await.unwrap();
        }
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn stop_deadline_yields_timeout_error() {
        let mock = scripted_states(&["running"]);
        let vbx = fast(Vbx::with_runner(&mock)).stop_timeout(Some(Duration::ZERO));
        let mut m = machine_in(MachineState::Running);
        let err = vbx.stop(&mut m).await.unwrap_err();
        assert!(matches!(err, VbxError::StopTimeout { .. }));
        // Deadline already expired: no button press was issued.
        assert_eq!(mock.call_count(), 0);
        assert_eq!(m.state, MachineState::Running);
    }

    #[tokio::test]
    async fn stop_propagates_refresh_failure() {
        let mock = MockRunner::new(|args: &[String]| {
            if args[0] == "showvminfo" {
                fail("VBoxManage: error: something broke")
            } else {
                ok("")
            }
        });
        let vbx = fast(Vbx::with_runner(&mock));
        let mut m = machine_in(MachineState::Running);
        let err = vbx.stop(&mut m).await.unwrap_err();
        assert!(matches!(err, VbxError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn poweroff_forces_running_machine() {
        let mock = MockRunner::new(|_| ok(""));
        let vbx = Vbx::with_runner(&mock);
        vbx.poweroff(&machine_in(MachineState::Running))
            .await
            .unwrap();
        assert_eq!(mock.calls(), vec![argv(&["controlvm", "demo", "poweroff"])]);
    }

    #[tokio::test]
    async fn poweroff_is_noop_when_aborted() {
        let mock = MockRunner::new(|_| ok(""));
        let vbx = Vbx::with_runner(&mock);
        vbx.poweroff(&machine_in(MachineState::Aborted))
            .await
            .unwrap();
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn restart_cycles_running_machine() {
        let mock = scripted_states(&["poweroff"]);
        let vbx = fast(Vbx::with_runner(&mock));
        let mut m = machine_in(MachineState::Running);
        vbx.restart(&mut m).await.unwrap();

        let verbs: Vec<String> = mock.calls().iter().map(|c| c[0].clone()).collect();
        assert_eq!(verbs, vec!["controlvm", "showvminfo", "startvm"]);
    }

    #[tokio::test]
    async fn restart_starts_saved_machine_first() {
        // Saved → start → observed running → stop cycle → start again.
        let mock = scripted_states(&["running", "poweroff"]);
        let vbx = fast(Vbx::with_runner(&mock));
        let mut m = machine_in(MachineState::Saved);
        vbx.restart(&mut m).await.unwrap();

        let calls = mock.calls();
        assert_eq!(calls[0], argv(&["startvm", "demo", "--type", "headless"]));
        assert_eq!(
            calls.last().unwrap(),
            &argv(&["startvm", "demo", "--type", "headless"])
        );
        assert!(calls.iter().any(|c| c[2] == "acpipowerbutton"));
    }

    #[tokio::test]
    async fn reset_starts_paused_machine_first() {
        let mock = MockRunner::new(|_| ok(""));
        let vbx = Vbx::with_runner(&mock);
        vbx.reset(&machine_in(MachineState::Paused)).await.unwrap();
        assert_eq!(
            mock.calls(),
            vec![
                argv(&["controlvm", "demo", "resume"]),
                argv(&["controlvm", "demo", "reset"]),
            ]
        );
    }

    #[tokio::test]
    async fn delete_powers_off_then_unregisters() {
        let mock = MockRunner::new(|_| ok(""));
        let vbx = Vbx::with_runner(&mock);
        vbx.delete(machine_in(MachineState::Running)).await.unwrap();
        assert_eq!(
            mock.calls(),
            vec![
                argv(&["controlvm", "demo", "poweroff"]),
                argv(&["unregistervm", "demo", "--delete"]),
            ]
        );
    }

    #[tokio::test]
    async fn delete_skips_poweroff_when_already_off() {
        let mock = MockRunner::new(|_| ok(""));
        let vbx = Vbx::with_runner(&mock);
        vbx.delete(machine_in(MachineState::Poweroff))
            .await
            .unwrap();
        assert_eq!(
            mock.calls(),
            vec![argv(&["unregistervm", "demo", "--delete"])]
        );
    }

    #[tokio::test]
    async fn refresh_replaces_whole_snapshot_and_is_idempotent() {
        let mock = scripted_states(&["running"]);
        let vbx = Vbx::with_runner(&mock);
        let mut m = machine_in(MachineState::Poweroff);
        vbx.refresh(&mut m).await.unwrap();
        let first = m.clone();
        assert_eq!(m.state, MachineState::Running);
        assert_eq!(m.memory_mb, 512);

        vbx.refresh(&mut m).await.unwrap();
        assert_eq!(m, first);
    }

    #[tokio::test]
    async fn failed_refresh_leaves_snapshot_untouched() {
        let mock = MockRunner::new(|_| fail("VBoxManage: error: transient"));
        let vbx = Vbx::with_runner(&mock);
        let mut m = machine_in(MachineState::Running);
        m.memory_mb = 2048;
        let before = m.clone();
        assert!(vbx.refresh(&mut m).await.is_err());
        assert_eq!(m, before);
    }

    #[tokio::test]
    async fn modify_applies_only_first_four_boot_slots() {
        let mock = scripted_states(&["poweroff"]);
        let vbx = Vbx::with_runner(&mock);
        let mut m = machine_in(MachineState::Poweroff);
        m.boot_order = vec![
            BootDevice::Disk,
            BootDevice::Dvd,
            BootDevice::Net,
            BootDevice::Floppy,
            BootDevice::None,
        ];
        vbx.modify(&mut m).await.unwrap();

        let calls = mock.calls();
        let args = &calls[0];
        let boot1 = args.iter().position(|a| a == "--boot1").unwrap();
        assert_eq!(args[boot1 + 1], "disk");
        assert_eq!(args[boot1 + 2], "--boot2");
        assert_eq!(args[boot1 + 3], "dvd");
        assert_eq!(args[boot1 + 4], "--boot3");
        assert_eq!(args[boot1 + 5], "net");
        assert_eq!(args[boot1 + 6], "--boot4");
        assert_eq!(args[boot1 + 7], "floppy");
        assert!(!args.iter().any(|a| a == "--boot5"));
    }

    #[tokio::test]
    async fn modify_emits_every_flag_and_refreshes() {
        let mock = scripted_states(&["poweroff"]);
        let vbx = Vbx::with_runner(&mock);
        let mut m = machine_in(MachineState::Poweroff);
        m.flags.set(Flag::Acpi);
        m.flags.set(Flag::UsbXhci);
        vbx.modify(&mut m).await.unwrap();

        let calls = mock.calls();
        let args = &calls[0];
        let acpi = args.iter().position(|a| a == "--acpi").unwrap();
        assert_eq!(args[acpi + 1], "on");
        let pae = args.iter().position(|a| a == "--pae").unwrap();
        assert_eq!(args[pae + 1], "off");
        let xhci = args.iter().position(|a| a == "--usbxhci").unwrap();
        assert_eq!(args[xhci + 1], "on");
        // Applied then refreshed.
        assert_eq!(calls[1][0], "showvminfo");
    }

    #[tokio::test]
    async fn modify_simple_applies_subset() {
        let mock = scripted_states(&["poweroff"]);
        let vbx = Vbx::with_runner(&mock);
        let mut m = machine_in(MachineState::Poweroff);
        m.cpus = 4;
        m.memory_mb = 1024;
        m.flags.set(Flag::Usb);
        m.description = "build box".into();
        vbx.modify_simple(&mut m).await.unwrap();

        let calls = mock.calls();
        assert_eq!(
            calls[0],
            argv(&[
                "modifyvm",
                "demo",
                "--cpus",
                "4",
                "--memory",
                "1024",
                "--usb",
                "on",
                "--usbehci",
                "off",
                "--usbxhci",
                "off",
                "--description",
                "build box",
            ])
        );
        assert_eq!(calls[1][0], "showvminfo");
    }

    #[tokio::test]
    async fn command_failure_carries_stderr() {
        let mock = MockRunner::new(|_| fail("VBoxManage: error: VERR_SOMETHING\n"));
        let vbx = Vbx::with_runner(&mock);
        let err = vbx
            .poweroff(&machine_in(MachineState::Running))
            .await
            .unwrap_err();
        match err {
            VbxError::CommandFailed { command, stderr } => {
                assert_eq!(command, "controlvm");
                assert_eq!(stderr, "VBoxManage: error: VERR_SOMETHING");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
