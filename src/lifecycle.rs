//! Pure routing tables for lifecycle transitions.
//!
//! Each operation maps the observed machine state to a small plan; issuing
//! the VBoxManage commands a plan calls for lives in `vbox.rs`. Keeping
//! the routing pure lets the from-state behavior be tested exhaustively
//! without a hypervisor.

use crate::machine::MachineState;

/// What `Start` does from a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StartPlan {
    /// `controlvm resume` — the machine is paused.
    Resume,
    /// `startvm --type headless` — the machine is down or suspended.
    StartHeadless,
    /// Already running.
    Noop,
}

pub(crate) fn route_start(state: MachineState) -> StartPlan {
    match state {
        MachineState::Paused => StartPlan::Resume,
        MachineState::Poweroff | MachineState::Saved | MachineState::Aborted => {
            StartPlan::StartHeadless
        }
        MachineState::Running => StartPlan::Noop,
    }
}

/// What `Save` does from a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SavePlan {
    /// Resume first, then `controlvm savestate`.
    ResumeThenSave,
    /// `controlvm savestate` directly.
    Save,
    /// Nothing to save.
    Noop,
}

pub(crate) fn route_save(state: MachineState) -> SavePlan {
    match state {
        MachineState::Paused => SavePlan::ResumeThenSave,
        MachineState::Poweroff | MachineState::Aborted | MachineState::Saved => SavePlan::Noop,
        MachineState::Running => SavePlan::Save,
    }
}

/// What `Pause` does from a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PausePlan {
    Pause,
    Noop,
}

pub(crate) fn route_pause(state: MachineState) -> PausePlan {
    match state {
        MachineState::Running => PausePlan::Pause,
        MachineState::Paused
        | MachineState::Poweroff
        | MachineState::Aborted
        | MachineState::Saved => PausePlan::Noop,
    }
}

/// What `Stop` does from a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopPlan {
    /// Resume first, then enter the power-button poll loop.
    ResumeThenPoll,
    /// Enter the power-button poll loop directly.
    Poll,
    /// Already down.
    Noop,
}

pub(crate) fn route_stop(state: MachineState) -> StopPlan {
    match state {
        MachineState::Poweroff | MachineState::Aborted | MachineState::Saved => StopPlan::Noop,
        MachineState::Paused => StopPlan::ResumeThenPoll,
        MachineState::Running => StopPlan::Poll,
    }
}

/// What `Poweroff` does from a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PoweroffPlan {
    Force,
    Noop,
}

pub(crate) fn route_poweroff(state: MachineState) -> PoweroffPlan {
    match state {
        MachineState::Poweroff | MachineState::Aborted | MachineState::Saved => PoweroffPlan::Noop,
        MachineState::Running | MachineState::Paused => PoweroffPlan::Force,
    }
}

/// Whether `Restart`/`Reset` must start the machine before acting.
/// A paused or suspended machine cannot take a stop or reset directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PrestartPlan {
    Start,
    Skip,
}

pub(crate) fn route_prestart(state: MachineState) -> PrestartPlan {
    match state {
        MachineState::Paused | MachineState::Saved => PrestartPlan::Start,
        MachineState::Poweroff | MachineState::Running | MachineState::Aborted => {
            PrestartPlan::Skip
        }
    }
}

// ── Tests ────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::MachineState::*;

    #[test]
    fn start_routing() {
        assert_eq!(route_start(Paused), StartPlan::Resume);
        assert_eq!(route_start(Poweroff), StartPlan::StartHeadless);
        assert_eq!(route_start(Saved), StartPlan::StartHeadless);
        assert_eq!(route_start(Aborted), StartPlan::StartHeadless);
        assert_eq!(route_start(Running), StartPlan::Noop);
    }

    #[test]
    fn save_routing() {
        assert_eq!(route_save(Paused), SavePlan::ResumeThenSave);
        assert_eq!(route_save(Poweroff), SavePlan::Noop);
        assert_eq!(route_save(Aborted), SavePlan::Noop);
        assert_eq!(route_save(Saved), SavePlan::Noop);
        assert_eq!(route_save(Running), SavePlan::Save);
    }

    #[test]
    fn pause_routing() {
        assert_eq!(route_pause(Running), PausePlan::Pause);
        assert_eq!(route_pause(Paused), PausePlan::Noop);
        assert_eq!(route_pause(Poweroff), PausePlan::Noop);
        assert_eq!(route_pause(Aborted), PausePlan::Noop);
        assert_eq!(route_pause(Saved), PausePlan::Noop);
    }

    #[test]
    fn stop_routing() {
        assert_eq!(route_stop(Poweroff), StopPlan::Noop);
        assert_eq!(route_stop(Aborted), StopPlan::Noop);
        assert_eq!(route_stop(Saved), StopPlan::Noop);
        assert_eq!(route_stop(Paused), StopPlan::ResumeThenPoll);
        assert_eq!(route_stop(Running), StopPlan::Poll);
    }

    #[test]
    fn poweroff_routing() {
        assert_eq!(route_poweroff(Poweroff), PoweroffPlan::Noop);
        assert_eq!(route_poweroff(Aborted), PoweroffPlan::Noop);
        assert_eq!(route_poweroff(Saved), PoweroffPlan::Noop);
        assert_eq!(route_poweroff(Running), PoweroffPlan::Force);
        assert_eq!(route_poweroff(Paused), PoweroffPlan::Force);
    }

    #[test]
    fn prestart_routing() {
        assert_eq!(route_prestart(Paused), PrestartPlan::Start);
        assert_eq!(route_prestart(Saved), PrestartPlan::Start);
        assert_eq!(route_prestart(Poweroff), PrestartPlan::Skip);
        assert_eq!(route_prestart(Running), PrestartPlan::Skip);
        assert_eq!(route_prestart(Aborted), PrestartPlan::Skip);
    }
}
