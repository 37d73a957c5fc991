use std::io::IsTerminal;
use std::time::Duration;

use clap::Parser;
use console::style;
use indicatif::ProgressBar;
use tracing_subscriber::EnvFilter;

use vbx::cli::{Cli, Command};
use vbx::config::Config;
use vbx::error::VbxError;
use vbx::machine::{Flag, MachineState};
use vbx::vbox::Vbx;

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
            .add_directive("vbx=warn".parse().expect("valid log directive"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::resolve(cli.config.as_deref())?;

    // A per-invocation --timeout wins over the configured default.
    let stop_timeout = match &cli.command {
        Command::Stop {
            timeout: Some(secs),
            ..
        } => Some(Duration::from_secs(*secs)),
        _ => config.stop_timeout(),
    };

    let vbx = Vbx::with_runner(config.runner())
        .poll_interval(config.poll_interval())
        .stop_timeout(stop_timeout);

    match cli.command {
        Command::List => run_list(&vbx).await?,
        Command::Info { id } => run_info(&vbx, &id).await?,
        Command::Create { name, basefolder } => {
            run_create(&vbx, &name, basefolder.as_deref()).await?
        }
        Command::Start { id } => run_start(&vbx, &id).await?,
        Command::Stop { id, .. } => run_stop(&vbx, &id).await?,
        Command::Save { id } => run_save(&vbx, &id).await?,
        Command::Pause { id } => run_pause(&vbx, &id).await?,
        Command::Poweroff { id } => run_poweroff(&vbx, &id).await?,
        Command::Restart { id } => run_restart(&vbx, &id).await?,
        Command::Reset { id } => run_reset(&vbx, &id).await?,
        Command::Delete { id, force } => run_delete(&vbx, &id, force).await?,
        Command::Modify {
            id,
            cpus,
            memory,
            description,
            usb,
        } => run_modify(&vbx, &id, cpus, memory, description, usb).await?,
    }

    Ok(())
}

async fn run_list(vbx: &Vbx) -> Result<(), VbxError> {
    let machines = vbx.list_machines().await?;
    if machines.is_empty() {
        println!("No machines registered.");
        return Ok(());
    }
    for m in &machines {
        println!(
            "{}  {}  {}",
            style(&m.name).bold(),
            style(&m.uuid).dim(),
            styled_state(m.state)
        );
    }
    Ok(())
}

async fn run_info(vbx: &Vbx, id: &str) -> Result<(), VbxError> {
    let m = vbx.get_machine(id).await?;
    println!("Name:         {}", m.name);
    println!("UUID:         {}", m.uuid);
    println!("State:        {}", styled_state(m.state));
    println!("OS type:      {}", m.os_type);
    println!("CPUs:         {}", m.cpus);
    println!("Memory:       {} MB", m.memory_mb);
    println!("Video memory: {} MB", m.vram_mb);
    println!("Config file:  {}", m.cfg_file);
    println!("Base folder:  {}", m.base_folder);
    if !m.description.is_empty() {
        println!("Description:  {}", m.description);
    }
    Ok(())
}

async fn run_create(vbx: &Vbx, name: &str, basefolder: Option<&str>) -> Result<(), VbxError> {
    let m = vbx.create_machine(name, basefolder).await?;
    println!("Machine '{}' created ({}).", m.name, m.uuid);
    Ok(())
}

async fn run_start(vbx: &Vbx, id: &str) -> Result<(), VbxError> {
    let m = vbx.get_machine(id).await?;
    if m.state == MachineState::Running {
        println!("Machine '{}' is already running.", m.id());
        return Ok(());
    }
    vbx.start(&m).await?;
    println!("Machine '{}' started.", m.id());
    Ok(())
}

async fn run_stop(vbx: &Vbx, id: &str) -> Result<(), VbxError> {
    let mut m = vbx.get_machine(id).await?;
    if is_down(m.state) {
        println!("Machine '{}' is not running.", m.id());
        return Ok(());
    }

    let spinner = wait_spinner(format!("Waiting for '{}' to power off...", m.id()));
    let result = vbx.stop(&mut m).await;
    if let Some(s) = spinner {
        s.finish_and_clear();
    }
    result?;
    println!("Machine '{}' stopped.", m.id());
    Ok(())
}

async fn run_save(vbx: &Vbx, id: &str) -> Result<(), VbxError> {
    let m = vbx.get_machine(id).await?;
    if is_down(m.state) {
        println!("Machine '{}' is not running, nothing to save.", m.id());
        return Ok(());
    }
    vbx.save(&m).await?;
    println!("Machine '{}' saved.", m.id());
    Ok(())
}

async fn run_pause(vbx: &Vbx, id: &str) -> Result<(), VbxError> {
    let m = vbx.get_machine(id).await?;
    if m.state != MachineState::Running {
        println!("Machine '{}' is not running.", m.id());
        return Ok(());
    }
    vbx.pause(&m).await?;
    println!("Machine '{}' paused.", m.id());
    Ok(())
}

async fn run_poweroff(vbx: &Vbx, id: &str) -> Result<(), VbxError> {
    let m = vbx.get_machine(id).await?;
    if is_down(m.state) {
        println!("Machine '{}' is already off.", m.id());
        return Ok(());
    }
    vbx.poweroff(&m).await?;
    println!("Machine '{}' powered off.", m.id());
    Ok(())
}

async fn run_restart(vbx: &Vbx, id: &str) -> Result<(), VbxError> {
    let mut m = vbx.get_machine(id).await?;

    let spinner = wait_spinner(format!("Restarting '{}'...", m.id()));
    let result = vbx.restart(&mut m).await;
    if let Some(s) = spinner {
        s.finish_and_clear();
    }
    result?;
    println!("Machine '{}' restarted.", m.id());
    Ok(())
}

async fn run_reset(vbx: &Vbx, id: &str) -> Result<(), VbxError> {
    let m = vbx.get_machine(id).await?;
    vbx.reset(&m).await?;
    println!("Machine '{}' reset.", m.id());
    Ok(())
}

async fn run_delete(vbx: &Vbx, id: &str, force: bool) -> Result<(), VbxError> {
    let m = vbx.get_machine(id).await?;

    if !force {
        if !std::io::stderr().is_terminal() {
            return Err(VbxError::Validation {
                message: "refusing to delete without --force in a non-interactive session".into(),
            });
        }
        let prompt = format!("Delete machine '{}' and all of its files?", m.id());
        let confirmed = match inquire::Confirm::new(&prompt).with_default(false).prompt() {
            Ok(v) => v,
            Err(
                inquire::InquireError::OperationCanceled
                | inquire::InquireError::OperationInterrupted,
            ) => false,
            Err(other) => {
                return Err(VbxError::Validation {
                    message: format!("prompt error: {other}"),
                });
            }
        };
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let id = m.id().to_string();
    vbx.delete(m).await?;
    println!("Machine '{id}' deleted.");
    Ok(())
}

async fn run_modify(
    vbx: &Vbx,
    id: &str,
    cpus: Option<u32>,
    memory: Option<u32>,
    description: Option<String>,
    usb: Option<vbx::cli::Toggle>,
) -> Result<(), VbxError> {
    let mut m = vbx.get_machine(id).await?;
    if let Some(cpus) = cpus {
        m.cpus = cpus;
    }
    if let Some(memory) = memory {
        m.memory_mb = memory;
    }
    if let Some(description) = description {
        m.description = description;
    }
    if let Some(toggle) = usb {
        m.flags.set_to(Flag::Usb, toggle.into());
    }
    vbx.modify_simple(&mut m).await?;
    println!("Machine '{}' updated.", m.id());
    Ok(())
}

fn is_down(state: MachineState) -> bool {
    matches!(
        state,
        MachineState::Poweroff | MachineState::Aborted | MachineState::Saved
    )
}

fn styled_state(state: MachineState) -> console::StyledObject<&'static str> {
    let text = state.as_str();
    match state {
        MachineState::Running => style(text).green(),
        MachineState::Paused => style(text).yellow(),
        MachineState::Saved => style(text).cyan(),
        MachineState::Poweroff | MachineState::Aborted => style(text).red(),
    }
}

/// Spinner while a poll loop runs, suppressed off-terminal so plain
/// output stays clean.
fn wait_spinner(message: String) -> Option<ProgressBar> {
    if !std::io::stderr().is_terminal() {
        return None;
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(120));
    Some(spinner)
}
