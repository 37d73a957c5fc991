use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "vbx", about = "VirtualBox VM lifecycle management via VBoxManage")]
pub struct Cli {
    /// Path to config file (default: ./vbx.toml, then the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List registered machines
    List,

    /// Show a machine's configuration and state
    Info {
        /// Machine name or UUID
        id: String,
    },

    /// Create and register a new machine
    Create {
        name: String,

        /// Directory to store the machine's files under
        #[arg(long)]
        basefolder: Option<String>,
    },

    /// Start a machine headless (resumes it when paused)
    Start { id: String },

    /// Press the ACPI power button and wait until the machine is off
    Stop {
        id: String,

        /// Give up after this many seconds instead of waiting forever
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Suspend a machine to disk
    Save { id: String },

    /// Pause a running machine
    Pause { id: String },

    /// Force a machine off, discarding unsaved state
    Poweroff { id: String },

    /// Gracefully stop a machine, then start it again
    Restart { id: String },

    /// Force a reset, discarding unsaved state
    Reset { id: String },

    /// Unregister a machine and delete its files
    Delete {
        id: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Change machine settings
    Modify {
        id: String,

        /// CPU count
        #[arg(long)]
        cpus: Option<u32>,

        /// Main memory in MB
        #[arg(long)]
        memory: Option<u32>,

        /// Free-text description
        #[arg(long)]
        description: Option<String>,

        /// Toggle the USB controller
        #[arg(long, value_enum)]
        usb: Option<Toggle>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum Toggle {
    On,
    Off,
}

impl From<Toggle> for bool {
    fn from(t: Toggle) -> bool {
        matches!(t, Toggle::On)
    }
}
