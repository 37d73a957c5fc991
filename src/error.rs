use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum VbxError {
    #[error("machine '{id}' does not exist")]
    MachineNotFound { id: String },

    #[error("machine '{name}' already exists")]
    MachineExists { name: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("failed to parse {field} value '{value}' from VBoxManage output")]
    Parse { field: &'static str, value: String },

    #[error("VBoxManage {command} failed: {stderr}")]
    #[diagnostic(help("run with --verbose to see the full command line"))]
    CommandFailed { command: String, stderr: String },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("machine '{id}' did not power off within {waited_s}s")]
    #[diagnostic(help(
        "the guest may be ignoring the ACPI power button; `vbx poweroff` forces it off"
    ))]
    StopTimeout { id: String, waited_s: u64 },

    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}: {message}")]
    ConfigParse { path: String, message: String },
}
