//! Invocation of the external VBoxManage binary.
//!
//! [`Runner`] is the seam between the control layer and the real tool:
//! production code uses [`VBoxManage`], tests script a mock. The runner
//! reports a non-zero exit as a normal [`CmdOutput`] rather than an error,
//! because callers need to pattern-match stderr (e.g. the not-found
//! marker) before deciding which error the failure maps to.

use std::path::PathBuf;

use crate::error::VbxError;

/// Captured result of one external invocation.
#[derive(Debug, Clone)]
pub struct CmdOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

#[allow(async_fn_in_trait)] // implementors are selected statically, no dyn use
pub trait Runner {
    /// Run the management tool with the given arguments and capture its
    /// output. `Err` means the process could not be run at all; a failing
    /// exit status comes back as `CmdOutput { success: false, .. }`.
    async fn run(&self, args: &[String]) -> Result<CmdOutput, VbxError>;
}

/// Production runner: spawns the `VBoxManage` binary.
#[derive(Debug, Clone)]
pub struct VBoxManage {
    binary: PathBuf,
}

impl VBoxManage {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Resolve the binary from the `VBX_MANAGE` environment variable,
    /// falling back to `VBoxManage` on the PATH.
    pub fn from_env() -> Self {
        let binary = std::env::var_os("VBX_MANAGE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("VBoxManage"));
        Self { binary }
    }
}

impl Runner for VBoxManage {
    async fn run(&self, args: &[String]) -> Result<CmdOutput, VbxError> {
        tracing::debug!(binary = %self.binary.display(), ?args, "running VBoxManage");

        let output = tokio::process::Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| VbxError::Io {
                context: format!("running {}", self.binary.display()),
                source: e,
            })?;

        Ok(CmdOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
        })
    }
}

// ── Test support ─────────────────────────────────────────

#[cfg(test)]
pub(crate) mod mock {
    use std::sync::Mutex;

    use super::{CmdOutput, Runner};
    use crate::error::VbxError;

    type Handler = Box<dyn Fn(&[String]) -> Result<CmdOutput, VbxError> + Send + Sync>;

    /// Scripted runner that records every invocation.
    pub(crate) struct MockRunner {
        handler: Handler,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl MockRunner {
        pub fn new<F>(handler: F) -> Self
        where
            F: Fn(&[String]) -> Result<CmdOutput, VbxError> + Send + Sync + 'static,
        {
            Self {
                handler: Box::new(handler),
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Every recorded argument list, in invocation order.
        pub fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl Runner for &MockRunner {
        async fn run(&self, args: &[String]) -> Result<CmdOutput, VbxError> {
            self.calls.lock().unwrap().push(args.to_vec());
            (self.handler)(args)
        }
    }

    pub(crate) fn ok(stdout: &str) -> Result<CmdOutput, VbxError> {
        Ok(CmdOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            success: true,
        })
    }

    pub(crate) fn fail(stderr: &str) -> Result<CmdOutput, VbxError> {
        Ok(CmdOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            success: false,
        })
    }
}
