// common.rs — console output, tracing setup and command line arguments

use thiserror::Error;

/// Maximum number of command line arguments kept by [`ComArgs`].
pub const MAX_NUM_ARGVS: usize = 50;

/// Errors raised while bringing up the shared services.
#[derive(Debug, Error)]
pub enum CommonError {
    #[error("tracing init failed: {0}")]
    TracingInit(String),
}

// ============================================================
// Console output
// ============================================================

/// Print a user-facing console line. Diagnostics go through `tracing`;
/// this is for the lines the user is meant to read.
pub fn com_printf(msg: &str) {
    print!("{}", msg);
}

/// Print a fatal, user-visible diagnostic to stderr.
pub fn com_error(msg: &str) {
    eprintln!("********************\nERROR: {}\n********************", msg);
}

/// Install the global `tracing` subscriber.
///
/// `developer` selects `debug` over `info`. `RUST_LOG`, when set, takes
/// precedence so individual modules can be tuned without rebuilding.
///
/// Fails with [`CommonError::TracingInit`] when a global subscriber is
/// already installed.
pub fn init_tracing(developer: bool) -> Result<(), CommonError> {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if developer { "debug" } else { "info" };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .compact()
        .with_env_filter(env_filter)
        .with_target(developer)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init()
        .map_err(|e| CommonError::TracingInit(e.to_string()))
}

// ============================================================
// Command line arguments
// ============================================================

pub struct ComArgs {
    pub argc: usize,
    pub argv: Vec<String>,
}

impl ComArgs {
    pub fn new() -> Self {
        Self {
            argc: 0,
            argv: Vec::new(),
        }
    }

    pub fn init(&mut self, args: &[String]) {
        self.argc = args.len().min(MAX_NUM_ARGVS);
        self.argv = args[..self.argc].to_vec();
    }

    pub fn com_argc(&self) -> usize {
        self.argc
    }

    pub fn com_argv(&self, arg: usize) -> &str {
        if arg >= self.argc {
            ""
        } else {
            &self.argv[arg]
        }
    }

    pub fn com_clear_argv(&mut self, arg: usize) {
        if arg < self.argc {
            self.argv[arg] = String::new();
        }
    }

    /// Returns the index of `parm` in argv, or `None` if it was not given.
    pub fn com_check_parm(&self, parm: &str) -> Option<usize> {
        (1..self.argc).find(|&i| self.argv[i] == parm)
    }
}

impl Default for ComArgs {
    fn default() -> Self {
        Self::new()
    }
}
