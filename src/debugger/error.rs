use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- configuration errors --------------------------------------
    #[error("no debugger executable configured")]
    NoDebuggerConfigured,
    #[error("debugger executable not found: {0}")]
    DebuggerNotFound(PathBuf),
    #[error("config file parsing error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // --------------------------------- generic errors --------------------------------------------
    #[error(transparent)]
    IO(#[from] std::io::Error),

    // --------------------------------- debugger process errors -----------------------------------
    #[error("spawn debugger process: {0}")]
    Spawn(std::io::Error),
    #[error("debugger process not confirmed start in {0} ms")]
    StartTimeout(u64),
    #[error("debugger process exit before start confirmation")]
    StartAborted,
    #[error("debugger session already run")]
    AlreadyRun,

    // --------------------------------- store errors ----------------------------------------------
    #[error("breakpoint number {0} not found")]
    BreakpointNotFound(usize),
    #[error("invalid source line {0}, line numbers start from 1")]
    InvalidLine(u32),
}

impl Error {
    /// Return a hint to an interface - continue debugging after error or stop whole process.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::ConfigParse(_) => false,
            Error::IO(_) => false,
            Error::StartTimeout(_) => false,
            Error::StartAborted => false,
            Error::AlreadyRun => false,
            Error::BreakpointNotFound(_) => false,
            Error::InvalidLine(_) => false,

            // session can't be started at all
            Error::NoDebuggerConfigured => true,
            Error::DebuggerNotFound(_) => true,
            Error::Spawn(_) => true,
        }
    }
}

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "debugger", "{:#}", e);
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "debugger", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!(log::warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::warn, $res, $msg)
    };
}

/// Transforms `Result` into `Option` and put error into debug logs if it occurs.
#[macro_export]
macro_rules! muted_error {
    ($res: expr) => {
        $crate::_error!(log::debug, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::debug, $res, $msg)
    };
}
