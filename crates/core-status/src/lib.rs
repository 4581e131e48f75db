//! Status records and the severity ladder shared by every engine crate.
//!
//! Every fallible operation in the engine returns [`EdResult`], whose error
//! variant is a [`Status`]: a severity, an optional human-readable message,
//! and presentation flags. Severities form a total order; when two statuses
//! meet (e.g. a cleanup path fails while unwinding), the more severe one
//! wins unless `FORCE` is set on the weaker.
//!
//! `NotFound` and `Cancelled` deliberately sit *below* `Failure`: low-level
//! probes (symbol lookahead, motion past end-of-buffer, scan misses) report
//! `NotFound` without a message so callers can translate it, and a declined
//! confirmation prompt must not abort a running script.

use bitflags::bitflags;
use std::fmt;
use thiserror::Error;

/// Ordered severity ladder. Derived `Ord` follows declaration order, so
/// `Severity::Success < Severity::NotFound < ... < Severity::HelpExit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Success,
    NotFound,
    Cancelled,
    UserAbort,
    Failure,
    ScriptError,
    OsError,
    FatalError,
    Panic,
    UserExit,
    ScriptExit,
    HelpExit,
}

impl Severity {
    /// True for the exit family that terminates the session rather than the
    /// current operation.
    pub fn is_exit(self) -> bool {
        matches!(
            self,
            Severity::UserExit | Severity::ScriptExit | Severity::HelpExit
        )
    }

    /// Process exit code: 0 for normal and user exits, 1 otherwise.
    pub fn exit_code(self) -> i32 {
        match self {
            Severity::Success | Severity::UserExit => 0,
            _ => 1,
        }
    }
}

bitflags! {
    /// Presentation and merge-policy bits carried on a [`Status`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusFlags: u16 {
        /// Store this status even if it is not more severe than the current one.
        const FORCE     = 1 << 0;
        /// Do not overwrite an existing non-empty message.
        const KEEP_MSG  = 1 << 1;
        /// Success message priority (survives later plain success messages).
        const HI        = 1 << 2;
        /// Message must not be re-wrapped by the message line.
        const NO_WRAP   = 1 << 3;
        /// Message contains terminal attribute sentinels.
        const TERM_ATTR = 1 << 4;
        /// Format string is literal; no formatting was applied.
        const NO_FORMAT = 1 << 5;
        /// Set after the message is written so callers may append to it.
        const MSG_SET   = 1 << 6;
    }
}

/// A status record: severity plus optional message plus flags.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", self.display_message())]
pub struct Status {
    pub severity: Severity,
    msg: Option<String>,
    pub flags: StatusFlags,
}

/// Result type used throughout the engine.
pub type EdResult<T> = Result<T, Status>;

impl Status {
    pub fn new(severity: Severity, msg: impl Into<String>) -> Self {
        Self {
            severity,
            msg: Some(msg.into()),
            flags: StatusFlags::MSG_SET,
        }
    }

    /// A bare `NotFound`, carrying no message (the caller translates it).
    pub fn not_found() -> Self {
        Self {
            severity: Severity::NotFound,
            msg: None,
            flags: StatusFlags::empty(),
        }
    }

    /// A declined confirmation or similar soft stop.
    pub fn cancelled() -> Self {
        Self {
            severity: Severity::Cancelled,
            msg: None,
            flags: StatusFlags::empty(),
        }
    }

    /// The abort key was pressed.
    pub fn user_abort() -> Self {
        Self::new(Severity::UserAbort, "Abort")
    }

    pub fn failure(msg: impl Into<String>) -> Self {
        Self::new(Severity::Failure, msg)
    }

    pub fn script_error(msg: impl Into<String>) -> Self {
        Self::new(Severity::ScriptError, msg)
    }

    pub fn os_error(msg: impl Into<String>) -> Self {
        Self::new(Severity::OsError, msg)
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::new(Severity::FatalError, msg)
    }

    pub fn user_exit() -> Self {
        Self {
            severity: Severity::UserExit,
            msg: None,
            flags: StatusFlags::empty(),
        }
    }

    pub fn script_exit(msg: impl Into<String>) -> Self {
        Self::new(Severity::ScriptExit, msg)
    }

    pub fn with_flags(mut self, flags: StatusFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn message(&self) -> Option<&str> {
        self.msg.as_deref()
    }

    fn display_message(&self) -> String {
        match &self.msg {
            Some(m) => m.clone(),
            None => format!("{:?}", self.severity),
        }
    }

    /// Replace the message unless `KEEP_MSG` protects the existing one.
    pub fn set_message(&mut self, msg: impl Into<String>) {
        if self.flags.contains(StatusFlags::KEEP_MSG) && self.msg.is_some() {
            return;
        }
        self.msg = Some(msg.into());
        self.flags |= StatusFlags::MSG_SET;
    }

    /// Merge `other` into `self`, keeping the more severe record. `FORCE`
    /// on `other` stores it regardless.
    pub fn absorb(&mut self, other: Status) {
        if other.flags.contains(StatusFlags::FORCE) || other.severity > self.severity {
            let keep = self.flags.contains(StatusFlags::KEEP_MSG) && self.msg.is_some();
            let prior = self.msg.take();
            *self = other;
            if keep {
                self.msg = prior;
            }
        }
    }

    /// True if this status should stop ordinary command chaining.
    pub fn is_error(&self) -> bool {
        self.severity > Severity::Success
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Success => "success",
            Severity::NotFound => "not found",
            Severity::Cancelled => "cancelled",
            Severity::UserAbort => "user abort",
            Severity::Failure => "failure",
            Severity::ScriptError => "script error",
            Severity::OsError => "os error",
            Severity::FatalError => "fatal error",
            Severity::Panic => "panic",
            Severity::UserExit => "user exit",
            Severity::ScriptExit => "script exit",
            Severity::HelpExit => "help exit",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ladder_orders_as_declared() {
        assert!(Severity::Success < Severity::NotFound);
        assert!(Severity::NotFound < Severity::Cancelled);
        assert!(Severity::Cancelled < Severity::UserAbort);
        assert!(Severity::UserAbort < Severity::Failure);
        assert!(Severity::Failure < Severity::ScriptError);
        assert!(Severity::ScriptError < Severity::OsError);
        assert!(Severity::OsError < Severity::FatalError);
        assert!(Severity::Panic < Severity::UserExit);
        assert!(Severity::UserExit < Severity::ScriptExit);
        assert!(Severity::ScriptExit < Severity::HelpExit);
    }

    #[test]
    fn not_found_carries_no_message() {
        let st = Status::not_found();
        assert_eq!(st.severity, Severity::NotFound);
        assert!(st.message().is_none());
        assert!(!st.flags.contains(StatusFlags::MSG_SET));
    }

    #[test]
    fn absorb_prefers_more_severe() {
        let mut st = Status::failure("first");
        st.absorb(Status::not_found());
        assert_eq!(st.severity, Severity::Failure);
        st.absorb(Status::script_error("second"));
        assert_eq!(st.severity, Severity::ScriptError);
        assert_eq!(st.message(), Some("second"));
    }

    #[test]
    fn absorb_force_overrides_severity() {
        let mut st = Status::script_error("boom");
        st.absorb(Status::new(Severity::Success, "ok").with_flags(StatusFlags::FORCE));
        assert_eq!(st.severity, Severity::Success);
        assert_eq!(st.message(), Some("ok"));
    }

    #[test]
    fn keep_msg_preserves_existing_message() {
        let mut st = Status::failure("original").with_flags(StatusFlags::KEEP_MSG);
        st.set_message("replacement");
        assert_eq!(st.message(), Some("original"));
    }

    #[test]
    fn exit_codes_match_contract() {
        assert_eq!(Severity::Success.exit_code(), 0);
        assert_eq!(Severity::UserExit.exit_code(), 0);
        assert_eq!(Severity::FatalError.exit_code(), 1);
        assert_eq!(Severity::HelpExit.exit_code(), 1);
    }
}
