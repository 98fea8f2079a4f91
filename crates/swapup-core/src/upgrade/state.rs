//! Upgrade state machine vocabulary.

use std::fmt;

/// Phase of an upgrade run.
///
/// Initial state is `Idle`; `Success`, `Failed` and `Cancelled` are
/// terminal. Exactly one run owns the state at a time and its transitions
/// are serialized on the worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeState {
    /// No run active.
    Idle,
    /// Announcing images to the device and awaiting acceptance.
    Validate,
    /// Streaming image content in chunks.
    Upload,
    /// Asking the device to boot the uploaded image once.
    Test,
    /// Making the uploaded image permanent.
    Confirm,
    /// Device is rebooting into the swapped image.
    Reset,
    /// Terminal: swap finished and the device came back.
    Success,
    /// Terminal: a phase failed.
    Failed,
    /// Terminal: the caller cancelled the run.
    Cancelled,
}

impl UpgradeState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UpgradeState::Success | UpgradeState::Failed | UpgradeState::Cancelled
        )
    }

    /// Whether a run is between start and its terminal transition.
    pub fn is_active(&self) -> bool {
        !matches!(self, UpgradeState::Idle) && !self.is_terminal()
    }
}

impl fmt::Display for UpgradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpgradeState::Idle => write!(f, "IDLE"),
            UpgradeState::Validate => write!(f, "VALIDATE"),
            UpgradeState::Upload => write!(f, "UPLOAD"),
            UpgradeState::Test => write!(f, "TEST"),
            UpgradeState::Confirm => write!(f, "CONFIRM"),
            UpgradeState::Reset => write!(f, "RESET"),
            UpgradeState::Success => write!(f, "SUCCESS"),
            UpgradeState::Failed => write!(f, "FAILED"),
            UpgradeState::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// How far past the upload the run goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpgradeMode {
    /// Test boot, then confirm (two reboots on the device side are avoided
    /// by confirming before the reset).
    #[default]
    TestAndConfirm,
    /// Test boot only; the device reverts unless something else confirms.
    TestOnly,
    /// Confirm immediately, no test boot.
    ConfirmOnly,
}

impl UpgradeMode {
    /// Phase entered once every image is uploaded.
    pub fn after_upload(&self) -> UpgradeState {
        match self {
            UpgradeMode::TestAndConfirm | UpgradeMode::TestOnly => UpgradeState::Test,
            UpgradeMode::ConfirmOnly => UpgradeState::Confirm,
        }
    }

    /// Phase entered once the test marks are acknowledged.
    pub fn after_test(&self) -> UpgradeState {
        match self {
            UpgradeMode::TestAndConfirm => UpgradeState::Confirm,
            UpgradeMode::TestOnly => UpgradeState::Reset,
            // ConfirmOnly never reaches Test.
            UpgradeMode::ConfirmOnly => UpgradeState::Confirm,
        }
    }
}

impl fmt::Display for UpgradeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpgradeMode::TestAndConfirm => write!(f, "test+confirm"),
            UpgradeMode::TestOnly => write!(f, "test-only"),
            UpgradeMode::ConfirmOnly => write!(f, "confirm-only"),
        }
    }
}

/// Whether `from -> to` is an edge of the state graph.
///
/// Every non-terminal state may move to `Cancelled`; every phase may move
/// to `Failed`; the forward edges are mode-dependent but this predicate
/// accepts the union over all modes.
pub fn is_valid_transition(from: UpgradeState, to: UpgradeState) -> bool {
    use UpgradeState::*;
    if from.is_terminal() {
        return false;
    }
    if to == Cancelled {
        return true;
    }
    match (from, to) {
        (Idle, Validate) => true,
        (Validate, Upload) | (Validate, Failed) => true,
        (Upload, Test) | (Upload, Confirm) | (Upload, Failed) => true,
        (Test, Confirm) | (Test, Reset) | (Test, Failed) => true,
        (Confirm, Reset) | (Confirm, Failed) => true,
        (Reset, Success) | (Reset, Failed) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(UpgradeState::Success.is_terminal());
        assert!(UpgradeState::Failed.is_terminal());
        assert!(UpgradeState::Cancelled.is_terminal());
        assert!(!UpgradeState::Idle.is_terminal());
        assert!(!UpgradeState::Reset.is_terminal());
    }

    #[test]
    fn test_active_states() {
        assert!(!UpgradeState::Idle.is_active());
        assert!(UpgradeState::Upload.is_active());
        assert!(!UpgradeState::Cancelled.is_active());
    }

    #[test]
    fn test_forward_edges() {
        use UpgradeState::*;
        assert!(is_valid_transition(Idle, Validate));
        assert!(is_valid_transition(Validate, Upload));
        assert!(is_valid_transition(Upload, Test));
        assert!(is_valid_transition(Upload, Confirm));
        assert!(is_valid_transition(Test, Confirm));
        assert!(is_valid_transition(Test, Reset));
        assert!(is_valid_transition(Confirm, Reset));
        assert!(is_valid_transition(Reset, Success));
    }

    #[test]
    fn test_invalid_edges() {
        use UpgradeState::*;
        assert!(!is_valid_transition(Idle, Upload));
        assert!(!is_valid_transition(Upload, Reset));
        assert!(!is_valid_transition(Confirm, Test));
        assert!(!is_valid_transition(Reset, Upload));
        assert!(!is_valid_transition(Success, Validate));
        assert!(!is_valid_transition(Cancelled, Cancelled));
    }

    #[test]
    fn test_failure_and_cancel_edges() {
        use UpgradeState::*;
        for phase in [Validate, Upload, Test, Confirm, Reset] {
            assert!(is_valid_transition(phase, Failed));
            assert!(is_valid_transition(phase, Cancelled));
        }
        assert!(!is_valid_transition(Success, Cancelled));
    }

    #[test]
    fn test_mode_successors() {
        assert_eq!(
            UpgradeMode::TestAndConfirm.after_upload(),
            UpgradeState::Test
        );
        assert_eq!(UpgradeMode::TestOnly.after_upload(), UpgradeState::Test);
        assert_eq!(
            UpgradeMode::ConfirmOnly.after_upload(),
            UpgradeState::Confirm
        );
        assert_eq!(
            UpgradeMode::TestAndConfirm.after_test(),
            UpgradeState::Confirm
        );
        assert_eq!(UpgradeMode::TestOnly.after_test(), UpgradeState::Reset);
    }

    #[test]
    fn test_display() {
        assert_eq!(UpgradeState::Upload.to_string(), "UPLOAD");
        assert_eq!(UpgradeMode::TestOnly.to_string(), "test-only");
    }
}
