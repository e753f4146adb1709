use serde::{Deserialize, Serialize};

/// Kit lifecycle state.
///
/// `InProgress` is a reportable state with no automatic trigger today; kits
/// move from `Pending` straight to `Complete` or `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KitStatus {
    Pending,
    InProgress,
    Complete,
    Cancelled,
}

impl KitStatus {
    pub fn label(self) -> &'static str {
        match self {
            KitStatus::Pending => "Pending",
            KitStatus::InProgress => "In progress",
            KitStatus::Complete => "Complete",
            KitStatus::Cancelled => "Cancelled",
        }
    }

    /// Closed kits accept no further mutation.
    pub fn is_closed(self) -> bool {
        matches!(self, KitStatus::Complete | KitStatus::Cancelled)
    }
}
