use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "queuestatus", rename_all = "lowercase")]
pub(crate) enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Warning,
    Failed,
}

impl QueueStatus {
    pub(crate) const ALL: [QueueStatus; 5] =
        [Self::Pending, Self::Processing, Self::Completed, Self::Warning, Self::Failed];

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Warning => "warning",
            Self::Failed => "failed",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == value.trim().to_ascii_lowercase())
    }

    /// States a manual retry may reset to `pending`.
    pub(crate) fn is_retryable(self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}
