use census_system::SendError;

/// Broad classification of a [`StatsError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request contained invalid input.
    Validation,
    /// The request conflicts with existing state.
    Conflict,
    /// The request refers to something that does not exist.
    NotFound,
    /// The stats service is no longer running.
    Unavailable,
}

/// An error returned by the stats service.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StatsError {
    /// A measure or view name is empty, too long or contains non-printable characters.
    #[error("invalid name {0:?}: must be 1 to 255 printable ASCII characters")]
    InvalidName(String),
    /// The aggregation of a view cannot be used.
    #[error("invalid aggregation for view {view:?}: {reason}")]
    InvalidAggregation {
        /// The name of the offending view.
        view: String,
        /// What is wrong with the aggregation.
        reason: &'static str,
    },
    /// A view with the same name but a different definition is already registered.
    #[error("view {0:?} is already registered with a different definition")]
    ViewConflict(String),
    /// A different measure with the same name is already registered.
    #[error("measure {0:?} is already registered")]
    MeasureAlreadyRegistered(String),
    /// The measure is still referenced by registered views.
    #[error("measure {0:?} is still used by registered views")]
    MeasureInUse(String),
    /// No measure with this name is registered.
    #[error("measure {0:?} is not registered")]
    MeasureNotFound(String),
    /// No view with this name is registered.
    #[error("view {0:?} is not registered")]
    ViewNotFound(String),
    /// The view is registered but does not currently collect data.
    #[error("view {0:?} is not subscribed")]
    NotSubscribed(String),
    /// The stats service has stopped.
    #[error("stats service is stopped")]
    Stopped,
}

impl StatsError {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidName(_) | Self::InvalidAggregation { .. } => ErrorKind::Validation,
            Self::ViewConflict(_) | Self::MeasureAlreadyRegistered(_) | Self::MeasureInUse(_) => {
                ErrorKind::Conflict
            }
            Self::MeasureNotFound(_) | Self::ViewNotFound(_) | Self::NotSubscribed(_) => {
                ErrorKind::NotFound
            }
            Self::Stopped => ErrorKind::Unavailable,
        }
    }
}

impl From<SendError> for StatsError {
    fn from(_: SendError) -> Self {
        Self::Stopped
    }
}
