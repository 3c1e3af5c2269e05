use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

/// Type-erased error, the error currency of the call surface.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Predicate deciding whether an error is evidence of downstream distress.
///
/// Distress outcomes are not counted as accepted and therefore raise the
/// rejection probability; everything else is treated as a benign failure.
pub type Classifier = Arc<dyn Fn(&(dyn Error + 'static)) -> bool + Send + Sync>;

/// Returned when the throttle rejects a call locally, without contacting the
/// upstream.
///
/// Callers detect it by type ([`BoxError::downcast_ref`] or `matches!`), never
/// by message.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("shed client side; retry after {retry_after:?}")]
pub struct Shed {
    /// Hint for how long callers should wait before retrying.
    pub retry_after: Duration,
}

impl Shed {
    pub(crate) fn new() -> Self {
        Self {
            retry_after: Duration::from_secs(1),
        }
    }
}

impl Default for Shed {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps an error to assert, for this one call, that the outcome counts as
/// downstream distress regardless of what the classifier would say.
///
/// Wrap errors that show the backend is unhealthy. Bad requests,
/// authentication failures, precondition failures and the like should not be
/// wrapped. The throttle unwraps the marker before returning, so the caller
/// sees the original error, never this type.
#[derive(Debug)]
pub struct Rejected {
    inner: BoxError,
}

impl Rejected {
    pub fn new(inner: impl Into<BoxError>) -> Self {
        Self {
            inner: inner.into(),
        }
    }

    /// The wrapped error, unchanged.
    pub fn into_inner(self) -> BoxError {
        self.inner
    }
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

impl Error for Rejected {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.inner.as_ref())
    }
}

/// Minimal upstream fault taxonomy understood by the default classifier.
///
/// [`Unavailable`](Fault::Unavailable) and
/// [`ResourceExhausted`](Fault::ResourceExhausted) count as distress; the
/// remaining categories are benign and count as accepted outcomes.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Fault {
    /// The upstream is overloaded or down.
    #[error("upstream unavailable; retry after {retry_after:?}")]
    Unavailable { retry_after: Duration },
    /// The upstream is out of quota or capacity.
    #[error("upstream resource exhausted")]
    ResourceExhausted,
    /// The requested entity does not exist.
    #[error("not found")]
    NotFound,
    /// The request was malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The caller is not authenticated.
    #[error("unauthenticated")]
    Unauthenticated,
    /// The system is not in a state required for the operation.
    #[error("failed precondition")]
    FailedPrecondition,
    /// The caller gave up on the request.
    #[error("cancelled")]
    Cancelled,
}

impl Fault {
    /// An [`Unavailable`](Fault::Unavailable) fault with a one second retry
    /// hint.
    pub fn unavailable() -> Self {
        Fault::Unavailable {
            retry_after: Duration::from_secs(1),
        }
    }
}

/// The default distress classifier.
///
/// Walks the `source()` chain looking for a distress [`Fault`], so a fault
/// buried under application wrappers is still recognised.
pub fn is_distress(err: &(dyn Error + 'static)) -> bool {
    let mut cause = Some(err);
    while let Some(e) = cause {
        if let Some(fault) = e.downcast_ref::<Fault>() {
            return matches!(
                fault,
                Fault::Unavailable { .. } | Fault::ResourceExhausted
            );
        }
        cause = e.source();
    }
    false
}

static DEFAULT_CLASSIFIER: OnceLock<Classifier> = OnceLock::new();

/// Install a process-wide default distress classifier.
///
/// Throttles snapshot the default at construction time, so install it once at
/// startup, before any throttle is built. Returns `false` when a default was
/// already installed; the existing default stays in place.
pub fn set_default_classifier(
    f: impl Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static,
) -> bool {
    DEFAULT_CLASSIFIER.set(Arc::new(f)).is_ok()
}

/// The classifier new throttles start with: the installed process default, or
/// [`is_distress`].
pub(crate) fn default_classifier() -> Classifier {
    DEFAULT_CLASSIFIER
        .get()
        .cloned()
        .unwrap_or_else(|| Arc::new(is_distress))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("fetching profile: {source}")]
    struct WrappedFault {
        source: Fault,
    }

    #[test]
    fn rejected_unwraps_to_the_original_error() {
        let rejected = Rejected::new(Fault::NotFound);
        assert_eq!(rejected.to_string(), "not found");

        let inner = rejected.into_inner();
        assert_eq!(inner.downcast_ref::<Fault>(), Some(&Fault::NotFound));
    }

    #[test]
    fn rejected_exposes_the_inner_error_as_its_source() {
        let rejected = Rejected::new(Fault::ResourceExhausted);
        let source = rejected.source().expect("source");
        assert!(source.downcast_ref::<Fault>().is_some());
    }

    #[test]
    fn distress_faults_classify_as_distress() {
        assert!(is_distress(&Fault::unavailable()));
        assert!(is_distress(&Fault::ResourceExhausted));
    }

    #[test]
    fn benign_faults_do_not() {
        assert!(!is_distress(&Fault::NotFound));
        assert!(!is_distress(&Fault::InvalidInput("bad".into())));
        assert!(!is_distress(&Fault::Unauthenticated));
        assert!(!is_distress(&Fault::FailedPrecondition));
        assert!(!is_distress(&Fault::Cancelled));
    }

    #[test]
    fn classification_walks_the_source_chain() {
        let wrapped = WrappedFault {
            source: Fault::unavailable(),
        };
        assert!(is_distress(&wrapped));

        let benign = WrappedFault {
            source: Fault::NotFound,
        };
        assert!(!is_distress(&benign));
    }

    #[test]
    fn unknown_errors_are_benign() {
        let err = std::io::Error::other("boom");
        assert!(!is_distress(&err));
    }
}
