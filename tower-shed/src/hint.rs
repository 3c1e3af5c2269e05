use shed_limit::Priority;

/// Extract the priority a request carries, if any.
///
/// The layer falls back to its configured default when a request carries no
/// hint. Implemented for [`http::Request`], which carries the priority in
/// its extensions:
///
/// ```rust
/// use shed_limit::Priority;
/// use tower_shed::PriorityHint;
///
/// let mut request = http::Request::new(());
/// request.extensions_mut().insert(Priority::HIGH);
/// assert_eq!(request.priority_hint(), Some(Priority::HIGH));
/// ```
///
/// Implement it for custom request types to make them throttle-aware.
pub trait PriorityHint {
    fn priority_hint(&self) -> Option<Priority>;
}

impl<B> PriorityHint for http::Request<B> {
    fn priority_hint(&self) -> Option<Priority> {
        self.extensions().get::<Priority>().copied()
    }
}
