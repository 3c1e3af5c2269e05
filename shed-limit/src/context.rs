use http::Extensions;

use crate::priority::Priority;

/// Request-scoped carrier handed to throttled work.
///
/// The call site closest to the user request (an HTTP handler, an RPC entry
/// point) usually knows the QoS class; binding it here lets deep library code
/// pick it up without threading an extra parameter. A bound priority wins
/// over the per-call default, so every throttle on the request path adapts to
/// the same class. Arbitrary caller values ride along untouched.
#[derive(Clone, Debug, Default)]
pub struct Context {
    extensions: Extensions,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `priority` to this context, replacing any previous binding.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.extensions.insert(priority);
        self
    }

    /// The bound priority, if any.
    pub fn priority(&self) -> Option<Priority> {
        self.extensions.get::<Priority>().copied()
    }

    /// The bound priority, or `default` when none is bound.
    pub fn priority_or(&self, default: Priority) -> Priority {
        self.priority().unwrap_or(default)
    }

    /// Attach an arbitrary value, returning the previously stored value of
    /// the same type.
    pub fn insert<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.extensions.insert(value)
    }

    /// A value previously attached with [`insert`](Self::insert).
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_applies_when_nothing_is_bound() {
        let cx = Context::new();
        assert_eq!(cx.priority(), None);
        assert_eq!(cx.priority_or(Priority::MEDIUM), Priority::MEDIUM);
    }

    #[test]
    fn bound_priority_wins_over_the_default() {
        let cx = Context::new().with_priority(Priority::HIGH);
        assert_eq!(cx.priority_or(Priority::MEDIUM), Priority::HIGH);

        // Re-binding replaces the earlier value.
        let cx = cx.with_priority(Priority::LOW);
        assert_eq!(cx.priority_or(Priority::MEDIUM), Priority::LOW);
    }

    #[test]
    fn unrelated_values_survive_priority_binding() {
        #[derive(Clone, Debug, PartialEq)]
        struct Tenant(&'static str);

        let mut cx = Context::new();
        cx.insert(Tenant("acme"));
        let cx = cx.with_priority(Priority::IMPORTANT);

        assert_eq!(cx.get::<Tenant>(), Some(&Tenant("acme")));
        assert_eq!(cx.priority(), Some(Priority::IMPORTANT));
    }
}
