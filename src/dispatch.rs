//! Single-level command router
//!
//! The host environment delivers every invocation as an action name plus opaque arguments. The
//! [`Dispatcher`] maps each registered name to a callback and forwards the arguments verbatim;
//! it holds no session state of its own. All state lives in objects reached indirectly through
//! handles returned by earlier calls.

use std::collections::BTreeMap;
use std::fmt;

use crate::Error;

/// Callback invoked for one registered action.
pub type Callback<A, R> = Box<dyn FnMut(A) -> Result<R, Error>>;

/// Router mapping action names to callbacks
///
/// # Examples
///
/// ```
/// use harqpool::Dispatcher;
///
/// let mut dispatcher: Dispatcher<u32, u32> = Dispatcher::new();
/// dispatcher.register("double", Box::new(|x| Ok(2 * x)))?;
/// assert_eq!(dispatcher.dispatch("double", 21)?, 42);
/// assert!(dispatcher.dispatch("triple", 21).is_err());
/// # Ok::<(), harqpool::Error>(())
/// ```
pub struct Dispatcher<A, R> {
    /// Container of the name-callback pairs
    callbacks: BTreeMap<String, Callback<A, R>>,
}

impl<A, R> fmt::Debug for Dispatcher<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("actions", &self.callbacks.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<A, R> Default for Dispatcher<A, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, R> Dispatcher<A, R> {
    /// Returns a dispatcher with no registered actions.
    #[must_use]
    pub fn new() -> Self {
        Self {
            callbacks: BTreeMap::new(),
        }
    }

    /// Links a callback to an action name.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is already registered.
    pub fn register(&mut self, name: &str, callback: Callback<A, R>) -> Result<(), Error> {
        if self.callbacks.contains_key(name) {
            return Err(Error::DuplicateAction(name.to_string()));
        }
        self.callbacks.insert(name.to_string(), callback);
        Ok(())
    }

    /// Invokes the callback registered for `name`, forwarding `args` verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error if no callback is registered for `name`, or whatever error the callback
    /// itself produces.
    pub fn dispatch(&mut self, name: &str, args: A) -> Result<R, Error> {
        let callback = self
            .callbacks
            .get_mut(name)
            .ok_or_else(|| Error::UnknownAction(name.to_string()))?;
        callback(args)
    }
}

#[cfg(test)]
mod tests_of_dispatcher {
    use super::*;

    #[test]
    fn test_register_duplicate_action() {
        let mut dispatcher: Dispatcher<(), ()> = Dispatcher::new();
        dispatcher.register("new", Box::new(|()| Ok(()))).unwrap();
        assert!(matches!(
            dispatcher.register("new", Box::new(|()| Ok(()))),
            Err(Error::DuplicateAction(name)) if name == "new"
        ));
    }

    #[test]
    fn test_dispatch_routes_and_forwards() {
        let mut dispatcher: Dispatcher<i32, i32> = Dispatcher::new();
        dispatcher.register("double", Box::new(|x| Ok(2 * x))).unwrap();
        dispatcher.register("negate", Box::new(|x| Ok(-x))).unwrap();
        assert_eq!(dispatcher.dispatch("double", 3).unwrap(), 6);
        assert_eq!(dispatcher.dispatch("negate", 3).unwrap(), -3);
    }

    #[test]
    fn test_dispatch_unknown_action() {
        let mut dispatcher: Dispatcher<i32, i32> = Dispatcher::new();
        dispatcher.register("double", Box::new(|x| Ok(2 * x))).unwrap();
        assert!(matches!(
            dispatcher.dispatch("triple", 3),
            Err(Error::UnknownAction(name)) if name == "triple"
        ));
    }

    #[test]
    fn test_dispatch_propagates_callback_error() {
        let mut dispatcher: Dispatcher<i32, i32> = Dispatcher::new();
        dispatcher
            .register(
                "fail",
                Box::new(|_| Err(Error::InvalidArgument("bad args".to_string()))),
            )
            .unwrap();
        assert!(matches!(
            dispatcher.dispatch("fail", 0),
            Err(Error::InvalidArgument(_))
        ));
    }
}
