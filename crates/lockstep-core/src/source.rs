#![forbid(unsafe_code)]

//! The contract between a store and the state it mirrors.
//!
//! A [`Source`] owns the truth. Lockstep only ever reads it: the integration
//! applies an action to the source first and then tells the store about it
//! with [`Store::handle_update`](crate::store::Store::handle_update).
//!
//! `reduce` must be pure. It is called speculatively during a rebase to
//! recompute the committed value, and nothing detects a reducer with side
//! effects; it silently corrupts the rebased state.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// External owner of a piece of mutable state.
pub trait Source {
    type State;
    type Action;

    /// Current value, already reflecting every applied action.
    fn state(&self) -> Self::State;

    /// Pure transition function. Must not touch `self`'s stored value.
    fn reduce(&self, state: &Self::State, action: &Self::Action) -> Self::State;
}

pub type Reducer<S, A> = Rc<dyn Fn(&S, &A) -> S>;

/// A source that keeps its own value and folds actions into it.
pub struct ReducerSource<S, A> {
    state: RefCell<S>,
    reducer: Reducer<S, A>,
}

impl<S: Clone, A> ReducerSource<S, A> {
    #[must_use]
    pub fn new(initial: S, reducer: impl Fn(&S, &A) -> S + 'static) -> Self {
        Self {
            state: RefCell::new(initial),
            reducer: Rc::new(reducer),
        }
    }

    /// Fold `action` into the current value.
    pub fn apply(&self, action: &A) {
        let next = {
            let current = self.state.borrow();
            (self.reducer)(&current, action)
        };
        *self.state.borrow_mut() = next;
    }
}

impl<S: Clone, A> Source for ReducerSource<S, A> {
    type State = S;
    type Action = A;

    fn state(&self) -> S {
        self.state.borrow().clone()
    }

    fn reduce(&self, state: &S, action: &A) -> S {
        (self.reducer)(state, action)
    }
}

impl<S: fmt::Debug, A> fmt::Debug for ReducerSource<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReducerSource")
            .field("state", &self.state.borrow())
            .finish_non_exhaustive()
    }
}
