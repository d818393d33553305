//! Awaitable, level-triggered readiness flags

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

#[derive(Debug, Default)]
struct FlagState {
    set: bool,
    waiters: Vec<Waker>,
}

/// A boolean that futures can wait on.
///
/// Waiting on a flag that is already set completes immediately, so there is
/// no window where a signal can be missed. Clones share state.
///
/// Not `futures::future::Shared` over a oneshot: any clone may set the flag,
/// and `is_set` answers without polling.
#[derive(Debug, Clone, Default)]
pub struct ReadyFlag {
    state: Rc<RefCell<FlagState>>,
}

impl ReadyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.state.borrow().set
    }

    /// Set the flag and wake every waiter. Returns true on the false -> true
    /// transition only.
    pub fn set(&self) -> bool {
        let waiters = {
            let mut state = self.state.borrow_mut();
            if state.set {
                return false;
            }
            state.set = true;
            std::mem::take(&mut state.waiters)
        };
        for waker in waiters {
            waker.wake();
        }
        true
    }

    /// Future resolving once the flag is set
    pub fn wait(&self) -> WaitReady {
        WaitReady { flag: self.clone() }
    }
}

/// Future returned by [`ReadyFlag::wait`]
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct WaitReady {
    flag: ReadyFlag,
}

impl Future for WaitReady {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut state = self.flag.state.borrow_mut();
        if state.set {
            return Poll::Ready(());
        }
        if !state.waiters.iter().any(|w| w.will_wake(cx.waker())) {
            state.waiters.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::LocalPool;
    use futures::task::LocalSpawnExt;

    #[test]
    fn test_wait_after_set_is_immediate() {
        let flag = ReadyFlag::new();
        assert!(flag.set());
        assert!(!flag.set());
        futures::executor::block_on(flag.wait());
        assert!(flag.is_set());
    }

    #[test]
    fn test_waiters_wake_on_set() {
        let mut pool = LocalPool::new();
        let flag = ReadyFlag::new();
        let done = Rc::new(RefCell::new(0));

        for _ in 0..3 {
            let flag = flag.clone();
            let done = done.clone();
            pool.spawner()
                .spawn_local(async move {
                    flag.wait().await;
                    *done.borrow_mut() += 1;
                })
                .unwrap();
        }

        pool.run_until_stalled();
        assert_eq!(*done.borrow(), 0);

        flag.set();
        pool.run_until_stalled();
        assert_eq!(*done.borrow(), 3);
    }

    #[test]
    fn test_any_clone_sets_and_everyone_sees_it() {
        let mut pool = LocalPool::new();
        let flag = ReadyFlag::new();
        let setter = flag.clone();
        let observer = flag.clone();
        let done = Rc::new(RefCell::new(false));

        let waiter = flag.clone();
        let out = done.clone();
        pool.spawner()
            .spawn_local(async move {
                waiter.wait().await;
                *out.borrow_mut() = true;
            })
            .unwrap();
        pool.run_until_stalled();
        assert!(!observer.is_set());

        assert!(setter.set());
        assert!(observer.is_set() && flag.is_set());
        pool.run_until_stalled();
        assert!(*done.borrow());
    }
}
