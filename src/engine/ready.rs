use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

#[derive(Default)]
struct GateState {
    outcome: Option<bool>,
    wakers: Vec<Waker>,
}

/// One-shot readiness signal. The first `resolve` wins; later calls are
/// ignored.
#[derive(Clone, Default)]
pub struct ReadyGate {
    state: Rc<RefCell<GateState>>,
}

impl ReadyGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if this call settled the gate.
    pub fn resolve(&self, ready: bool) -> bool {
        let wakers = {
            let mut state = self.state.borrow_mut();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(ready);
            std::mem::take(&mut state.wakers)
        };
        for waker in wakers {
            waker.wake();
        }
        true
    }

    pub fn outcome(&self) -> Option<bool> {
        self.state.borrow().outcome
    }

    pub fn wait(&self) -> ReadyFuture {
        ReadyFuture {
            state: Rc::clone(&self.state),
        }
    }
}

/// Resolves to `true` once the engine has measured a live mirror, or `false`
/// if it was destroyed first.
pub struct ReadyFuture {
    state: Rc<RefCell<GateState>>,
}

impl Future for ReadyFuture {
    type Output = bool;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<bool> {
        let mut state = self.state.borrow_mut();
        if let Some(ready) = state.outcome {
            return Poll::Ready(ready);
        }
        if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            state.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}
