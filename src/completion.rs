use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use spin::Mutex;

use crate::FormData;

struct Slot {
    outcome: Option<crate::Result<FormData>>,
    wakers: Vec<Waker>,
}

/// Resolves to the outcome of a parse.
///
/// A `Completion` can be cloned and awaited any number of times, before or
/// after the parse ends; every waiter gets a clone of the same cached
/// outcome. The outcome is settled exactly once by the
/// [`Decoder`](crate::Decoder) that created it.
///
/// # Examples
///
/// ```
/// use formbody::{Config, Decoder};
///
/// # async fn run() {
/// let mut decoder = Decoder::urlencoded(Config::default());
/// let completion = decoder.completion();
///
/// decoder.feed("name=foo").await.unwrap();
/// decoder.end().await.unwrap();
///
/// let form = completion.await.unwrap();
/// assert_eq!(form.field("name"), Some("foo"));
/// # }
/// # tokio::runtime::Runtime::new().unwrap().block_on(run());
/// ```
#[derive(Clone)]
pub struct Completion {
    slot: Arc<Mutex<Slot>>,
}

impl Completion {
    pub(crate) fn new() -> Completion {
        Completion {
            slot: Arc::new(Mutex::new(Slot {
                outcome: None,
                wakers: Vec::new(),
            })),
        }
    }

    /// Stores the terminal outcome and wakes every waiter. Returns `false`
    /// and keeps the first outcome if one was already settled.
    pub(crate) fn settle(&self, outcome: crate::Result<FormData>) -> bool {
        let wakers = {
            let mut slot = self.slot.lock();

            if slot.outcome.is_some() {
                return false;
            }

            slot.outcome = Some(outcome);
            std::mem::take(&mut slot.wakers)
        };

        for waker in wakers {
            waker.wake();
        }

        true
    }

    /// Returns the outcome without waiting, if the parse already ended.
    pub fn outcome(&self) -> Option<crate::Result<FormData>> {
        self.slot.lock().outcome.clone()
    }

    /// Returns `true` once the outcome is settled.
    pub fn is_settled(&self) -> bool {
        self.slot.lock().outcome.is_some()
    }
}

impl Future for Completion {
    type Output = crate::Result<FormData>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.slot.lock();

        match slot.outcome {
            Some(ref outcome) => Poll::Ready(outcome.clone()),
            None => {
                if !slot.wakers.iter().any(|waker| waker.will_wake(cx.waker())) {
                    slot.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("settled", &self.is_settled())
            .finish()
    }
}
