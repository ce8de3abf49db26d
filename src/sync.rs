//! A condition-variable-like primitive for waiting on state changes with an
//! explicit deadline.
//!
//! Grounded on `pkg/common/src/condvar.rs` (a futures-based condvar built on
//! `async_std::sync::Mutex` + `futures::channel::oneshot`) and
//! `pkg/common/src/eventually.rs` (its single-assignment `Eventually<T>`
//! wrapper). Every wait here ("pending cipher installed", "plaintext
//! available") is a notified wait with a deadline rather than a bare
//! polling loop, so unlike a plain condvar this one takes a `Duration` on
//! every `wait`.

use std::time::Duration;

use async_std::sync::Mutex;
use futures::channel::oneshot;

use crate::error::{Error, ErrorKind, Result};

struct Inner<V> {
    value: V,
    waiters: Vec<oneshot::Sender<()>>,
}

/// Owns a value `V` and lets callers block until a predicate over `V` holds
/// or a deadline passes.
pub struct Condvar<V> {
    inner: Mutex<Inner<V>>,
}

impl<V> Condvar<V> {
    pub fn new(initial: V) -> Self {
        Self { inner: Mutex::new(Inner { value: initial, waiters: vec![] }) }
    }

    pub async fn lock(&self) -> CondvarGuard<'_, V> {
        CondvarGuard { condvar: self, guard: Some(self.inner.lock().await) }
    }

    /// Blocks until `pred` returns `Some(_)`, returning that value, or until
    /// `deadline` elapses (returning `Err(Timeout)`).
    pub async fn wait_until<T, F: Fn(&V) -> Option<T>>(
        &self,
        deadline: Duration,
        pred: F,
    ) -> Result<T> {
        let result = async_std::future::timeout(deadline, async {
            loop {
                let receiver = {
                    let mut inner = self.inner.lock().await;
                    if let Some(v) = pred(&inner.value) {
                        return v;
                    }
                    let (sender, receiver) = oneshot::channel();
                    inner.waiters.push(sender);
                    receiver
                };
                let _ = receiver.await;
            }
        })
        .await;
        result.map_err(|_| Error::new(ErrorKind::Timeout))
    }
}

pub struct CondvarGuard<'a, V> {
    condvar: &'a Condvar<V>,
    guard: Option<async_std::sync::MutexGuard<'a, Inner<V>>>,
}

impl<'a, V> std::ops::Deref for CondvarGuard<'a, V> {
    type Target = V;

    fn deref(&self) -> &V {
        &self.guard.as_ref().unwrap().value
    }
}

impl<'a, V> std::ops::DerefMut for CondvarGuard<'a, V> {
    fn deref_mut(&mut self) -> &mut V {
        &mut self.guard.as_mut().unwrap().value
    }
}

impl<'a, V> CondvarGuard<'a, V> {
    /// Wakes every outstanding waiter. Should be called after mutating the
    /// guarded value in a way that might satisfy a pending predicate.
    pub fn notify_all(&mut self) {
        let inner = self.guard.as_mut().unwrap();
        for sender in inner.waiters.drain(..) {
            let _ = sender.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[async_std::test]
    async fn wakes_on_notify() {
        let cv = Condvar::new(0u32);

        let waiter = async {
            cv.wait_until(Duration::from_secs(5), |v| if *v >= 3 { Some(*v) } else { None }).await
        };
        let setter = async {
            async_std::task::sleep(Duration::from_millis(10)).await;
            let mut guard = cv.lock().await;
            *guard = 3;
            guard.notify_all();
        };

        let (result, _) = futures::join!(waiter, setter);
        assert_eq!(result.unwrap(), 3);
    }

    #[async_std::test]
    async fn times_out() {
        let cv: Condvar<u32> = Condvar::new(0);
        let result = cv.wait_until(Duration::from_millis(20), |_| None::<u32>).await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Timeout);
    }
}
