use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_broadcast::{Receiver, Sender};
use async_lock::Mutex;
use futures_lite::FutureExt;
use futures_timer::Delay;
use log::debug;

/// Reusable exclusive register for `ResultWaiter`.
///
/// One `Excluder` stands for one kind of request whose completion is reported by a
/// "foreign" callback. It holds at most one outstanding lock; the callback fulfils it
/// with [Excluder::unlock], a teardown path may fulfil it early with [Excluder::cancel].
pub struct Excluder<T: Send + Clone> {
    inner: Mutex<Option<LockMark>>,
    last_val: Arc<Mutex<Option<T>>>,
    /// Answers still owed to abandoned locks; each one swallows the next `unlock`.
    abandoned: AtomicUsize,
}

/// Marks the excluder as waited on until the "foreign" callback is received.
struct LockMark {
    id: usize,
    callback_sender: Sender<()>,
}

/// Makes waiting for the result of the "foreign" callback possible.
pub struct ResultWaiter<T: Send + Clone> {
    id: usize,
    receiver: Receiver<()>,
    last_val: Weak<Mutex<Option<T>>>,
}

impl<T: Send + Clone> Excluder<T> {
    /// Creates a new unlocked `Excluder`.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
            last_val: Arc::new(Mutex::new(None)),
            abandoned: AtomicUsize::new(0),
        }
    }

    /// Clones and returns the last value returned by the "foreign" callback.
    pub fn last_value(&self) -> Option<T> {
        self.last_val.lock_blocking().clone()
    }

    /// Checks if a request is waiting for the "foreign" callback.
    #[cfg(test)]
    pub fn is_locked(&self) -> bool {
        self.inner.lock_blocking().is_some()
    }

    /// Locks the excluder and forgets the last value.
    ///
    /// Call this *right before* calling a method that will produce a "foreign" callback;
    /// after calling that method, call [ResultWaiter::wait_unlock] in the same task.
    /// Requests of the same kind must be serialized by the caller: a previous lock
    /// still held is invalidated, and its waiter returns `None`.
    pub fn lock(&self) -> ResultWaiter<T> {
        static NEXT_LOCK_ID: AtomicUsize = AtomicUsize::new(0);

        let _ = self.last_val.lock_blocking().take();

        let (sender, receiver) = async_broadcast::broadcast(2);
        let id = NEXT_LOCK_ID.fetch_add(1, Ordering::SeqCst);
        let prev = self.inner.lock_blocking().replace(LockMark {
            id,
            callback_sender: sender,
        });
        if let Some(prev) = prev {
            debug!("lock #{} invalidated by lock #{id}", prev.id);
        }

        ResultWaiter {
            id,
            receiver,
            last_val: Arc::downgrade(&self.last_val),
        }
    }

    /// Sends the "completed" (unlock) signal from the "foreign" callback.
    ///
    /// The value is kept as the last value even if nothing is waiting, unless it is the
    /// late answer of an abandoned lock: then it is dropped and `false` is returned.
    pub fn unlock(&self, result: T) -> bool {
        let owed = self
            .abandoned
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if owed.is_ok() {
            debug!("dropping the late answer of an abandoned lock");
            return false;
        }
        self.last_val.lock_blocking().replace(result);
        self.release();
        true
    }

    /// Gives up the outstanding lock after its waiter timed out.
    ///
    /// The "foreign" callback is still expected to answer it; that answer is dropped
    /// instead of fulfilling the next lock. Does nothing if it is not locked.
    pub fn abandon(&self) {
        if let Some(lock_mark) = self.inner.lock_blocking().take() {
            debug!("lock #{} abandoned", lock_mark.id);
            self.abandoned.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Fulfils the outstanding lock with `result`; does nothing if it is not locked.
    ///
    /// Returns `true` if a lock was released.
    pub fn cancel(&self, result: T) -> bool {
        let mut guard_inner = self.inner.lock_blocking();
        if guard_inner.is_none() {
            return false;
        }
        self.last_val.lock_blocking().replace(result);
        if let Some(lock_mark) = guard_inner.take() {
            drop(guard_inner);
            let _ = lock_mark.callback_sender.try_broadcast(());
        }
        true
    }

    /// Drops the outstanding lock without fulfilling it and forgets the last value.
    ///
    /// A waiter of the dropped lock returns `None`.
    pub fn clear(&self) {
        let _ = self.last_val.lock_blocking().take();
        let _ = self.inner.lock_blocking().take();
    }

    /// Like [Excluder::clear], and stops expecting answers to abandoned locks.
    pub fn reset(&self) {
        self.clear();
        self.abandoned.store(0, Ordering::SeqCst);
    }

    fn release(&self) {
        let mut guard_inner = self.inner.lock_blocking();
        if let Some(lock_mark) = guard_inner.take() {
            drop(guard_inner);
            // never blocks: the channel has room for one signal per lock.
            let _ = lock_mark.callback_sender.try_broadcast(());
        }
    }
}

impl<T: Send + Clone> Default for Excluder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Clone> Drop for Excluder<T> {
    fn drop(&mut self) {
        // makes sure `ResultWaiter::wait_unlock` return `None`.
        let _ = self.last_val.lock_blocking().take();
        let _ = self.inner.lock_blocking().take();
    }
}

impl<T: Send + Clone> ResultWaiter<T> {
    /// Waits until the unlock signal is sent from the "foreign" callback or the timeout
    /// is reached (`None` waits forever). Returns `None` on timeout, or when the lock
    /// was cleared or the corresponding `Excluder` was dropped.
    pub async fn wait_unlock(mut self, timeout: Option<Duration>) -> Option<T> {
        let res = with_timeout(self.receiver.recv(), timeout).await;
        match res {
            Some(Ok(())) => (),
            Some(Err(_)) => {
                debug!("lock #{} dropped before being fulfilled", self.id);
                return None;
            }
            None => {
                debug!("lock #{} timed out", self.id);
                return None;
            }
        }
        let last_val = self.last_val.upgrade()?;
        let val = last_val.lock().await.as_ref().cloned();
        val
    }
}

/// Runs `fut` to completion, or gives up after `timeout`; `None` as timeout waits forever.
pub async fn with_timeout<F: Future>(fut: F, timeout: Option<Duration>) -> Option<F::Output> {
    let fut = async { Some(fut.await) };
    match timeout {
        Some(dur) => {
            fut.or(async {
                Delay::new(dur).await;
                None
            })
            .await
        }
        None => fut.await,
    }
}
