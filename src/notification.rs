//! Per-key queues of characteristic notifications.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_lock::Mutex;
use futures_core::Stream;
use futures_lite::StreamExt;
use log::{debug, trace};

use super::async_util::with_timeout;
use super::characteristic::Characteristic;
use super::error::{Error, ErrorCode};
use super::Result;

/// A value received from a notifying characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NotificationData {
    pub characteristic: Characteristic,
    pub value: Vec<u8>,
}

/// One subscription: the watched characteristics and the values received for them.
///
/// Every queued value and every cancellation adds one permit to `signal`. Permits may
/// outlive the values they announced, so a woken reader re-checks the queue and
/// `cancels` instead of trusting the wake-up.
struct Registration {
    characteristics: Vec<Characteristic>,
    queue: Mutex<VecDeque<NotificationData>>,
    signal_sender: async_channel::Sender<()>,
    signal_receiver: async_channel::Receiver<()>,
    cancels: AtomicUsize,
    /// Cancellations already reported to a `drain` caller.
    seen_cancels: AtomicUsize,
}

impl Registration {
    fn new(characteristics: Vec<Characteristic>) -> Self {
        let (signal_sender, signal_receiver) = async_channel::unbounded();
        Self {
            characteristics,
            queue: Mutex::new(VecDeque::new()),
            signal_sender,
            signal_receiver,
            cancels: AtomicUsize::new(0),
            seen_cancels: AtomicUsize::new(0),
        }
    }

    fn watches(&self, characteristic: &Characteristic) -> bool {
        self.characteristics.iter().any(|ch| ch == characteristic)
    }

    fn push(&self, data: NotificationData) {
        self.queue.lock_blocking().push_back(data);
        let _ = self.signal_sender.try_send(());
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        let _ = self.signal_sender.try_send(());
    }

    /// Waits for one permit. Returns `false` on timeout.
    async fn wait(&self, timeout: Option<Duration>) -> bool {
        matches!(
            with_timeout(self.signal_receiver.recv(), timeout).await,
            Some(Ok(()))
        )
    }

    /// Checks for a cancellation not reported yet, and marks it reported.
    fn take_cancel(&self) -> bool {
        let cancels = self.cancels.load(Ordering::SeqCst);
        self.seen_cancels.swap(cancels, Ordering::SeqCst) != cancels
    }

    async fn take(&self, max_count: usize) -> Vec<NotificationData> {
        let mut queue = self.queue.lock().await;
        let count = max_count.min(queue.len());
        queue.drain(..count).collect()
    }
}

/// Maps caller-chosen keys to notification queues.
///
/// Values are delivered to the first registration (in registration order) watching the
/// changed characteristic. Within one key, values are read in arrival order.
#[derive(Default)]
pub struct NotificationRegistry {
    registrations: Mutex<Vec<(String, Arc<Registration>)>>,
}

impl NotificationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registration for `characteristics` under `key`.
    ///
    /// A previous registration with the same key is replaced; its readers are woken up
    /// without data.
    pub fn register(&self, characteristics: Vec<Characteristic>, key: impl Into<String>) {
        let key = key.into();
        let reg = Arc::new(Registration::new(characteristics));
        let mut guard = self.registrations.lock_blocking();
        if let Some((_, prev)) = guard.iter_mut().find(|(k, _)| *k == key) {
            debug!("replacing notification registration {key:?}");
            let prev = std::mem::replace(prev, reg);
            prev.cancel();
        } else {
            debug!("adding notification registration {key:?}");
            guard.push((key, reg));
        }
    }

    /// Removes the registration; returns whether it existed.
    pub fn unregister(&self, key: &str) -> bool {
        let mut guard = self.registrations.lock_blocking();
        let Some(pos) = guard.iter().position(|(k, _)| k == key) else {
            return false;
        };
        let (_, reg) = guard.remove(pos);
        drop(guard);
        debug!("removed notification registration {key:?}");
        reg.cancel();
        true
    }

    /// Wakes up a reader of `key` without delivering a value; returns whether the key exists.
    pub fn cancel(&self, key: &str) -> bool {
        if let Some(reg) = self.get(key) {
            reg.cancel();
            true
        } else {
            false
        }
    }

    /// Wakes up the readers of every registration.
    pub fn cancel_all(&self) {
        for (_, reg) in self.registrations.lock_blocking().iter() {
            reg.cancel();
        }
    }

    /// Wakes up every reader, then removes every registration.
    pub fn clear(&self) {
        let regs = std::mem::take(&mut *self.registrations.lock_blocking());
        for (_, reg) in regs {
            reg.cancel();
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Queues `value` for the first registration watching `characteristic`.
    ///
    /// Returns `false` if no registration watches it.
    pub fn deliver(&self, characteristic: &Characteristic, value: Vec<u8>) -> bool {
        let reg = self
            .registrations
            .lock_blocking()
            .iter()
            .find(|(_, reg)| reg.watches(characteristic))
            .map(|(_, reg)| reg.clone());
        let Some(reg) = reg else {
            trace!("no registration for {}", characteristic.uuid());
            return false;
        };
        reg.push(NotificationData {
            characteristic: characteristic.clone(),
            value,
        });
        true
    }

    /// Waits until a value is queued for `key`, the registration is cancelled, or
    /// `timeout` elapses (`None` waits forever), then removes and returns up to
    /// `max_count` of the oldest queued values.
    ///
    /// A cancellation made while no reader was waiting wakes up the next call.
    /// Fails with [ErrorCode::BleNoData] if nothing is queued when it returns, and with
    /// [ErrorCode::BadParameter] if `key` is not registered or `max_count` is zero.
    pub async fn drain(
        &self,
        key: &str,
        max_count: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<NotificationData>> {
        if max_count == 0 {
            return Err(Error::new(
                ErrorCode::BadParameter,
                None,
                "`max_count` must be positive",
            ));
        }
        let reg = self.get(key).ok_or_else(|| {
            Error::new(
                ErrorCode::BadParameter,
                None,
                format!("no notification registered under {key:?}"),
            )
        })?;
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        loop {
            let values = reg.take(max_count).await;
            if !values.is_empty() {
                return Ok(values);
            }
            if reg.take_cancel() {
                trace!("drain of {key:?} cancelled");
                break;
            }
            let remaining = match deadline {
                Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                    Some(left) if !left.is_zero() => Some(left),
                    _ => break,
                },
                None => None,
            };
            if !reg.wait(remaining).await {
                break;
            }
        }
        Err(ErrorCode::BleNoData.into())
    }

    /// Returns the queue of `key` as a stream.
    ///
    /// The stream ends when the registration is cancelled, replaced, unregistered or
    /// cleared while its queue is empty.
    pub fn notifications(
        &self,
        key: &str,
    ) -> Result<impl Stream<Item = NotificationData> + Send + Unpin + 'static> {
        let reg = self.get(key).ok_or_else(|| {
            Error::new(
                ErrorCode::BadParameter,
                None,
                format!("no notification registered under {key:?}"),
            )
        })?;
        let seen_cancels = reg.cancels.load(Ordering::SeqCst);
        Ok(futures_lite::stream::unfold(reg, move |reg| async move {
            loop {
                reg.wait(None).await;
                let popped = reg.queue.lock().await.pop_front();
                if let Some(data) = popped {
                    return Some((data, reg));
                }
                if reg.cancels.load(Ordering::SeqCst) != seen_cancels {
                    return None;
                }
            }
        })
        .boxed())
    }

    fn get(&self, key: &str) -> Option<Arc<Registration>> {
        self.registrations
            .lock_blocking()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, reg)| reg.clone())
    }
}
