//! The thread processing the events queued by [crate::GattCallback].

use std::sync::Arc;
use std::thread::JoinHandle;

use async_channel::Receiver;
use log::debug;

use super::callback::GattEvent;
use super::session::Session;

const THREAD_NAME: &str = "arsal-ble-events";

/// Spawns the event thread; it ends once the callback channel is closed.
pub(crate) fn spawn(
    session: Arc<Session>,
    receiver: Receiver<GattEvent>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(THREAD_NAME.into())
        .spawn(move || {
            debug!("event thread started");
            while let Ok(event) = receiver.recv_blocking() {
                session.handle_event(event);
            }
            debug!("event thread stopped");
        })
}
