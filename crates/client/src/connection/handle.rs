use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tokio::sync::Notify;
use tracing::{trace, warn};

use crate::connection::upgrade::{self, Pending};
use crate::connection::{NetSocket, Transport};

/// The response's view of a [`ClientConnection`](crate::connection::ClientConnection).
///
/// Pausing flips a flag the driver checks before every read, requesting a net
/// socket registers a hand-over the driver completes before its next read. Both
/// wake the driver if it is parked.
#[derive(Clone, Default)]
pub struct ConnectionHandle {
    shared: Rc<Shared>,
}

#[derive(Default)]
struct Shared {
    paused: Cell<bool>,
    upgrade: RefCell<Option<Pending>>,
    wakeup: Notify,
}

impl ConnectionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.get()
    }

    pub(crate) fn take_upgrade(&self) -> Option<Pending> {
        self.shared.upgrade.borrow_mut().take()
    }

    pub(crate) async fn wakeup(&self) {
        self.shared.wakeup.notified().await;
    }
}

impl Transport for ConnectionHandle {
    type Socket = NetSocket;

    fn set_paused(&self, paused: bool) {
        if self.shared.paused.replace(paused) != paused {
            trace!(paused, "connection read state changed");
            self.shared.wakeup.notify_one();
        }
    }

    fn create_net_socket(&self) -> NetSocket {
        let (pending, socket) = upgrade::pending();
        if self.shared.upgrade.borrow_mut().replace(pending).is_some() {
            warn!("raw socket requested twice, the previous request is dropped");
        }
        self.shared.wakeup.notify_one();
        socket
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("paused", &self.shared.paused.get())
            .field("upgrade_requested", &self.shared.upgrade.borrow().is_some())
            .finish()
    }
}
