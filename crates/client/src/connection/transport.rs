use std::rc::Rc;

/// The connection a response is read from.
///
/// The transport invokes the response's `handle_*` methods in wire order and obeys
/// [`set_paused`](Transport::set_paused) by suppressing further invocations until it
/// is unpaused.
#[cfg_attr(test, mockall::automock(type Socket = u32;))]
pub trait Transport {
    /// The raw bidirectional socket handed out for protocol upgrades.
    type Socket;

    /// Applies (`true`) or removes (`false`) the read-pause at the transport level.
    fn set_paused(&self, paused: bool);

    /// Hands the connection over as a raw socket. Called at most once per response.
    fn create_net_socket(&self) -> Self::Socket;
}

impl<T: Transport + ?Sized> Transport for Rc<T> {
    type Socket = T::Socket;

    fn set_paused(&self, paused: bool) {
        (**self).set_paused(paused);
    }

    fn create_net_socket(&self) -> Self::Socket {
        (**self).create_net_socket()
    }
}

/// The request paired with a response, told about every delivered body chunk.
pub trait RequestProgress {
    fn data_received(&self);
}
