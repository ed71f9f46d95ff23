use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::ops::Deref;

/// A decoded message along with any additional metadata provided by the
/// RPC system.
pub struct Request<Msg> {
    pub(crate) remote_addr: SocketAddr,
    pub(crate) msg: Msg,
}

impl<Msg> Debug for Request<Msg>
where
    Msg: Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("msg", &self.msg)
            .field("remote_addr", &self.remote_addr)
            .finish()
    }
}

impl<Msg> Request<Msg> {
    /// Creates a request as if it was received from `remote_addr`.
    ///
    /// This is mostly useful for calling handlers directly in tests.
    pub fn new(remote_addr: SocketAddr, msg: Msg) -> Self {
        Self { remote_addr, msg }
    }

    /// Consumes the request into the message.
    pub fn into_inner(self) -> Msg {
        self.msg
    }

    /// The remote address of the incoming message.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

impl<Msg> Deref for Request<Msg> {
    type Target = Msg;

    fn deref(&self) -> &Self::Target {
        &self.msg
    }
}
