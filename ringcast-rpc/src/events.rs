/// The sending side of a client event channel.
pub type EventSender = flume::Sender<ClientEvent>;
/// The receiving side of a client event channel.
pub type EventReceiver = flume::Receiver<ClientEvent>;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Connection lifecycle events emitted by clients.
///
/// Clients never call back into their owner, they only push events which the
/// owner may consume at its own pace.
pub enum ClientEvent {
    /// A new connection was established.
    Connected { endpoint: String, name: String },
    /// Dialing the endpoint failed.
    Failed { endpoint: String, error: String },
    /// A connection was closed after a transport error.
    Closed {
        endpoint: String,
        name: String,
        reason: String,
    },
}

impl ClientEvent {
    /// The endpoint the event relates to.
    pub fn endpoint(&self) -> &str {
        match self {
            Self::Connected { endpoint, .. } => endpoint,
            Self::Failed { endpoint, .. } => endpoint,
            Self::Closed { endpoint, .. } => endpoint,
        }
    }
}

/// Creates a new unbounded client event channel.
pub fn event_channel() -> (EventSender, EventReceiver) {
    flume::unbounded()
}
