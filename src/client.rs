//! The capability interface a wrapped chat client exposes to the buffer.
//!
//! Only the calls declared here are rate limited. Every other operation of the
//! wrapped client is reached through [`PauseBuffer::client`](crate::PauseBuffer::client)
//! and runs synchronously, untouched by the buffer.

/// Rate-limited operations of a chat client.
///
/// Each method causes one network send. Implementations must not call back
/// into the [`PauseBuffer`](crate::PauseBuffer) wrapping them.
pub trait ChatClient: Send + Sync + 'static {
    /// Send a chat message to a channel
    fn say(&self, channel: &str, message: &str);

    /// Send an action ("/me") message to a channel
    fn action(&self, channel: &str, message: &str);

    /// Send a direct message to a single user
    fn whisper(&self, username: &str, message: &str);
}

/// Channel operations that go through the managed send path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagedAction {
    Say,
    Action,
}

/// A channel send waiting to be delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedCall {
    pub action: ManagedAction,
    pub channel: String,
    pub message: String,
}

impl ManagedCall {
    pub fn new(action: ManagedAction, channel: &str, message: &str) -> Self {
        Self {
            action,
            channel: channel.to_string(),
            message: message.to_string(),
        }
    }

    pub fn invoke<C: ChatClient + ?Sized>(&self, client: &C) {
        match self.action {
            ManagedAction::Say => client.say(&self.channel, &self.message),
            ManagedAction::Action => client.action(&self.channel, &self.message),
        }
    }
}
