use std::fmt;

/// Discord user id (snowflake).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub u64);

/// Discord channel id (snowflake). Threads are channels too.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

/// Discord guild ("server") id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerId(pub u64);

/// Discord message id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

/// A stable reference to a Discord message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

macro_rules! display_snowflake {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        })*
    };
}

display_snowflake!(UserId, ChannelId, ServerId, MessageId);

/// Author of an inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Author {
    pub id: UserId,
    pub name: String,
    pub is_bot: bool,
}

/// Platform-neutral inbound chat message.
#[derive(Clone, Debug)]
pub struct IncomingMessage {
    pub message: MessageRef,
    pub server_id: ServerId,
    pub author: Author,
    pub content: String,
}

impl IncomingMessage {
    pub fn channel_id(&self) -> ChannelId {
        self.message.channel_id
    }
}
