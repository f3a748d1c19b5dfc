use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Kind of channel to create
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelKind {
    Text,
    Voice,
    Category,
}

impl ChannelKind {
    /// Discord channel type code
    pub fn code(&self) -> u8 {
        match self {
            ChannelKind::Text => 0,
            ChannelKind::Voice => 2,
            ChannelKind::Category => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ChannelKind::Text),
            2 => Some(ChannelKind::Voice),
            4 => Some(ChannelKind::Category),
            _ => None,
        }
    }
}

/// A channel as listed by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformChannel {
    pub id: String,
    pub name: String,
    /// None for channel types the bot never creates
    pub kind: Option<ChannelKind>,
}

/// Channel operations the reconciler needs from the chat platform.
///
/// Implementations are bound to a single guild.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelPlatform: Send + Sync {
    /// Create a channel and return its platform id
    async fn create_channel(&self, name: &str, kind: ChannelKind) -> Result<String>;

    async fn rename_channel(&self, channel_id: &str, name: &str) -> Result<()>;

    async fn list_channels(&self) -> Result<Vec<PlatformChannel>>;

    /// Change the bot's own nickname in the guild
    async fn set_nickname(&self, nickname: &str) -> Result<()>;
}
