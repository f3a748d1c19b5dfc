pub mod discord;
pub mod http;
pub mod platform;
pub mod source;

pub use discord::{DiscordClient, DEFAULT_DISCORD_API_BASE};
pub use http::JsonHttp;
pub use platform::{ChannelKind, ChannelPlatform, PlatformChannel};
pub use source::{FloorPriceFetcher, RigTelemetryFetcher, StatFetcher, TokenPriceFetcher};
