//! Client library for Feishu (Lark) group-messaging bots.
//!
//! The bot authenticates with its app credentials, discovers the chat
//! groups it has joined, uploads media, and fans a message out to one
//! or more groups. Token lifecycle (fetch, cache, refresh-on-demand)
//! is handled internally; per-target send failures are reported per
//! group instead of aborting the whole broadcast.
//!
//! ```no_run
//! use feishu_bot::{FeishuBot, GroupSelector};
//!
//! # async fn run() -> feishu_bot::Result<()> {
//! let bot = FeishuBot::new("cli_xxx", "secret");
//!
//! // Broadcast to every joined group.
//! bot.send_text("deploy finished", GroupSelector::All).await?;
//!
//! // Upload an image and send it to one group.
//! let key = bot.upload_image("https://example.com/chart.png").await?;
//! for result in bot.send_image(&key, "oc_a1b2").await? {
//!     if let Err(err) = &result.outcome {
//!         eprintln!("{}: {err}", result.chat_id.0);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod selector;
pub mod transport;

pub use client::FeishuBot;
pub use config::{BotConfig, Credentials};
pub use domain::{
    ChatId, Group, ImageSource, MessageId, MessagePayload, SendResult, UserInfo,
};
pub use errors::{Error, Result};
pub use selector::GroupSelector;
pub use transport::{RawResponse, ReqwestTransport, Transport};
