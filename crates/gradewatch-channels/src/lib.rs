//! # Gradewatch Channels
//! Notification channel implementations and the fan-out dispatcher.

pub mod dispatcher;
pub mod email;
pub mod feishu;
pub mod serverchan;
pub mod webhook;

pub use dispatcher::NotificationDispatcher;
pub use email::EmailChannel;
pub use feishu::FeishuChannel;
pub use serverchan::ServerChanChannel;
pub use webhook::WebhookChannel;
