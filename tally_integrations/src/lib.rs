//! Third-party service clients used by the Tally server.

pub mod telegram;

pub use telegram::TelegramSink;
