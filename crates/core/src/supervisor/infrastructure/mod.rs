pub mod channel_reset_source;
pub mod channel_sink;
