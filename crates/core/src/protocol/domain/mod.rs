pub mod line_demuxer;
pub mod protocol_message;
