pub mod outcome;
pub mod reset_source;
pub mod status;
pub mod supervisor_event;
pub mod supervisor_sink;
