pub mod interpreter_resolver;
pub mod process_launcher;
