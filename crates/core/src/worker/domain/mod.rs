pub mod detection_config;
pub mod worker_launcher;
