pub mod detection_supervisor;
pub mod domain;
pub mod infrastructure;
pub mod outcome_router;
pub mod request_slot;
pub mod timeout_race;
