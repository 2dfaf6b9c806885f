pub mod protocol;
pub mod shared;
pub mod supervisor;
pub mod worker;
