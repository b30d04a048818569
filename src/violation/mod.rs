pub mod lifecycle;
pub mod state_machine;

pub use lifecycle::{ActiveViolation, ViolationLedger};
pub use state_machine::WrongWayState;
