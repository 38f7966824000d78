pub mod actuator;
pub mod alerts;
pub mod coordinator;
pub mod router;

pub use actuator::{BlockOutcome, EnforcementActuator};
pub use alerts::{LockedAlert, StatusAlert};
pub use coordinator::{LockCoordinator, LockState};
pub use router::{decide, SwitchDecision, SwitchRouter};
