//! Command implementations.

pub mod decisions;
pub mod policy;
pub mod verify;

pub use self::decisions::execute_decisions;
pub use self::policy::execute_policy;
pub use self::verify::execute_verify;
