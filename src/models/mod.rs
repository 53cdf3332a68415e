// Plain data shared by the codec and the services
pub mod action;
pub mod proposal_state;
pub mod report;

// Re-export commonly used types
pub use action::*;
pub use proposal_state::*;
pub use report::*;
