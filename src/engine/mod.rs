pub mod intake;
pub mod lifecycle;
pub mod matching;
pub mod pricing;
pub mod queue;
pub mod ranking;
pub mod state_machine;
