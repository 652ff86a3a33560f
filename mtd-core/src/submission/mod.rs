//! The submit/record/retry pipeline against the regulator.

pub mod api;
pub mod orchestrator;
pub mod retry;

pub use api::{BusinessDetails, CalculationAck, CalculationStatus, RegulatorApi};
pub use orchestrator::{
    Computation, OutcomeStatus, SubmissionOrchestrator, SubmissionOutcome, SubmissionRequest,
};
pub use retry::{PollPolicy, RetryPolicy};
