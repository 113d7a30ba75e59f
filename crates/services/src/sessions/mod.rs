mod progress;
mod registry;
mod service;
mod timer;
mod view;
mod workflow;

// Public API of the exam session subsystem.
pub use crate::error::SessionError;
pub use progress::SessionProgress;
pub use registry::{SessionRegistry, SharedSession};
pub use service::{ExamSession, TickOutcome, Transition};
pub use timer::{
    CountdownEnd, IntervalTicker, ManualTicker, TickHandle, Ticker, manual_ticker, run_countdown,
};
pub use view::{NavigatorSlot, PrimaryAction, QuestionView, SessionView};
pub use workflow::{ExamLoopService, SubmitOutcome};
