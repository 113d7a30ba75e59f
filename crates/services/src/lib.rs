#![forbid(unsafe_code)]

pub mod error;
pub mod identity;
pub mod sessions;

pub use exam_core::Clock;

pub use error::{IdentityError, SessionError};
pub use identity::{IdentityProvider, LocalIdentityProvider};
pub use sessions::{
    CountdownEnd, ExamLoopService, ExamSession, IntervalTicker, ManualTicker, NavigatorSlot,
    PrimaryAction, SessionProgress, SessionRegistry, SessionView, SharedSession, SubmitOutcome,
    TickHandle, TickOutcome, Ticker, Transition, manual_ticker, run_countdown,
};
