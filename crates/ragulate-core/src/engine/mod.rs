pub mod cancel;
pub mod progress;
pub mod runner;

pub use cancel::CancelToken;
pub use progress::{Progress, ProgressObserver, ProgressSnapshot};
pub use runner::{Evaluator, EvaluatorSettings, RunState, RunSummary, RunTotals};
