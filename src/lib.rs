pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod item;
pub mod metrics;
pub mod output;
pub mod retry;
pub mod signal;
pub mod source;

pub use client::{ClientSettings, HttpClient, ReqwestClient, Response};
pub use dispatcher::{DispatchState, Dispatcher};
pub use error::{Error, RequestError, Result};
pub use item::{Attempt, Outcome, WorkItem};
pub use metrics::{Aggregator, Progress, RankedEntry, Summary};
pub use retry::RetryPolicy;
pub use signal::{StopHandle, StopSignal, stop_channel};
pub use source::{CandidateSource, DispatchMode, EndpointSource, RepeatSource};
