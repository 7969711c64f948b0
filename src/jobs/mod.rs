//! Job core: the record, its registry, the executor driving it, and the
//! service callers submit through.

pub mod executor;
pub mod model;
pub mod registry;
pub mod service;

pub use executor::JobExecutor;
pub use model::{FailureDetail, Job, JobState, NewJob, StateTransition};
pub use registry::{JobRegistry, RegistrySummary};
pub use service::JobService;
