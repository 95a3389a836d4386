//! evalhub-runtime: the execution-backend contract.
//!
//! A [`Runtime`] turns a submitted evaluation into running work and can
//! later tear that work down. Dispatch is non-blocking: it returns a
//! [`DispatchHandle`] the caller may await for drain completion, while
//! per-benchmark failures flow out-of-band through a [`StatusSink`].
//!
//! # Architecture
//!
//! ```text
//! caller
//!   └── Runtime::dispatch(evaluation, sink) ──► DispatchHandle
//!         ├── LocalRuntime  (no-op, completes immediately)
//!         └── K8sRuntime    (evalhub-k8s: worker pool → cluster objects)
//!                 └── StatusSink::report_benchmark_status (failures)
//! ```

pub mod error;
pub mod handle;
pub mod local;
pub mod runtime;
pub mod status;

pub use error::{RuntimeError, RuntimeResult, SinkError};
pub use handle::{DispatchHandle, DispatchSummary, WorkerReport};
pub use local::LocalRuntime;
pub use runtime::Runtime;
pub use status::{LogStatusSink, MemoryStatusSink, StatusSink};
