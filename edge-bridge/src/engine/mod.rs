//! Engine bridge
//!
//! ```text
//! WriteRouter ──decide──▶ LocalStore            (local / draft)
//!      │
//!      └──▶ CircuitBreaker ─▶ EngineClient ─▶ POST /rpc/execute
//!                               │ failure            │ ok
//!                               ▼                    ▼
//!                        FailedPostLedger     ArchivalReconciler
//! ```

pub mod breaker;
pub mod client;
pub mod policy;
pub mod reconcile;
pub mod router;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use client::{EngineClient, EngineConfig};
pub use policy::{EngineKind, ModulePolicy, ModuleRegistry, RouteDecision, decide};
pub use reconcile::{ArchivalReconciler, ReconcileOutcome};
pub use router::{SaveOutcome, WriteRouter};
