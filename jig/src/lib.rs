//! Jig - a fixed-capacity pool of work fixtures.
//!
//! A production-line style executor: a fixed set of fixtures is created up
//! front, producers hand each job to an idle fixture (waiting while all of
//! them are busy), and a shutdown lets in-flight jobs finish before every
//! fixture stops.
//!
//! # Core Concepts
//!
//! - **Job**: An immutable unit of work ([`Job`]) with a producer-assigned
//!   [`JobId`] and a duration.
//!
//! - **Fixture**: A worker slot identified by [`FixtureId`]. It runs one job
//!   at a time and moves between [`FixtureState::Idle`],
//!   [`FixtureState::Busy`] and [`FixtureState::Stopped`].
//!
//! - **Pool**: [`FixturePool`] owns the fixtures. `acquire` blocks until a
//!   fixture is idle and is the only backpressure in the system; `shutdown`
//!   drains it.
//!
//! - **Workload**: The [`Workload`] trait is what a fixture actually does
//!   with a job. Failures and panics are contained per job.
//!
//! - **Events**: Job and pool lifecycle events go through an
//!   [`EventPublisher`], either the [`InProcEventBus`] or the [`LogPublisher`].
//!
//! - **Producers**: [`JobSource`] generates jobs at a fixed cadence and the
//!   [`Dispatcher`] feeds them into the pool until a [`ShutdownCoordinator`]
//!   stops it.
//!
//! # Feature Flags
//!
//! - `metrics` - Prometheus metrics support
//!
//! # Example
//!
//! ```ignore
//! use jig::*;
//! use std::sync::Arc;
//!
//! let pool = Arc::new(
//!     FixturePoolBuilder::new(PoolConfig::default())
//!         .with_events(Arc::new(LogPublisher::new()))
//!         .build()?,
//! );
//! let coordinator = ShutdownCoordinator::new(Arc::clone(&pool));
//! coordinator.trigger_after(Duration::from_secs(60));
//!
//! let source = JobSource::new(&SourceConfig::default(), FixedDuration(Duration::from_secs(3)));
//! let stop = coordinator.token();
//! tokio::spawn(async move { Dispatcher::new(pool).run(source.into_stream(), &stop).await });
//! coordinator.run().await?;
//! ```

/// Pool and producer configuration.
///
/// [`PoolConfig`] describes the tray layout and optional timeouts;
/// [`SourceConfig`] the product cadence and duration range.
pub mod config;

/// Error type shared by the pool and its producers.
pub mod error;

/// Fixture lifecycle events and publishers.
///
/// - [`EventPublisher`] and [`EventSubscriber`] for pub/sub patterns
/// - [`FixtureEvent`] and [`FixtureEventPayload`] for event data
/// - [`InProcEventBus`] for in-process broadcasting
/// - [`LogPublisher`] for human-readable progress lines
pub mod events;

/// Fixture identity, state and the per-fixture worker task.
pub mod fixture;

/// Jobs and job identifiers.
pub mod job;

#[cfg(feature = "metrics")]
/// Prometheus metrics, enabled by the `metrics` feature.
pub mod metrics;

/// Pool runtime: the [`FixturePool`], its builder, the [`Dispatcher`] and
/// shutdown coordination.
pub mod runtime;

/// Job generation for producers.
pub mod source;

/// Tracing spans and recording helpers.
pub mod telemetry;

/// What a fixture does with a job.
pub mod workload;

pub use config::*;
pub use error::*;
pub use events::*;
pub use fixture::{FixtureId, FixtureState};
pub use job::*;
pub use runtime::*;
pub use source::*;
pub use workload::*;
