/// Builder for constructing fixture pools.
pub mod builder;
/// Producer loop feeding jobs into the pool.
pub mod dispatcher;
/// The fixture pool: admission, release and drain.
pub mod pool;
/// Shutdown signalling and coordination.
pub mod shutdown;

pub use builder::FixturePoolBuilder;
pub use dispatcher::{DispatchSummary, Dispatcher};
pub use pool::{FixtureLease, FixturePool, PoolPhase, PoolSnapshot};
pub use shutdown::{ShutdownCoordinator, ShutdownToken};
