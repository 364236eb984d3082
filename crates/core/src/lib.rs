// inspect-broker: routes item lookups onto a small pool of coordinator sessions.
//
// The broker owns session lifecycle, per-session pacing, request
// deduplication and failover. The wire protocol itself is supplied by a
// `Transport` implementation (see `inspect-runtime` for the gateway one).

pub mod broker;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod outcome;
pub mod pool;
pub mod rate_limiter;
pub mod registry;
pub mod session;
pub mod stats;
pub mod testing;
pub mod transport;

pub use broker::Broker;
pub use config::{BrokerConfig, load_accounts};
pub use error::{Error, Result};
pub use outcome::{LookupOutcome, Unavailable};
pub use pool::SessionPool;
pub use rate_limiter::{RateGuard, RateLimiter};
pub use registry::{Registry, Resolution, Role, Waiter};
pub use session::{Session, SessionId, SessionState};
pub use stats::{Stats, StatsSnapshot};
pub use transport::{Transport, TransportEvent, TransportFuture, WireRequest};

pub use inspect_protocol::{Credentials, ItemDescriptor, LookupParams};
