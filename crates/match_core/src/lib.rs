//! # Match Core - Authoritative Chess Match Coordination
//!
//! Transport-agnostic core of the gambit match server. It owns every live
//! two-player match and decides, for each request, whether it is allowed and
//! what everyone involved should be told.
//!
//! ## Components
//!
//! * [`engine`] - Rules engine capability trait and the standard chess engine
//! * [`registry`] - Which connection currently speaks for which user
//! * [`store`] - Id-addressed matches, each behind its own lock
//! * [`coordinator`] - Lifecycle operations, disconnect handling, timers
//! * [`expiry`] - One cancellable timer per match
//! * [`protocol`] - JSON envelopes exchanged with clients
//!
//! ## Lifecycle
//!
//! ```text
//! Pending --join--> Ready --start--> Started --mate/draw/resign--> Finished --retention--> (evicted)
//!    ^                |
//!    +--joiner leaves-+        Pending --expiry/cancel--> Cancelled (removed)
//!
//! Started --both players gone past the abandonment window--> Cancelled (removed)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use match_core::{MatchCoordinator, MatchSettings, NullOutbox, ShakmatyFactory};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let coordinator = Arc::new(MatchCoordinator::new(
//!     MatchSettings::default(),
//!     Arc::new(ShakmatyFactory),
//!     Arc::new(NullOutbox),
//! ));
//! coordinator.init();
//! // ... dispatch client events, report disconnects ...
//! coordinator.shutdown().await;
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod expiry;
pub mod model;
pub mod outbox;
pub mod protocol;
pub mod registry;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::MatchSettings;
pub use coordinator::{CoordinatorStats, MatchCoordinator};
pub use engine::{RulesEngine, RulesEngineFactory, ShakmatyEngine, ShakmatyFactory};
pub use error::MatchError;
pub use model::{Color, ConnectionId, Identity, MatchId, MatchStatus, UserId};
pub use outbox::{NullOutbox, Outbox};
pub use protocol::{InboundEvent, ProtocolError, ServerMessage};
