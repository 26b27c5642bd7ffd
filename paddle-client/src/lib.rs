//! Paddle Arena Client Core
//!
//! Runtime-independent client pieces for the Paddle Arena protocol: the
//! matchmaking-to-game session handoff, reconnection with exponential
//! backoff, and the fixed-timestep simulation loop with snapshot
//! interpolation. Rendering and input live in the host application; this
//! crate supplies the state the renderer reads.
//!
//! A frame of the client loop looks like:
//!
//! ```no_run
//! use std::time::Duration;
//! use paddle_client::snapshot::{InterpolationClock, SnapshotBuffer};
//! use paddle_client::timestep::FixedTimestep;
//!
//! let mut timestep = FixedTimestep::default();
//! let mut buffer = SnapshotBuffer::new();
//! let mut clock = InterpolationClock::default();
//!
//! // each frame:
//! let frame_delta = Duration::from_millis(16);
//! for _ in 0..timestep.advance(frame_delta) {
//!     // run one fixed simulation step (local prediction, input sampling)
//! }
//! if let Some(at) = clock.render_time() {
//!     let _ball = buffer.sample("ball", at);
//!     // draw, blending locally simulated state by timestep.alpha()
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod channel;
pub mod connection;
pub mod handoff;
pub mod messages;
pub mod reconnect;
pub mod snapshot;
pub mod timestep;

pub use channel::{ClientError, GameConnection, MatchmakingChannel};
pub use connection::{ConnectionEvent, ConnectionLifecycle, ConnectionPhase};
pub use handoff::SessionHandoff;
pub use reconnect::{ReconnectManager, ReconnectPolicy, ReconnectState};
pub use snapshot::{InterpolationClock, SnapshotBuffer};
pub use timestep::FixedTimestep;
