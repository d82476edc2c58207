//! Server-side session broker.
//!
//! A sequencer claims a session name, tracks join it and receive slot
//! numbers, and the whole session disappears when its sequencer goes away.
//! The [`SessionRegistry`] owns this lifecycle and broadcasts transitions on
//! an event bus; routing itself lives in `midimux-core`, keyed by the
//! [`midimux_core::TrackId`] values assigned here.
//!
//! # Example
//!
//! ```
//! use midimux_core::ConnectionId;
//! use midimux_session::SessionRegistry;
//!
//! let mut registry = SessionRegistry::new(16);
//! registry.claim("jam1", ConnectionId::new("seq")).unwrap();
//!
//! let assignment = registry
//!     .join("jam1", ConnectionId::new("sock-1"), "AB")
//!     .unwrap();
//! assert_eq!(assignment.track.0, 0);
//!
//! let evicted = registry.sequencer_disconnected("jam1");
//! assert_eq!(evicted, vec![ConnectionId::new("sock-1")]);
//! ```

pub mod error;
pub use error::{ClaimError, JoinError};

mod session;
pub use session::{Participant, Session};

mod registry;
pub use registry::{SessionEvent, SessionRegistry, SlotAssignment, DEFAULT_MAX_ROUNDS};
