//! Track presence and routing configuration.

mod entry;
mod matrix;

pub use entry::{RoutingEntry, RoutingUpdate, TrackPresence};
pub use matrix::{
    MatrixRow, MatrixStats, RoutingChanged, RoutingMatrix, TrackChange, TrackChangeAction,
};
