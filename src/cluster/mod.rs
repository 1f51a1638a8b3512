//! Cluster membership and liveness.

pub mod events;
pub mod membership;

pub use events::{ChannelEventListener, LoggingEventListener, MemberEvent, MemberEventListener};
pub use membership::{Membership, Replica};
