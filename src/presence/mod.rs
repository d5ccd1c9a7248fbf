mod registry;

pub use registry::{ConnectionRecord, PresenceRegistry, PresenceStats};
