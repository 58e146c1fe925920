//! Ingestion core: serial bytes in, unit-normalized samples out to every
//! live subscriber, with best-effort persistence and a demo fallback.

pub mod error;
pub mod hub;
pub mod line;
pub mod persist;
pub mod playback;
pub mod sample;
pub mod serial;
pub mod supervisor;

pub use error::{DecodeError, HubError, PersistenceError, PlaybackError, SourceError};
pub use hub::{BroadcastHub, Payload, Producer, Subscription};
pub use sample::{Layout, SensorSample, Vec3};
