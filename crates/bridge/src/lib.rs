pub mod broadcast;
pub mod errors;
pub mod queue;
pub mod types;

pub use broadcast::{BroadcastChannel, MemoryBroadcast, Subscription};
pub use errors::QueueUnavailable;
pub use queue::{JobQueue, MemoryJobQueue};
pub use types::{Detection, DetectionResult, FrameJob, ResultStatus, frame_id};
