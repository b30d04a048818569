pub mod flow;
pub mod history;
pub mod kinematics;

pub use flow::DirectionCache;
pub use history::{TrackHistoryStore, TrackRecord};
pub use kinematics::Kinematics;
