pub mod astar;
pub mod difficulty;
pub mod eta;
pub mod heuristics;
pub mod segments;

pub use astar::AstarResult;
pub use difficulty::DifficultyBreakdown;
pub use eta::{IterationTrace, RouteProfile, RoutingContext};
pub use heuristics::SailingHeuristics;
pub use segments::{MergedSegment, RawSegment};
