pub mod challenge_validator;
pub mod day_detector;
pub mod file_reviewer;
pub mod structure_validator;
pub mod token_optimizer;

pub use challenge_validator::ChallengeValidator;
pub use day_detector::{resolve_day, DayDetector};
pub use file_reviewer::{call_with_retry, parse_review_response, FileReviewer};
pub use structure_validator::{validate_structure, StructureIssue, StructureReport};
