pub mod challenge;
pub mod detection;
pub mod loaders;
pub mod pull_request;
pub mod review;

pub use challenge::{Challenge, ChallengeCatalog, DayContext};
pub use detection::{DetectionMethod, DetectionSignal, ResolvedDay};
pub use loaders::load_catalog;
pub use pull_request::{
    parse_pr_reference, select_in_range, ChangedFile, DateRange, ListingCounts, PrSummary,
    PullRequest,
};
pub use review::{
    ChallengeVerdict, FileReview, ReviewAction, ReviewDecision, ReviewStatus, TokenUsage,
};
