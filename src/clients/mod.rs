pub mod fakes;
pub mod github_client;
pub mod llm_client;
pub mod traits;

pub use github_client::GithubClient;
pub use llm_client::LlmClient;
pub use traits::{ConceptCheckRequest, FileReviewRequest, InferenceProvider, SourceControl};
