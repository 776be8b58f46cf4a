pub mod application;
pub mod db;
pub mod interview;
pub mod lifecycle;
pub mod logging;
pub mod memory;
pub mod quota;
pub mod settings;
pub mod storage;
pub mod store;
pub mod transcript;
pub mod video;

pub use interview::{Decision, Interview, InterviewStatus};
pub use lifecycle::{LifecycleConfig, LifecycleController, LifecycleError};
pub use store::{resolve_interview, InterviewStore, StoreError};
