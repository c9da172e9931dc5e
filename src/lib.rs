pub mod ai_client;
pub mod ai_flows;
pub mod app;
pub mod badges;
pub mod card_service;
pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod profile_service;
pub mod quiz_service;
pub mod srs_scheduler;
pub mod storage;
pub mod task_service;

pub use ai_client::{AiClient, GenerativeBackend};
pub use ai_flows::AiFlows;
pub use app::StudyApp;
pub use badges::{BADGE_DEFINITIONS, BadgeContext, BadgeTrigger};
pub use card_service::CardService;
pub use config::Config;
pub use errors::StudyError;
pub use models::*;
pub use profile_service::ProfileService;
pub use quiz_service::QuizService;
pub use srs_scheduler::{ReviewGrade, SrsScheduler};
pub use storage::KvStore;
pub use task_service::TaskService;
