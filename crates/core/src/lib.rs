pub mod capture;
pub mod config;
pub mod gateway;
pub mod memory;
pub mod model;
pub mod parser;
pub mod session;
pub mod store;
pub mod views;

pub use capture::TaskInput;
pub use config::AppConfig;
pub use gateway::{FailureKind, GatewayError, GatewayOp, TaskGateway};
pub use memory::MemoryGateway;
pub use model::*;
pub use session::{
    AccessToken, AuthGateway, FileSession, SessionProvider, SessionRecord, StaticSession,
    UserProfile,
};
pub use store::{RefreshOutcome, StoreError, TaskStore};
pub use views::{DayWindow, Section, SectionCounts, ViewOrder, ViewSnapshot};
