//! Business operations built on the transaction manager.
//!
//! [`MemberService`] saves a member and a log message through two
//! repositories. Whether the service and each repository open a
//! transactional boundary is set by [`ServiceConfig`], so the same two
//! operations show every combination of joined and separate transactions.

mod config;
mod error;
mod member;
mod repository;

pub use config::{ServiceConfig, DEFAULT_FAILURE_MARKER};
pub use error::{ServiceError, ServiceResult};
pub use member::MemberService;
pub use repository::{LogRepository, MemberRepository, Repository};
