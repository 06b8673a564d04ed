//! Session repository: tenant-scoped CRUD with optimistic concurrency and
//! filtered listing. The in-memory implementation is the one every other
//! crate's tests are written against; the Postgres implementation is the
//! real backing store.

pub mod context;
pub mod error;
pub mod filter;
pub mod memory;
pub mod postgres;
pub mod repository;

pub use context::{RequestContext, Role};
pub use error::RepositoryError;
pub use filter::{Page, PageResult, SessionFilter};
pub use memory::InMemorySessionRepository;
pub use postgres::PostgresSessionRepository;
pub use repository::SessionRepository;
