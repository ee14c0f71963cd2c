pub mod audit;
pub mod census;
pub mod config;
pub mod db;
pub mod error;
pub mod household;
pub mod notifier;

pub use census::CensusService;
pub use config::CensusConfig;
pub use db::Db;
pub use error::{CensusError, CensusResult};
pub use rusqlite;
pub use rusqlite_migration;
pub use serde_rusqlite;
