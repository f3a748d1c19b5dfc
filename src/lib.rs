pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod labels;
pub mod persistence;
pub mod scheduler;
pub mod services;

pub use config::AppConfig;
pub use domain::{Snapshots, StatFamily, StatRole};
pub use error::{Result, StatBotError};
pub use persistence::{ChannelBinding, ChannelRegistry};
pub use scheduler::{CadenceScheduler, DueSet};
pub use services::{Reconciler, TickReport};
