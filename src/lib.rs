pub mod adapters;
#[cfg(feature = "cli")]
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use crate::adapters::{Database, LocalStorage};
#[cfg(feature = "cli")]
pub use crate::app::App;
pub use crate::config::Settings;
pub use crate::core::{RateBook, RatesUpdater, UseCases};
pub use crate::utils::error::{Result, ValutaError};
