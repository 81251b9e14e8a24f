pub mod rate_book;
pub mod updater;
pub mod usecases;

pub use crate::domain::ports::{RatesSource, Storage};
pub use crate::utils::error::Result;
pub use rate_book::{RateBook, RateQuote};
pub use updater::{RatesUpdater, UpdateReport};
pub use usecases::{PortfolioReport, TradeReceipt, TradeSide, UseCases};
