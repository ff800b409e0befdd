//! API clients for price data providers

pub mod yahoo;

pub use yahoo::YahooBarSource;
