//! Headless stock dashboard: a live watchlist over a document store with
//! snapshot fan-out, session-aware subscriptions and a local random-walk
//! price simulator.
//!
//! The crate is the client orchestration only; rendering and the durable
//! backend are external. Everything observable flows through watch channels
//! owned by [`app::App`].

pub mod app;
pub mod auth;
pub mod config;
pub mod form;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod simulator;
pub mod store;
pub mod sync;
pub mod view;

pub use app::App;
pub use config::AppConfig;
pub use model::{PriceBook, PriceRecord, SessionIdentity, SubscribedSet, SubscriptionRecord, Ticker};
pub use view::Screen;
