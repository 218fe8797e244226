//! Application runtime. Owns the background tasks (session bootstrap, both
//! live feeds, the price simulator, metrics) and exposes their state through
//! watch channels plus synchronous accessors for a renderer.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::auth::AuthService;
use crate::config::AppConfig;
use crate::logging;
use crate::metrics;
use crate::model::{PriceBook, SessionIdentity, SubscribedSet, Ticker};
use crate::simulator::{run_price_simulator, SimulatorConfig, SimulatorState};
use crate::store::{DocumentStore, StorePaths, WriteFields};
use crate::sync::{run_price_feed, run_subscription_feed};
use crate::view::{self, Screen, StockView};

pub struct App {
    store: Arc<dyn DocumentStore>,
    auth: Arc<dyn AuthService>,
    paths: StorePaths,
    session_rx: watch::Receiver<Option<SessionIdentity>>,
    ready_rx: watch::Receiver<bool>,
    prices_rx: watch::Receiver<PriceBook>,
    subscribed_rx: watch::Receiver<SubscribedSet>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<Result<()>>>,
}

impl App {
    /// Boots the full runtime, simulator included, as the hosted page does.
    pub async fn start(
        store: Arc<dyn DocumentStore>,
        auth: Arc<dyn AuthService>,
        config: AppConfig,
    ) -> App {
        Self::start_with_simulator(
            store,
            auth,
            config,
            Some((SimulatorConfig::default(), SimulatorState::new())),
        )
        .await
    }

    /// Boots the runtime with explicit simulator wiring. `None` leaves the
    /// price collection to other writers, which is what most tests want.
    pub async fn start_with_simulator(
        store: Arc<dyn DocumentStore>,
        auth: Arc<dyn AuthService>,
        config: AppConfig,
        simulator: Option<(SimulatorConfig, SimulatorState)>,
    ) -> App {
        logging::info(
            "app.start",
            "Dashboard runtime starting",
            json!({
                "app_id": config.app_id,
                "project": config.connection.project_id,
                "simulator": simulator.is_some(),
            }),
        );

        let paths = StorePaths::new(config.app_id.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (metrics_tx, metrics_task) = metrics::reporter(shutdown_rx.clone());

        let session_rx = auth.watch_session();
        let (ready_tx, ready_rx) = watch::channel(false);
        let (prices_tx, prices_rx) = watch::channel(PriceBook::new());
        let (subscribed_tx, subscribed_rx) = watch::channel(SubscribedSet::new());

        let mut tasks: Vec<JoinHandle<Result<()>>> = Vec::new();
        tasks.push(tokio::spawn(metrics_task));
        tasks.push(tokio::spawn(run_session_bootstrap(
            Arc::clone(&auth),
            auth.watch_session(),
            ready_tx,
            config.initial_auth_token.clone(),
            shutdown_rx.clone(),
        )));
        tasks.push(tokio::spawn(run_price_feed(
            Arc::clone(&store),
            paths.clone(),
            prices_tx,
            shutdown_rx.clone(),
            metrics_tx.clone(),
        )));
        tasks.push(tokio::spawn(run_subscription_feed(
            Arc::clone(&store),
            paths.clone(),
            auth.watch_session(),
            subscribed_tx,
            shutdown_rx.clone(),
            metrics_tx.clone(),
        )));
        if let Some((simulator_config, state)) = simulator {
            tasks.push(tokio::spawn(run_price_simulator(
                Arc::clone(&store),
                paths.clone(),
                simulator_config,
                state,
                shutdown_rx,
                metrics_tx,
            )));
        }

        App {
            store,
            auth,
            paths,
            session_rx,
            ready_rx,
            prices_rx,
            subscribed_rx,
            shutdown_tx,
            tasks,
        }
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// Current screen, derived from readiness and the session.
    pub fn screen(&self) -> Screen {
        view::route(*self.ready_rx.borrow(), self.session_rx.borrow().as_ref())
    }

    pub fn session(&self) -> Option<SessionIdentity> {
        self.session_rx.borrow().clone()
    }

    pub fn prices(&self) -> PriceBook {
        self.prices_rx.borrow().clone()
    }

    pub fn subscribed(&self) -> SubscribedSet {
        self.subscribed_rx.borrow().clone()
    }

    pub fn stock(&self, ticker: Ticker) -> StockView {
        view::stock_view(&self.prices_rx.borrow(), &self.subscribed_rx.borrow(), ticker)
    }

    pub fn watchlist(&self) -> Vec<StockView> {
        view::watchlist_rows(&self.prices_rx.borrow(), &self.subscribed_rx.borrow())
    }

    pub fn available_tickers(&self) -> Vec<Ticker> {
        view::available_tickers(&self.subscribed_rx.borrow())
    }

    pub fn watch_session(&self) -> watch::Receiver<Option<SessionIdentity>> {
        self.session_rx.clone()
    }

    pub fn watch_ready(&self) -> watch::Receiver<bool> {
        self.ready_rx.clone()
    }

    pub fn watch_prices(&self) -> watch::Receiver<PriceBook> {
        self.prices_rx.clone()
    }

    pub fn watch_subscribed(&self) -> watch::Receiver<SubscribedSet> {
        self.subscribed_rx.clone()
    }

    /// Creates or deletes the caller's subscription document for `ticker`.
    /// Without a session this silently does nothing; write failures are
    /// logged and dropped, never retried.
    pub async fn toggle_subscription(&self, ticker: Ticker) {
        let Some(identity) = self.session_rx.borrow().clone() else {
            return;
        };

        let subscribed = self.subscribed_rx.borrow().contains(&ticker);
        let path = self.paths.subscription_document(&identity.uid, ticker);
        let result = if subscribed {
            self.store.delete(&path).await
        } else {
            self.store
                .write(
                    &path,
                    WriteFields::new()
                        .field("ticker", ticker.symbol())
                        .server_timestamp("subscribedAt"),
                )
                .await
        };

        if let Err(err) = result {
            logging::warn(
                "subs.toggle_failed",
                "Subscription toggle dropped",
                json!({ "ticker": ticker.symbol(), "error": err.to_string() }),
            );
        }
    }

    /// Ends the current session. The bootstrap immediately establishes a
    /// fresh anonymous one, which routes back to the auth screen.
    pub async fn sign_out(&self) {
        if let Err(err) = self.auth.sign_out().await {
            logging::warn(
                "auth.sign_out_failed",
                "Sign-out failed",
                json!({ "code": err.code() }),
            );
        }
    }

    /// Stops every background task and waits for them to finish.
    pub async fn shutdown(mut self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks.drain(..) {
            task.await.context("dashboard task panicked")??;
        }
        logging::info_simple("app.stop", "Dashboard runtime stopped");
        Ok(())
    }
}

/// Keeps the app holding *some* identity. Whenever the session drops to
/// `None` this redeems the pre-issued token if one exists, else signs in
/// anonymously. Readiness latches on the first resolved session; if the
/// bootstrap never resolves the app stays on the loading screen.
async fn run_session_bootstrap(
    auth: Arc<dyn AuthService>,
    mut session_rx: watch::Receiver<Option<SessionIdentity>>,
    ready_tx: watch::Sender<bool>,
    initial_token: Option<String>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    loop {
        let current = session_rx.borrow_and_update().clone();
        match current {
            Some(identity) => {
                if !*ready_tx.borrow() {
                    ready_tx.send_replace(true);
                    logging::info(
                        "auth.ready",
                        "Session resolved",
                        json!({ "uid": identity.uid, "anonymous": identity.anonymous }),
                    );
                }
            }
            None => establish_session(auth.as_ref(), initial_token.as_deref()).await,
        }

        tokio::select! {
            changed = session_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    logging::info_simple("auth.bootstrap.stop", "Session bootstrap stopped");
    Ok(())
}

async fn establish_session(auth: &dyn AuthService, token: Option<&str>) {
    if let Some(token) = token {
        match auth.sign_in_with_token(token).await {
            Ok(_) => return,
            Err(err) => {
                logging::warn(
                    "auth.token_rejected",
                    "Pre-issued token rejected; falling back to anonymous",
                    json!({ "code": err.code() }),
                );
            }
        }
    }
    if let Err(err) = auth.sign_in_anonymously().await {
        logging::error(
            "auth.bootstrap_failed",
            "Could not establish a session",
            json!({ "code": err.code(), "error": err.to_string() }),
        );
    }
}

pub mod testkit {
    //! Wiring helpers for integration tests.

    use super::*;
    use crate::auth::memory::MemoryAuth;
    use crate::auth::AuthError;
    use crate::store::memory::MemoryStore;
    use async_trait::async_trait;

    /// Memory-backed app with the simulator disabled and logging silenced.
    /// Returns the store and auth handles so tests can act as the backend.
    pub async fn memory_app(config: AppConfig) -> (App, MemoryStore, MemoryAuth) {
        logging::set_silent(true);
        let store = MemoryStore::new();
        let auth = MemoryAuth::with_seed(0xBADF00D);
        let app = App::start_with_simulator(
            Arc::new(store.clone()),
            Arc::new(auth.clone()),
            config,
            None,
        )
        .await;
        (app, store, auth)
    }

    /// Waits until `rx` holds a value matching `predicate` and returns it.
    pub async fn wait_for<T, F>(rx: &mut watch::Receiver<T>, predicate: F) -> Result<T>
    where
        T: Clone,
        F: Fn(&T) -> bool,
    {
        loop {
            {
                let value = rx.borrow_and_update();
                if predicate(&value) {
                    return Ok(value.clone());
                }
            }
            rx.changed()
                .await
                .context("watch sender dropped while waiting")?;
        }
    }

    /// Auth service that rejects every sign-in, so the session never
    /// resolves and the bootstrap stays stuck.
    pub struct NullAuth {
        session: watch::Sender<Option<SessionIdentity>>,
    }

    impl NullAuth {
        pub fn new() -> Self {
            let (session, _) = watch::channel(None);
            Self { session }
        }
    }

    impl Default for NullAuth {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl AuthService for NullAuth {
        async fn sign_up(&self, _: &str, _: &str) -> Result<SessionIdentity, AuthError> {
            Err(AuthError::Internal("auth disabled".to_string()))
        }

        async fn sign_in(&self, _: &str, _: &str) -> Result<SessionIdentity, AuthError> {
            Err(AuthError::Internal("auth disabled".to_string()))
        }

        async fn sign_in_with_token(&self, _: &str) -> Result<SessionIdentity, AuthError> {
            Err(AuthError::Internal("auth disabled".to_string()))
        }

        async fn sign_in_anonymously(&self) -> Result<SessionIdentity, AuthError> {
            Err(AuthError::Internal("auth disabled".to_string()))
        }

        async fn sign_out(&self) -> Result<(), AuthError> {
            Ok(())
        }

        fn watch_session(&self) -> watch::Receiver<Option<SessionIdentity>> {
            self.session.subscribe()
        }
    }
}
