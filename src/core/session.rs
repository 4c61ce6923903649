//! Live spending view over a set of feeds.
//!
//! A [`Session`] subscribes to every feed once when started. All state (the
//! feed snapshots, the selection and the active-operation count) is owned by a
//! single background task that applies [`Event`]s one at a time, so the derived
//! view is never computed concurrently. Feed pumps and update operations run on
//! the worker pool and only send events to that task.
//!
//! Consumers observe the session through `watch` receivers and drive it with
//! commands. Failures never stop a session; they are handed to its [`ErrorSink`].
use crate::core::allowance::AllowanceDraft;
use crate::core::error::{ErrorSink, Operation, ReportedError, SpendError};
use crate::core::feeds::{
    AllowanceFeed, ExchangeRateFeed, FeedStream, PreferenceStore, PricingFeed, SpendingFeed,
};
use crate::core::model::{
    AllowanceSettings, Currency, DerivedView, ExchangeRate, Metric, PriceSchedule, Selection,
    SpendingMetrics,
};
use crate::core::tracker::{ActivitySink, TaskTracker, TrackedOp};
use crate::core::view::{Snapshots, derive_view};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

/// External collaborators a session reads from and writes to.
#[derive(Clone)]
pub struct Collaborators {
    pub allowance: Arc<dyn AllowanceFeed>,
    pub pricing: Arc<dyn PricingFeed>,
    pub spending: Arc<dyn SpendingFeed>,
    pub exchange_rate: Arc<dyn ExchangeRateFeed>,
    pub preferences: Arc<dyn PreferenceStore>,
}

#[derive(Debug)]
enum Snapshot {
    Allowance(AllowanceSettings),
    Prices(PriceSchedule),
    Spending(SpendingMetrics),
    ExchangeRate(ExchangeRate),
}

#[derive(Debug)]
enum Event {
    Snapshot(Snapshot),
    SelectMetric(Metric),
    SelectCurrency(Currency),
    SelectFiatCode(String),
    TaskStarted(Operation),
    TaskFinished(Operation),
    Failed(SpendError),
    /// Acknowledged once every event queued before it has been applied.
    Flush(oneshot::Sender<()>),
}

/// Owner of all mutable session state. Runs on its own task.
struct StateOwner {
    snapshots: Snapshots,
    selection: Selection,
    fiat_code: String,
    active_count: usize,
    selection_tx: watch::Sender<Selection>,
    fiat_code_tx: watch::Sender<String>,
    view_tx: watch::Sender<Option<DerivedView>>,
    active_tx: watch::Sender<usize>,
    allowance_tx: watch::Sender<Option<AllowanceSettings>>,
    errors: Arc<ErrorSink>,
    closed: Arc<AtomicBool>,
}

impl StateOwner {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<Event>) {
        while let Some(event) = events.recv().await {
            if self.closed.load(Ordering::Acquire) {
                break;
            }
            self.apply(event);
        }
        debug!("Session state owner stopped");
    }

    fn apply(&mut self, event: Event) {
        match event {
            Event::Snapshot(snapshot) => {
                match snapshot {
                    Snapshot::Allowance(allowance) => {
                        self.snapshots.allowance = Some(allowance.clone());
                        self.allowance_tx.send_replace(Some(allowance));
                    }
                    Snapshot::Prices(prices) => self.snapshots.prices = Some(prices),
                    Snapshot::Spending(spending) => self.snapshots.spending = Some(spending),
                    Snapshot::ExchangeRate(rate) => self.snapshots.exchange_rate = Some(rate),
                }
                self.recompute();
            }
            Event::SelectMetric(metric) => {
                self.selection.metric = metric;
                self.selection_tx.send_replace(self.selection);
                self.recompute();
            }
            Event::SelectCurrency(currency) => {
                self.selection.currency = currency;
                self.selection_tx.send_replace(self.selection);
                self.recompute();
            }
            Event::SelectFiatCode(code) => {
                self.fiat_code = code.clone();
                self.fiat_code_tx.send_replace(code);
                self.recompute();
            }
            Event::TaskStarted(operation) => {
                self.active_count += 1;
                debug!(%operation, active = self.active_count, "Operation started");
                self.active_tx.send_replace(self.active_count);
            }
            Event::TaskFinished(operation) => {
                let Some(active) = self.active_count.checked_sub(1) else {
                    warn!(%operation, "Operation finished without being started");
                    return;
                };
                self.active_count = active;
                debug!(%operation, active, "Operation finished");
                self.active_tx.send_replace(active);
            }
            Event::Failed(error) => self.errors.report(error),
            Event::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }

    fn recompute(&mut self) {
        if let Some(view) = derive_view(&self.selection, &self.fiat_code, &self.snapshots) {
            self.view_tx.send_replace(Some(view));
        }
    }
}

/// Forwards tracker notifications to the state owner.
struct EventActivity(mpsc::UnboundedSender<Event>);

impl ActivitySink for EventActivity {
    fn started(&self, operation: Operation) {
        let _ = self.0.send(Event::TaskStarted(operation));
    }

    fn finished(&self, operation: Operation) {
        let _ = self.0.send(Event::TaskFinished(operation));
    }
}

/// Waits until the state owner has applied every event sent before this call.
/// Returns immediately once the session is torn down.
async fn flush(events: &mpsc::UnboundedSender<Event>) {
    let (ack, acked) = oneshot::channel();
    if events.send(Event::Flush(ack)).is_ok() {
        let _ = acked.await;
    }
}

/// Tasks owned by a session. Released together, exactly once.
struct Subscriptions {
    handles: Mutex<Option<Vec<AbortHandle>>>,
    closed: Arc<AtomicBool>,
}

impl Subscriptions {
    fn new(closed: Arc<AtomicBool>) -> Self {
        Self {
            handles: Mutex::new(Some(Vec::new())),
            closed,
        }
    }

    fn track(&self, handle: AbortHandle) {
        let mut guard = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_mut() {
            Some(handles) => {
                handles.retain(|h| !h.is_finished());
                handles.push(handle);
            }
            // Already torn down.
            None => handle.abort(),
        }
    }

    fn release(&self) -> bool {
        let handles = self
            .handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match handles {
            Some(handles) => {
                self.closed.store(true, Ordering::Release);
                debug!(tasks = handles.len(), "Releasing session tasks");
                handles.iter().for_each(AbortHandle::abort);
                true
            }
            None => false,
        }
    }
}

struct Inner {
    collaborators: Collaborators,
    events: mpsc::UnboundedSender<Event>,
    tracker: TaskTracker,
    subscriptions: Subscriptions,
    errors: Arc<ErrorSink>,
    selection_rx: watch::Receiver<Selection>,
    fiat_code_rx: watch::Receiver<String>,
    view_rx: watch::Receiver<Option<DerivedView>>,
    active_rx: watch::Receiver<usize>,
    allowance_rx: watch::Receiver<Option<AllowanceSettings>>,
}

impl Inner {
    fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.subscriptions.track(handle.abort_handle());
        handle
    }

    fn subscribe<T, W>(&self, operation: Operation, mut stream: FeedStream<T>, wrap: W)
    where
        T: Send + 'static,
        W: Fn(T) -> Snapshot + Send + 'static,
    {
        let events = self.events.clone();
        self.spawn(async move {
            while let Some(item) = stream.next().await {
                let event = match item {
                    Ok(value) => Event::Snapshot(wrap(value)),
                    Err(e) => {
                        // The feed stays stopped; no resubscription is attempted.
                        let _ = events.send(Event::Failed(SpendError::collaborator(operation, e)));
                        return;
                    }
                };
                if events.send(event).is_err() {
                    return;
                }
            }
            debug!(%operation, "Feed ended");
        });
    }

    fn report(&self, error: SpendError) {
        if self.events.send(Event::Failed(error)).is_err() {
            debug!("Session closed, dropping failure");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.subscriptions.release();
    }
}

/// Handle to a running session. Cloning shares the session; it is torn down by
/// [`Session::shutdown`] or when the last handle is dropped.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Starts a session, seeding the selection from the preference store.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(collaborators: Collaborators, initial_metric: Metric) -> Session {
        let (preferences, load_error) = match collaborators.preferences.load().await {
            Ok(preferences) => (preferences, None),
            Err(e) => (
                Default::default(),
                Some(SpendError::collaborator(Operation::LoadPreferences, e)),
            ),
        };
        debug!(?preferences, %initial_metric, "Starting session");

        let selection = Selection {
            metric: initial_metric,
            currency: preferences.currency,
        };
        let (selection_tx, selection_rx) = watch::channel(selection);
        let (fiat_code_tx, fiat_code_rx) = watch::channel(preferences.fiat_code.clone());
        let (view_tx, view_rx) = watch::channel(None);
        let (active_tx, active_rx) = watch::channel(0);
        let (allowance_tx, allowance_rx) = watch::channel(None);
        let (events, events_rx) = mpsc::unbounded_channel();
        let errors = Arc::new(ErrorSink::new());
        let closed = Arc::new(AtomicBool::new(false));

        let owner = StateOwner {
            snapshots: Snapshots::default(),
            selection,
            fiat_code: preferences.fiat_code,
            active_count: 0,
            selection_tx,
            fiat_code_tx,
            view_tx,
            active_tx,
            allowance_tx,
            errors: Arc::clone(&errors),
            closed: Arc::clone(&closed),
        };

        let inner = Inner {
            tracker: TaskTracker::new(Arc::new(EventActivity(events.clone()))),
            collaborators,
            events,
            subscriptions: Subscriptions::new(closed),
            errors,
            selection_rx,
            fiat_code_rx,
            view_rx,
            active_rx,
            allowance_rx,
        };
        inner.spawn(owner.run(events_rx));

        if let Some(error) = load_error {
            inner.report(error);
        }

        let feeds = inner.collaborators.clone();
        inner.subscribe(
            Operation::AllowanceFeed,
            feeds.allowance.latest(),
            Snapshot::Allowance,
        );
        inner.subscribe(Operation::PricingFeed, feeds.pricing.latest(), Snapshot::Prices);
        inner.subscribe(
            Operation::SpendingFeed,
            feeds.spending.latest(),
            Snapshot::Spending,
        );
        inner.subscribe(
            Operation::ExchangeRateFeed,
            feeds.exchange_rate.latest(),
            Snapshot::ExchangeRate,
        );

        info!("Session started");
        Session {
            inner: Arc::new(inner),
        }
    }

    /// Refreshes every feed.
    ///
    /// The price schedule and the allowance/spending metrics are updated
    /// concurrently as tracked operations; this waits for both to settle and for
    /// their effect on `active_count` and the error sink to be applied. The
    /// exchange rate is updated in the background without affecting `busy`.
    pub async fn refresh(&self) {
        let exchange_rate = Arc::clone(&self.inner.collaborators.exchange_rate);
        let events = self.inner.events.clone();
        self.inner.spawn(async move {
            if let Err(e) = exchange_rate.refresh().await {
                let _ = events.send(Event::Failed(SpendError::collaborator(
                    Operation::RefreshExchangeRate,
                    e,
                )));
            }
        });

        let pricing = Arc::clone(&self.inner.collaborators.pricing);
        let allowance = Arc::clone(&self.inner.collaborators.allowance);
        let tracker = self.inner.tracker.clone();
        let events = self.inner.events.clone();
        let group = self.inner.spawn(async move {
            let failures = tracker
                .run_all(vec![
                    TrackedOp::new(Operation::RefreshPrices, async move {
                        pricing.refresh().await
                    }),
                    TrackedOp::new(Operation::RefreshAllowanceAndMetrics, async move {
                        allowance.refresh_allowance_and_metrics().await
                    }),
                ])
                .await;
            for (operation, e) in failures {
                let _ = events.send(Event::Failed(SpendError::collaborator(operation, e)));
            }
            flush(&events).await;
        });

        if let Err(e) = group.await {
            debug!("Refresh did not complete: {e}");
        }
    }

    /// Applies new allowance settings, refreshing every feed on success.
    ///
    /// An incomplete draft is reported as a validation failure without calling
    /// the allowance feed. Returns whether the settings were applied.
    pub async fn set_allowance(&self, draft: AllowanceDraft) -> bool {
        let settings = match draft.validate() {
            Ok(settings) => settings,
            Err(e) => {
                self.inner.report(e);
                flush(&self.inner.events).await;
                return false;
            }
        };

        let allowance = Arc::clone(&self.inner.collaborators.allowance);
        let tracker = self.inner.tracker.clone();
        let events = self.inner.events.clone();
        let apply = self.inner.spawn(async move {
            let guard = tracker.begin(Operation::ApplyAllowance);
            let result = allowance.apply(&settings).await;
            drop(guard);
            let applied = match result {
                Ok(()) => {
                    info!(?settings, "Allowance applied");
                    true
                }
                Err(e) => {
                    let _ = events.send(Event::Failed(SpendError::collaborator(
                        Operation::ApplyAllowance,
                        e,
                    )));
                    false
                }
            };
            flush(&events).await;
            applied
        });

        let applied = apply.await.unwrap_or(false);
        if applied {
            self.refresh().await;
        }
        applied
    }

    pub fn select_metric(&self, metric: Metric) {
        if self.inner.events.send(Event::SelectMetric(metric)).is_err() {
            debug!("Session closed, ignoring metric selection");
        }
    }

    /// Switches the display currency and persists it as the preferred one.
    pub async fn select_currency(&self, currency: Currency) {
        if self.inner.events.send(Event::SelectCurrency(currency)).is_err() {
            debug!("Session closed, ignoring currency selection");
            return;
        }
        if let Err(e) = self.inner.collaborators.preferences.save_currency(currency).await {
            self.inner
                .report(SpendError::collaborator(Operation::SavePreferences, e));
        }
    }

    /// Switches the fiat currency used for conversions and persists it.
    pub async fn select_fiat_code(&self, code: &str) {
        let code = code.to_uppercase();
        if self
            .inner
            .events
            .send(Event::SelectFiatCode(code.clone()))
            .is_err()
        {
            debug!("Session closed, ignoring fiat currency selection");
            return;
        }
        if let Err(e) = self.inner.collaborators.preferences.save_fiat_code(&code).await {
            self.inner
                .report(SpendError::collaborator(Operation::SavePreferences, e));
        }
    }

    pub fn selection(&self) -> watch::Receiver<Selection> {
        self.inner.selection_rx.clone()
    }

    pub fn fiat_code(&self) -> watch::Receiver<String> {
        self.inner.fiat_code_rx.clone()
    }

    /// The derived view, `None` until every required feed has been observed.
    ///
    /// A recompute that cannot complete, such as a fiat selection whose code is
    /// missing from the exchange rate table, leaves the previous view in place.
    /// The view may then lag behind [`Session::selection`] and
    /// [`Session::fiat_code`] until the inputs allow a recompute.
    pub fn view(&self) -> watch::Receiver<Option<DerivedView>> {
        self.inner.view_rx.clone()
    }

    pub fn active_count(&self) -> watch::Receiver<usize> {
        self.inner.active_rx.clone()
    }

    /// Last known allowance settings.
    pub fn allowance(&self) -> watch::Receiver<Option<AllowanceSettings>> {
        self.inner.allowance_rx.clone()
    }

    pub fn is_busy(&self) -> bool {
        *self.inner.active_rx.borrow() > 0
    }

    /// Waits until no tracked operation is in flight.
    pub async fn wait_idle(&self) {
        let mut active = self.active_count();
        let _ = active.wait_for(|count| *count == 0).await;
    }

    /// Takes the most recent failure not yet taken.
    pub fn take_last_error(&self) -> Option<ReportedError> {
        self.inner.errors.take()
    }

    pub async fn next_error(&self) -> ReportedError {
        self.inner.errors.next().await
    }

    pub fn errors_reported(&self) -> usize {
        self.inner.errors.reported_count()
    }

    /// Cancels every subscription and in-flight operation. Later calls do nothing.
    pub fn shutdown(&self) {
        if self.inner.subscriptions.release() {
            info!("Session shut down");
        }
    }
}
