// Fetch orchestrator.
// Builds deferred fetches against the downstream service and drives the two query handlers.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
use tracing::Span;
use url::Url;

use crate::cache::Cached;
use crate::config::Config;
use crate::downstream::{DownstreamClient, FetchRequest, MoneyModel, SharedList, Transport, UserView};
use crate::error::Result;
use crate::pipeline::{
    BoundedResolver, Computation, Deferred, FetchOutcome, StatusClassifier, observe_into,
};

/// Owns the transport, classifier, and worker pool handle used by every fetch.
pub struct FetchOrchestrator {
    config: Config,
    base_url: Url,
    transport: Arc<dyn Transport>,
    classifier: Arc<StatusClassifier>,
    runtime: Handle,
    span: Span,
}

impl FetchOrchestrator {
    /// Create an orchestrator talking to the configured service over HTTP.
    pub fn new(config: Config, runtime: Handle) -> Result<Self> {
        Self::with_transport(config, runtime, DownstreamClient::new()?)
    }

    /// Create an orchestrator with a custom transport.
    pub fn with_transport(
        config: Config,
        runtime: Handle,
        transport: impl Transport,
    ) -> Result<Self> {
        let base_url = Url::parse(&config.downstream.base_url)?;
        let span = tracing::info_span!("fetch", base_url = %base_url);

        Ok(Self {
            config,
            base_url,
            transport: Arc::new(transport),
            classifier: Arc::new(StatusClassifier::default()),
            runtime,
            span,
        })
    }

    /// Replace the status rules.
    pub fn with_classifier(mut self, classifier: StatusClassifier) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Replace the log context handed to every computation.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Describe one fetch. Nothing is sent until the result is started.
    pub fn build<T>(&self, request: FetchRequest) -> Deferred<T>
    where
        T: DeserializeOwned + Clone + Send + 'static,
    {
        let transport = Arc::clone(&self.transport);
        let classifier = Arc::clone(&self.classifier);
        let base_url = self.base_url.clone();

        Deferred::new(self.runtime.clone(), move || {
            let transport = Arc::clone(&transport);
            let classifier = Arc::clone(&classifier);
            let url = request.resolve(&base_url);
            async move {
                let url = url?;
                let response = transport.get(url).await?;
                classifier.classify::<T>(&response)
            }
        })
        .with_span(self.span.clone())
    }

    /// Wrap `computation` in a new TTL cache instance.
    pub fn cached<T>(&self, computation: &Deferred<T>, ttl: Duration) -> Cached<T>
    where
        T: Clone + Send + 'static,
    {
        computation.cache(ttl)
    }

    /// Block the calling thread for the outcome, up to `deadline`.
    pub fn resolve<C>(&self, computation: &C, deadline: Option<Duration>) -> FetchOutcome<C::Output>
    where
        C: Computation,
    {
        BoundedResolver::new(deadline).block(computation)
    }

    /// Append successful outcomes to `list` as they arrive, without blocking.
    pub fn observe_into<C>(&self, computation: &C, list: &SharedList<C::Output>, label: &'static str)
    where
        C: Computation,
        C::Output: Debug,
    {
        observe_into(computation, list, label);
    }

    /// Request for the single-money endpoint.
    pub fn single_money_request(&self, user_id: Option<i32>) -> FetchRequest {
        let request = FetchRequest::new(self.config.downstream.single_money_path.as_str());
        match user_id {
            Some(id) => request.path_param(id),
            None => request,
        }
    }

    /// Fetch the user's money, waiting as long as it takes.
    pub fn query_single_money(&self, user_id: i32) -> Result<UserView> {
        let _enter = self.span.enter();
        let mut view = UserView::new("myname").with_user_id(user_id);

        tracing::info!(user_id, "single-money query started");
        let money: Deferred<MoneyModel> = self.build(self.single_money_request(Some(user_id)));

        view.money_model = Some(self.resolve(&money, None)?);
        tracing::info!(user_id, "single-money query returning");
        Ok(view)
    }

    /// Fetch money with a deadline, plus two fire-and-observe subscriptions.
    ///
    /// Three round trips are made: the cached run blocked on, a second
    /// independently cached run, and a bare run. The view is returned as soon
    /// as the first resolves; the two observers append to its list later.
    pub fn query_with_timeout(&self) -> Result<UserView> {
        let _enter = self.span.enter();
        let mut view = UserView::new("myname-mono");
        let ttl = self.config.cache.ttl();
        let deadline = self.config.resolve.deadline();

        tracing::info!(ttl_secs = ttl.as_secs(), "timeout query started");
        let money: Deferred<MoneyModel> = self.build(self.single_money_request(None));

        let blocked = self.cached(&money, ttl);
        match self.resolve(&blocked, deadline) {
            Ok(value) => view.money_model = Some(value),
            Err(err) => {
                tracing::warn!(error = %err, "timeout query failed");
                return Err(err);
            }
        }

        let observed = self.cached(&money, ttl);
        self.observe_into(&observed, &view.money_model_list, "cached");
        self.observe_into(&money, &view.money_model_list, "bare");

        view.stamp();
        tracing::info!("timeout query returning");
        Ok(view)
    }
}

impl Debug for FetchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchOrchestrator")
            .field("base_url", &self.base_url.as_str())
            .field("classifier", &self.classifier)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downstream::RawResponse;
    use crate::error::FetchError;
    use crate::pipeline::StatusRule;
    use futures_util::FutureExt;
    use futures_util::future::BoxFuture;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Transport that replays scripted responses and records requested URLs.
    #[derive(Clone, Default)]
    struct ScriptedTransport {
        calls: Arc<AtomicUsize>,
        urls: Arc<Mutex<Vec<String>>>,
        status: u16,
        body: &'static str,
        delay: Duration,
    }

    impl ScriptedTransport {
        fn new(status: u16, body: &'static str) -> Self {
            Self {
                status,
                body,
                ..Self::default()
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn get(&self, url: Url) -> BoxFuture<'static, Result<RawResponse>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().push(url.to_string());
            let (status, body, delay) = (self.status, self.body, self.delay);
            async move {
                tokio::time::sleep(delay).await;
                Ok(RawResponse::new(status, body))
            }
            .boxed()
        }
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap()
    }

    fn orchestrator(rt: &tokio::runtime::Runtime, transport: ScriptedTransport) -> FetchOrchestrator {
        FetchOrchestrator::with_transport(Config::default(), rt.handle().clone(), transport).unwrap()
    }

    fn wait_for(mut done: impl FnMut() -> bool) {
        for _ in 0..200 {
            if done() {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_build_is_inert() {
        let rt = runtime();
        let transport = ScriptedTransport::new(200, r#"{"money": 1}"#);
        let orch = orchestrator(&rt, transport.clone());

        let _money: Deferred<MoneyModel> = orch.build(orch.single_money_request(Some(7)));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_query_single_money() {
        let rt = runtime();
        let transport = ScriptedTransport::new(200, r#"{"money": 42}"#);
        let orch = orchestrator(&rt, transport.clone());

        let view = orch.query_single_money(7).unwrap();
        assert_eq!(view.user_id, Some(7));
        assert_eq!(view.username, "myname");
        assert_eq!(view.money_model, Some(MoneyModel { money: 42.0 }));
        assert_eq!(
            transport.urls.lock().as_slice(),
            ["http://localhost:82/project-b/query/money/single-money"]
        );
    }

    #[test]
    fn test_query_with_timeout_makes_three_calls() {
        let rt = runtime();
        let transport = ScriptedTransport::new(200, r#"{"money": 42}"#);
        let orch = orchestrator(&rt, transport.clone());

        let view = orch.query_with_timeout().unwrap();
        assert_eq!(view.username, "myname-mono");
        assert_eq!(view.user_id, None);
        assert_eq!(view.money_model, Some(MoneyModel { money: 42.0 }));
        assert!(view.create_time_str.is_some());

        wait_for(|| view.money_model_list.len() == 2);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_query_with_timeout_view_returned_before_observers() {
        let rt = runtime();
        let mut transport = ScriptedTransport::new(200, r#"{"money": 5}"#);
        transport.delay = Duration::from_millis(200);
        let orch = orchestrator(&rt, transport.clone());

        let view = orch.query_with_timeout().unwrap();
        assert!(view.money_model_list.is_empty());

        wait_for(|| view.money_model_list.len() == 2);
    }

    #[test]
    fn test_query_with_timeout_propagates_classified_failure() {
        let rt = runtime();
        let transport = ScriptedTransport::new(503, "");
        let orch = orchestrator(&rt, transport.clone());

        let err = orch.query_with_timeout().unwrap_err();
        assert_eq!(err.code(), Some(503));
        assert_eq!(err.to_string(), "503 error code-11111");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_query_with_timeout_deadline() {
        let rt = runtime();
        let mut transport = ScriptedTransport::new(200, r#"{"money": 5}"#);
        transport.delay = Duration::from_secs(5);
        let mut config = Config::default();
        config.resolve.deadline_secs = 1;
        let orch =
            FetchOrchestrator::with_transport(config, rt.handle().clone(), transport).unwrap();

        let err = orch.query_with_timeout().unwrap_err();
        assert!(err.is_deadline_exceeded());
    }

    #[test]
    fn test_custom_classifier_rule_takes_precedence() {
        let rt = runtime();
        let transport = ScriptedTransport::new(404, "");
        let classifier = StatusClassifier::default().prepend_rule(StatusRule::new(
            "not_found",
            |status| status == 404,
            |status| FetchError::ClientOrOther {
                code: status,
                message: "no money record".to_string(),
            },
        ));
        let orch = orchestrator(&rt, transport).with_classifier(classifier);

        let money: Deferred<MoneyModel> = orch.build(orch.single_money_request(Some(7)));
        let err = orch.resolve(&money, Some(Duration::from_secs(5))).unwrap_err();
        assert_eq!(err.to_string(), "no money record");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let rt = runtime();
        let mut config = Config::default();
        config.downstream.base_url = "::".to_string();
        let err = FetchOrchestrator::with_transport(
            config,
            rt.handle().clone(),
            ScriptedTransport::default(),
        )
        .unwrap_err();
        assert!(matches!(err, FetchError::InvalidUri(_)));
    }

    #[test]
    fn test_unresolvable_request_fails_at_start() {
        let rt = runtime();
        let transport = ScriptedTransport::new(200, r#"{"money": 1}"#);
        let orch = orchestrator(&rt, transport.clone());

        let money: Deferred<MoneyModel> = orch.build(FetchRequest::new("/users/{id}"));
        let err = orch.resolve(&money, Some(Duration::from_secs(5))).unwrap_err();
        assert!(matches!(err, FetchError::InvalidUri(_)));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }
}
