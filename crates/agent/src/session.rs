//! Advisor sessions: one advisor, many persisted conversations.
//!
//! A send on a session holds that session's lock for the whole exchange, so
//! two sends on the same session never interleave. Different sessions run
//! concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, FixedOffset, Local};
use tracing::{debug, info, warn};

use counsel_core::{AdvisorSpec, ConversationId, ConversationStore, Error, Message, Result};
use counsel_prompt::TemplateLoader;

use crate::orchestrator::{Exchange, Orchestrator};

pub struct AdvisorSession {
    spec: AdvisorSpec,
    loader: TemplateLoader,
    orchestrator: Arc<Orchestrator>,
    store: Arc<dyn ConversationStore>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    clock: Option<DateTime<FixedOffset>>,
}

impl AdvisorSession {
    pub fn new(
        spec: AdvisorSpec,
        loader: TemplateLoader,
        orchestrator: Arc<Orchestrator>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            spec,
            loader,
            orchestrator,
            store,
            locks: Mutex::new(HashMap::new()),
            clock: None,
        }
    }

    /// Resolve `<$datetime$>` tags against a fixed instant instead of the
    /// local clock.
    pub fn with_clock(mut self, now: DateTime<FixedOffset>) -> Self {
        self.clock = Some(now);
        self
    }

    pub fn advisor(&self) -> &AdvisorSpec {
        &self.spec
    }

    fn now(&self) -> DateTime<FixedOffset> {
        self.clock.unwrap_or_else(|| Local::now().fixed_offset())
    }

    fn lock_for(&self, session: &ConversationId) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| Error::Internal("session lock table poisoned".into()))?;
        Ok(locks.entry(session.0.clone()).or_default().clone())
    }

    /// Drop the table entry for `session` once nobody else holds or awaits it.
    fn release(&self, session: &ConversationId, lock: Arc<tokio::sync::Mutex<()>>) {
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        // One reference in the table, one in `lock`
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&session.0);
        }
    }

    /// The opening context for the next exchange:
    /// `[system, ...primer, ...history, user]`.
    pub fn build_seed(&self, history: &[Message], user: Message) -> Result<Vec<Message>> {
        let mut seed = self.loader.load_prompt(&self.spec, &self.now(), history)?;
        seed.extend_from_slice(history);
        seed.push(user);
        Ok(seed)
    }

    /// Send one user message and wait for the advisor's reply.
    ///
    /// The user message and every message the exchange produced are
    /// appended to the store, also when the exchange fails.
    pub async fn send(&self, session: &ConversationId, text: &str) -> Result<Exchange> {
        let lock = self.lock_for(session)?;
        let result = {
            let _guard = lock.lock().await;
            self.send_locked(session, text).await
        };
        self.release(session, lock);
        result
    }

    async fn send_locked(&self, session: &ConversationId, text: &str) -> Result<Exchange> {
        let history = self.store.read_all(session).await?;
        let user = Message::user(text);
        let seed = self.build_seed(&history, user.clone())?;
        debug!(
            advisor = %self.spec.name,
            session = %session,
            history = history.len(),
            seed = seed.len(),
            "Starting exchange"
        );

        match self
            .orchestrator
            .run(seed, &self.spec.parameters, &self.spec.tools)
            .await
        {
            Ok(exchange) => {
                let mut added = Vec::with_capacity(1 + exchange.new_messages().len());
                added.push(user);
                added.extend_from_slice(exchange.new_messages());
                self.store.append_all(session, &added).await?;
                info!(
                    advisor = %self.spec.name,
                    session = %session,
                    rounds = exchange.rounds,
                    "Reply ready"
                );
                Ok(exchange)
            }
            Err(failure) => {
                let mut added = Vec::with_capacity(1 + failure.new_messages().len());
                added.push(user);
                added.extend_from_slice(failure.new_messages());
                if let Err(e) = self.store.append_all(session, &added).await {
                    warn!(session = %session, error = %e, "Failed to persist partial exchange");
                }
                Err(failure.error.into())
            }
        }
    }

    /// Stored history for `session`, oldest first.
    pub async fn history(&self, session: &ConversationId) -> Result<Vec<Message>> {
        Ok(self.store.read_all(session).await?)
    }

    pub async fn clear(&self, session: &ConversationId) -> Result<()> {
        let lock = self.lock_for(session)?;
        let result = {
            let _guard = lock.lock().await;
            self.store.clear(session).await
        };
        self.release(session, lock);
        result?;
        info!(advisor = %self.spec.name, session = %session, "Session cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use counsel_core::gateway::{CompletionRequest, CompletionResponse, Gateway};
    use counsel_core::{
        AdvisorParameters, ExchangeError, GatewayError, PrimerMessage, Role, ToolRegistry,
    };
    use counsel_memory::InMemoryStore;
    use counsel_prompt::{ResolverOptions, TagResolver};
    use std::time::Duration;

    fn clock() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 5, 12, 0, 0)
            .unwrap()
    }

    fn spec() -> AdvisorSpec {
        let mut spec = AdvisorSpec::new("Coach", "Today is <$datetime$>.\n<$conversation_history$>");
        spec.parameters = AdvisorParameters {
            stream: false,
            ..AdvisorParameters::default()
        };
        spec.primer = vec![PrimerMessage {
            role: Role::User,
            content: "Keep it short.".into(),
            metadata: Default::default(),
        }];
        spec
    }

    fn session_with(gateway: Arc<dyn Gateway>, store: Arc<dyn ConversationStore>) -> AdvisorSession {
        let dir = std::env::temp_dir();
        let loader = TemplateLoader::new(TagResolver::new(ResolverOptions::new(dir)));
        let orchestrator = Arc::new(Orchestrator::new(gateway, Arc::new(ToolRegistry::new())));
        AdvisorSession::new(spec(), loader, orchestrator, store).with_clock(clock())
    }

    #[tokio::test]
    async fn send_persists_user_and_reply() {
        let gateway = Arc::new(SequentialMockGateway::new(vec![
            text_response("First answer"),
            text_response("Second answer"),
        ]));
        let store = Arc::new(InMemoryStore::new());
        let session = session_with(gateway.clone(), store.clone());
        let id = ConversationId::from("s1");

        let first = session.send(&id, "Question one").await.unwrap();
        assert_eq!(first.reply.text(), "First answer");

        session.send(&id, "Question two").await.unwrap();
        let history = session.history(&id).await.unwrap();
        let texts: Vec<_> = history.iter().map(|m| m.text()).collect();
        assert_eq!(
            texts,
            vec!["Question one", "First answer", "Question two", "Second answer"]
        );

        // Second request: system, primer, two history messages, new user
        let second = &gateway.requests()[1];
        assert_eq!(second.messages.len(), 5);
        assert_eq!(second.messages[0].role, Role::System);
        assert!(second.messages[0].text().starts_with("Today is 2024-03-05."));
        assert!(second.messages[0].text().contains("user: Question one"));
        assert_eq!(second.messages[1].text(), "Keep it short.");
        assert_eq!(second.messages[4].text(), "Question two");
    }

    #[tokio::test]
    async fn failed_exchange_still_persists_partial_messages() {
        let gateway = Arc::new(SequentialMockGateway::with_results(vec![Err(
            GatewayError::AuthenticationFailed("bad key".into()),
        )]));
        let store = Arc::new(InMemoryStore::new());
        let session = session_with(gateway, store.clone());
        let id = ConversationId::from("s1");

        let err = session.send(&id, "Hello?").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Exchange(ExchangeError::Gateway(GatewayError::AuthenticationFailed(_)))
        ));
        let history = store.read_all(&id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text(), "Hello?");
    }

    #[tokio::test]
    async fn clear_empties_history() {
        let gateway = Arc::new(SequentialMockGateway::single_text("hi"));
        let session = session_with(gateway, Arc::new(InMemoryStore::new()));
        let id = ConversationId::from("s1");
        session.send(&id, "hello").await.unwrap();
        session.clear(&id).await.unwrap();
        assert!(session.history(&id).await.unwrap().is_empty());
    }

    /// Answers slowly and records the peak number of concurrent calls.
    struct SlowGateway {
        active: std::sync::atomic::AtomicUsize,
        peak: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl Gateway for SlowGateway {
        fn name(&self) -> &str {
            "slow"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> std::result::Result<CompletionResponse, GatewayError> {
            use std::sync::atomic::Ordering;
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(text_response("ok"))
        }
    }

    fn slow_gateway() -> Arc<SlowGateway> {
        Arc::new(SlowGateway {
            active: Default::default(),
            peak: Default::default(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn same_session_sends_are_serialized() {
        let gateway = slow_gateway();
        let session = Arc::new(session_with(gateway.clone(), Arc::new(InMemoryStore::new())));
        let id = ConversationId::from("shared");

        let (a, b) = tokio::join!(session.send(&id, "one"), session.send(&id, "two"));
        a.unwrap();
        b.unwrap();
        assert_eq!(gateway.peak.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(session.history(&id).await.unwrap().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn different_sessions_run_concurrently() {
        let gateway = slow_gateway();
        let session = session_with(gateway.clone(), Arc::new(InMemoryStore::new()));
        let first = ConversationId::from("a");
        let second = ConversationId::from("b");

        let (a, b) = tokio::join!(session.send(&first, "one"), session.send(&second, "two"));
        a.unwrap();
        b.unwrap();
        assert_eq!(gateway.peak.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn lock_table_is_pruned_when_idle() {
        let gateway = slow_gateway();
        let session = session_with(gateway, Arc::new(InMemoryStore::new()));
        let first = ConversationId::from("a");
        let second = ConversationId::from("b");

        let (a, b) = tokio::join!(session.send(&first, "one"), session.send(&first, "two"));
        a.unwrap();
        b.unwrap();
        session.send(&second, "three").await.unwrap();
        session.clear(&second).await.unwrap();

        assert!(session.locks.lock().unwrap().is_empty());
        assert_eq!(session.history(&first).await.unwrap().len(), 4);
    }
}
