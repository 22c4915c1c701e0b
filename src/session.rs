//! The active chat session: selected model, conversation, and credentials.
//!
//! One [`ChatSession`] is handed by `&mut` to whatever drives a turn. Because a
//! turn borrows the session for its whole duration, nothing else can mutate
//! the conversation while a reply is in flight.

use crate::client::ChatClient;
use crate::conversation::{Conversation, Role};
use crate::error::Result;
use crate::reconcile::StreamReconciler;
use crate::registry::{self, ModelDescriptor, ModelId, Routing};
use crate::request::{self, OutboundRequest};
use futures::StreamExt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Summary of a completed turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub routing: Routing,
    pub latency: Duration,
    /// Fragments received; always 0 for single-shot replies.
    pub fragments: usize,
    pub reply: String,
}

#[derive(Debug)]
pub struct ChatSession {
    model: &'static ModelDescriptor,
    conversation: Conversation,
    token: Option<String>,
}

impl ChatSession {
    pub fn new(model: ModelId) -> Self {
        Self {
            model: model.descriptor(),
            conversation: Conversation::new(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn model(&self) -> &'static ModelDescriptor {
        self.model
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    /// Switch models. History and persona eligibility belong to a model, so a
    /// different selection starts a fresh conversation.
    pub fn select_model(&mut self, model_id: &str) -> Result<&'static ModelDescriptor> {
        let next = registry::resolve(model_id)?;
        if next.id != self.model.id {
            info!(from = %self.model.id, to = %next.id, "model switched");
            self.model = next;
            self.conversation.reset();
        }
        Ok(self.model)
    }

    pub fn reset(&mut self) {
        self.conversation.reset();
    }

    /// Abandon whatever turn is in flight. Text merged so far is kept.
    pub fn cancel_turn(&mut self) {
        if !self.conversation.is_idle() {
            warn!(state = %self.conversation.state(), "turn cancelled");
            self.conversation.abort_turn();
        }
    }

    /// Run one user turn.
    ///
    /// `on_delta` sees each piece of reply text as it is merged: once for a
    /// single-shot reply, once per fragment when streaming. Blank input returns
    /// `Ok(None)`. A failed exchange leaves the user's message and any
    /// streamed text in place and returns the session to idle.
    pub async fn submit<F>(
        &mut self,
        client: &ChatClient,
        text: &str,
        mut on_delta: F,
    ) -> Result<Option<TurnOutcome>>
    where
        F: FnMut(&str),
    {
        let Some(outbound) = request::build_request(self.model, &mut self.conversation, text)?
        else {
            return Ok(None);
        };
        self.conversation.begin_turn()?;

        let started = Instant::now();
        let result = match outbound.routing {
            Routing::SingleShot => self.run_single_shot(client, &outbound, &mut on_delta).await,
            Routing::Streaming => self.run_stream(client, &outbound, &mut on_delta).await,
        };

        match result {
            Ok(fragments) => {
                let latency = started.elapsed();
                self.conversation.set_latency(latency);
                let reply = self
                    .conversation
                    .last()
                    .filter(|m| m.role == Role::Assistant)
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                debug!(
                    model = %self.model.id,
                    latency_ms = latency.as_millis() as u64,
                    fragments,
                    "turn complete"
                );
                Ok(Some(TurnOutcome {
                    routing: outbound.routing,
                    latency,
                    fragments,
                    reply,
                }))
            }
            Err(e) => {
                warn!(model = %self.model.id, "turn failed: {e}");
                self.conversation.abort_turn();
                Err(e)
            }
        }
    }

    async fn run_single_shot<F: FnMut(&str)>(
        &mut self,
        client: &ChatClient,
        outbound: &OutboundRequest,
        on_delta: &mut F,
    ) -> Result<usize> {
        let reply = client
            .send(outbound.endpoint, &outbound.payload, self.token.as_deref())
            .await?;
        on_delta(&reply);
        self.conversation.complete_assistant_turn(reply)?;
        Ok(0)
    }

    async fn run_stream<F: FnMut(&str)>(
        &mut self,
        client: &ChatClient,
        outbound: &OutboundRequest,
        on_delta: &mut F,
    ) -> Result<usize> {
        let mut fragments = client
            .stream(outbound.endpoint, &outbound.payload, self.token.as_deref())
            .await?;

        let mut reconciler = StreamReconciler::new(&mut self.conversation);
        while let Some(fragment) = fragments.next().await {
            let fragment = fragment?;
            let novel = reconciler.apply(&fragment)?;
            if !novel.is_empty() {
                on_delta(novel);
            }
        }
        reconciler.finish()
    }
}
