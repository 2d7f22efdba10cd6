//! Command routing and change projection.
//!
//! [`BroadcastRouter`] is a relay with validation: it turns UI commands into
//! store mutations and subscription changes, and turns store deliveries into
//! UI events. It persists nothing itself. Every failure is contained to the
//! command or delivery that caused it and reported to the diagnostic sink.

use crate::auth::{AuthCompletion, AuthFailure, AuthOutcome, AuthProvider};
use crate::config::SyncConfig;
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, Severity};
use crate::error::{ErrorKind, Result, SyncError};
use crate::protocol::{Command, Event};
use crate::session::SessionContext;
use crate::store::{
    ChangePayload, ChangeSender, ChannelStore, QueryFilter, StoreChange, WatchId,
};
use crate::subscriptions::{SubscriptionKey, SubscriptionManager, SubscriptionTarget};
use crate::types::{
    Channel, ChannelDefaults, ChannelDraft, Document, DocumentKey, Identity, Track, NAME_FIELD,
    URI_FIELD,
};
use crossbeam_channel::Sender;
use std::sync::Arc;

/// Routes commands in and events out for one client.
pub struct BroadcastRouter {
    store: Arc<dyn ChannelStore>,
    auth: Arc<dyn AuthProvider>,
    diagnostics: Arc<dyn DiagnosticSink>,
    config: SyncConfig,
    track_key: DocumentKey,
    defaults: ChannelDefaults,
    subscriptions: SubscriptionManager,
    /// Where store watches deliver.
    changes: ChangeSender,
    /// Where sign-in outcomes are delivered.
    auth_replies: Sender<AuthOutcome>,
    /// Number of the latest sign-in attempt; older outcomes are ignored.
    sign_in_attempt: u64,
}

impl BroadcastRouter {
    pub fn new(
        store: Arc<dyn ChannelStore>,
        auth: Arc<dyn AuthProvider>,
        diagnostics: Arc<dyn DiagnosticSink>,
        config: SyncConfig,
        changes: ChangeSender,
        auth_replies: Sender<AuthOutcome>,
    ) -> Result<Self> {
        config.validate()?;
        let track_key = config.track_key()?;
        let defaults = config.channel_defaults();
        Ok(Self {
            store,
            auth,
            diagnostics,
            config,
            track_key,
            defaults,
            subscriptions: SubscriptionManager::new(),
            changes,
            auth_replies,
            sign_in_attempt: 0,
        })
    }

    /// Install start-up subscriptions.
    pub fn start(&mut self) {
        if !self.config.follow_track_on_start {
            return;
        }
        let target = SubscriptionTarget::TrackDocument(self.track_key.clone());
        if let Err(e) = self.install(SubscriptionKey::NowPlaying, target) {
            self.report("following shared track", &e);
        }
    }

    /// Re-establish every slot whose watch the store has dropped.
    ///
    /// The new watch starts from a fresh snapshot. Changes made while the
    /// slot was unserved are not replayed, so each loss is reported.
    /// Returns the number of slots found lost.
    pub fn restore_lost_subscriptions(&mut self) -> usize {
        let lost = self.subscriptions.lost(self.store.as_ref());
        for (key, target) in &lost {
            self.diagnostics.record(Diagnostic::new(
                Severity::Warn,
                DiagnosticKind::SubscriptionLost,
                format!("{key} watch was dropped by the store, resubscribing"),
            ));
            let last = self.subscriptions.last_event(*key).cloned();
            match self.install(*key, target.clone()) {
                Ok(_) => {
                    // Keep repeat suppression across the new watch.
                    if let Some(event) = last {
                        self.subscriptions.remember(*key, &event);
                    }
                }
                Err(e) => self.report(&format!("restoring {key} subscription"), &e),
            }
        }
        lost.len()
    }

    /// Tear down every subscription.
    pub fn shutdown(&mut self) {
        self.subscriptions.clear_all(self.store.as_ref());
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // --- Inbound ---

    /// Apply one UI command. Commands emit no events directly; their effects
    /// come back through store deliveries.
    pub fn handle_command(&mut self, session: &mut SessionContext, command: Command) {
        let tag = command.tag().to_string();
        tracing::debug!(%tag, "handling command");

        let result = match command {
            Command::LogError(message) => {
                self.diagnostics.record(Diagnostic::new(
                    Severity::Error,
                    DiagnosticKind::UiReported,
                    message,
                ));
                Ok(())
            }
            Command::SignInToFirebase => {
                self.begin_sign_in();
                Ok(())
            }
            Command::Broadcast(uri) => self.broadcast(uri),
            Command::GetChannels => self.watch_channel_list(),
            Command::CreateOrUpdateChannel(draft) => self.write_own_channel(session, draft),
            Command::ChangeChannel(channel) => self.change_channel(session, &channel),
            Command::GetUserChannel(channel) => self.watch_user_channel(&channel),
            Command::Unknown(tag) => Err(SyncError::MalformedCommand(format!(
                "unknown command tag {tag:?}"
            ))),
        };

        if let Err(e) = result {
            self.report(&tag, &e);
        }
    }

    /// Apply the outcome of a sign-in exchange.
    pub fn handle_auth(&mut self, session: &mut SessionContext, outcome: AuthOutcome) {
        if outcome.attempt != self.sign_in_attempt {
            tracing::debug!(
                attempt = outcome.attempt,
                latest = self.sign_in_attempt,
                "ignoring superseded sign-in outcome"
            );
            return;
        }

        match outcome.result {
            Ok(identity) => {
                tracing::info!(user = %identity.user_id, "signed in");
                session.set_identity(identity.clone());
                if let Err(e) = self.watch_own_channel(&identity) {
                    self.report("watching own channel", &e);
                }
            }
            Err(AuthFailure::Cancelled) => self.report("sign-in", &SyncError::AuthCancelled),
            Err(AuthFailure::Provider(message)) => self.diagnostics.record(Diagnostic::new(
                Severity::Error,
                DiagnosticKind::AuthFailed,
                format!("sign-in: {message}"),
            )),
        }
    }

    fn begin_sign_in(&mut self) {
        self.sign_in_attempt += 1;
        tracing::debug!(attempt = self.sign_in_attempt, "starting sign-in");
        self.auth.begin(AuthCompletion::new(
            self.sign_in_attempt,
            self.auth_replies.clone(),
        ));
    }

    fn broadcast(&mut self, uri: String) -> Result<()> {
        let partial = Document::new().with(URI_FIELD, uri);
        match self.store.update(&self.track_key, partial.clone()) {
            // First broadcast ever: nothing to merge into yet.
            Err(SyncError::NotFound(_)) => self.store.set(&self.track_key, partial),
            other => other,
        }
    }

    fn watch_channel_list(&mut self) -> Result<()> {
        let filter = QueryFilter::collection(self.config.channels_collection.clone())
            .order_by(NAME_FIELD);
        self.install(
            SubscriptionKey::ChannelList,
            SubscriptionTarget::ChannelList(filter),
        )?;
        Ok(())
    }

    fn write_own_channel(&mut self, session: &SessionContext, draft: ChannelDraft) -> Result<()> {
        let identity = session.identity().cloned().ok_or(SyncError::NotSignedIn)?;

        if let Some(claimed) = draft.owner_id.as_deref() {
            if claimed != identity.user_id {
                self.diagnostics.record(Diagnostic::new(
                    Severity::Warn,
                    DiagnosticKind::OwnerMismatch,
                    format!(
                        "CreateOrUpdateChannel: ownerId {claimed:?} ignored, writing as {:?}",
                        identity.user_id
                    ),
                ));
            }
        }

        let channel = draft.into_channel(&identity);
        let key = self.config.channel_key(&identity.user_id);
        self.store.set(&key, channel.to_document())
    }

    fn change_channel(&mut self, session: &mut SessionContext, channel: &str) -> Result<()> {
        let target = self.channel_target(channel)?;
        self.install(SubscriptionKey::NowPlaying, target)?;
        session.select_channel(channel);
        Ok(())
    }

    fn watch_user_channel(&mut self, channel: &str) -> Result<()> {
        let target = self.channel_target(channel)?;
        self.install(SubscriptionKey::ViewedChannel, target)?;
        Ok(())
    }

    fn watch_own_channel(&mut self, identity: &Identity) -> Result<()> {
        let target = self.channel_target(&identity.user_id)?;
        self.install(SubscriptionKey::OwnChannel, target)?;
        Ok(())
    }

    fn channel_target(&self, owner_id: &str) -> Result<SubscriptionTarget> {
        if owner_id.is_empty() || owner_id.contains('/') {
            return Err(SyncError::MalformedCommand(format!(
                "invalid channel key {owner_id:?}"
            )));
        }
        Ok(SubscriptionTarget::Channel {
            owner_id: owner_id.to_string(),
            key: self.config.channel_key(owner_id),
        })
    }

    fn install(&mut self, key: SubscriptionKey, target: SubscriptionTarget) -> Result<WatchId> {
        let store = Arc::clone(&self.store);
        let sink = self.changes.clone();
        let watch_target = target.clone();

        self.subscriptions
            .replace(self.store.as_ref(), key, target, move || match &watch_target {
                SubscriptionTarget::TrackDocument(doc) => store.subscribe(doc, sink),
                SubscriptionTarget::Channel { key: doc, .. } => store.subscribe(doc, sink),
                SubscriptionTarget::ChannelList(filter) => store.subscribe_query(filter, sink),
            })
    }

    // --- Outbound ---

    /// Project a store delivery into a UI event.
    ///
    /// Deliveries from replaced watches are dropped. The followed track only
    /// emits when its uri actually changes, which keeps echoed writes from
    /// producing duplicates.
    pub fn handle_change(&mut self, change: StoreChange) -> Option<Event> {
        let Some((key, target)) = self.subscriptions.resolve(change.watch) else {
            tracing::trace!(watch = ?change.watch, "dropping delivery from stale watch");
            return None;
        };
        let target = target.clone();

        let event = match change.payload {
            ChangePayload::Failed { kind, message } => {
                let err = match kind {
                    ErrorKind::Permission => SyncError::Permission(message),
                    _ => SyncError::Transport(message),
                };
                self.report(&format!("{key} subscription"), &err);
                return None;
            }
            ChangePayload::Document { key: doc_key, document } => {
                self.project_document(key, &target, &doc_key, document.as_ref())?
            }
            ChangePayload::Collection { documents, .. } => {
                if key != SubscriptionKey::ChannelList {
                    tracing::warn!(slot = %key, "unexpected collection delivery");
                    return None;
                }
                let channels = documents
                    .iter()
                    .map(|(doc_key, doc)| {
                        Channel::project(&doc_key.id, Some(doc), &self.defaults).summary()
                    })
                    .collect();
                Event::AllChannels(channels)
            }
        };

        let fresh = self.subscriptions.remember(key, &event);
        if key == SubscriptionKey::NowPlaying && !fresh {
            return None;
        }
        Some(event)
    }

    fn project_document(
        &self,
        key: SubscriptionKey,
        target: &SubscriptionTarget,
        doc_key: &DocumentKey,
        document: Option<&Document>,
    ) -> Option<Event> {
        match (key, target) {
            (SubscriptionKey::NowPlaying, SubscriptionTarget::TrackDocument(_)) => {
                let track = document.and_then(Track::from_document)?;
                Some(Event::NewTrack(track.uri))
            }
            (SubscriptionKey::NowPlaying, SubscriptionTarget::Channel { owner_id, .. }) => {
                let Some(doc) = document else {
                    self.missing(doc_key);
                    return None;
                };
                let channel = Channel::project(owner_id, Some(doc), &self.defaults);
                Some(Event::NewTrack(channel.now_playing_uri))
            }
            (SubscriptionKey::OwnChannel, SubscriptionTarget::Channel { owner_id, .. }) => {
                let channel = Channel::project(owner_id, document, &self.defaults);
                Some(Event::NewUser(channel.summary()))
            }
            (SubscriptionKey::ViewedChannel, SubscriptionTarget::Channel { owner_id, .. }) => {
                let Some(doc) = document else {
                    self.missing(doc_key);
                    return None;
                };
                let channel = Channel::project(owner_id, Some(doc), &self.defaults);
                Some(Event::UpdateUserChannel(channel.summary()))
            }
            _ => {
                tracing::warn!(slot = %key, ?target, "delivery does not match subscription");
                None
            }
        }
    }

    fn missing(&self, key: &DocumentKey) {
        self.diagnostics.record(Diagnostic::new(
            Severity::Info,
            DiagnosticKind::MissingDocument,
            format!("{key} does not exist"),
        ));
    }

    fn report(&self, context: &str, err: &SyncError) {
        self.diagnostics.record(Diagnostic::from_error(context, err));
    }
}
