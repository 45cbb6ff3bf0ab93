//! Gateway session and plugin attachments
//!
//! A [`Session`] is one connection to the gateway and owns the plugin
//! attachments created through it. A [`PluginHandle`] is a bound channel to
//! one plugin: typed synchronous requests, fire-and-forget messages with an
//! optional negotiation payload, and a stream of asynchronous events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{Result, TransportError};
use crate::media::SessionDescription;

use super::transport::{
    HandleEvent, HandleId, Plugin, SessionEvent, SessionId, SignalingTransport,
};

/// One connection to the media gateway
pub struct Session<T: SignalingTransport> {
    transport: Arc<T>,
    id: SessionId,
    events: mpsc::Receiver<SessionEvent>,
    opaque_prefix: String,
    next_opaque: AtomicU64,
}

impl<T: SignalingTransport> Session<T> {
    /// Connect to the gateway and create a session
    pub async fn connect(transport: Arc<T>, opaque_prefix: impl Into<String>) -> Result<Self> {
        let (id, events) = transport.connect().await?;
        tracing::info!(session = %id, "Gateway session created");

        Ok(Self {
            transport,
            id,
            events,
            opaque_prefix: opaque_prefix.into(),
            next_opaque: AtomicU64::new(1),
        })
    }

    /// Session identifier
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Attach to a plugin
    pub async fn attach(&self, plugin: Plugin) -> Result<PluginHandle<T>> {
        let n = self.next_opaque.fetch_add(1, Ordering::Relaxed);
        let opaque_id = format!("{}-{}", self.opaque_prefix, n);

        let (handle_id, events) = self.transport.attach(self.id, plugin, &opaque_id).await?;
        tracing::info!(plugin = %plugin, handle = %handle_id, "Plugin attached");

        Ok(PluginHandle {
            transport: Arc::clone(&self.transport),
            session: self.id,
            id: handle_id,
            plugin,
            events,
        })
    }

    /// Wait for the next session-wide event
    ///
    /// Returns `None` once the transport drops the event stream.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Destroy the session and everything attached to it
    pub async fn destroy(self) -> Result<()> {
        tracing::info!(session = %self.id, "Destroying session");
        self.transport.destroy(self.id).await
    }
}

impl<T: SignalingTransport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish()
    }
}

/// A bound channel to one plugin
pub struct PluginHandle<T: SignalingTransport> {
    transport: Arc<T>,
    session: SessionId,
    id: HandleId,
    plugin: Plugin,
    events: mpsc::Receiver<HandleEvent>,
}

impl<T: SignalingTransport> PluginHandle<T> {
    /// Handle identifier
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// The plugin this handle is bound to
    pub fn plugin(&self) -> Plugin {
        self.plugin
    }

    /// Send a synchronous request and wait for the plugin's reply
    ///
    /// The reply may still describe a plugin-level error; callers that care
    /// run it through [`super::message::remote_error`].
    pub async fn request<R: Serialize>(&self, body: &R) -> Result<Value> {
        let body = encode(body)?;
        tracing::debug!(plugin = %self.plugin, handle = %self.id, request = %body, "Request");
        self.transport.request(self.session, self.id, body).await
    }

    /// Send an asynchronous message; results arrive as events
    pub async fn message<R: Serialize>(
        &self,
        body: &R,
        jsep: Option<SessionDescription>,
    ) -> Result<()> {
        let body = encode(body)?;
        tracing::debug!(plugin = %self.plugin, handle = %self.id, request = %body, "Message");
        self.transport
            .message(self.session, self.id, body, jsep)
            .await
    }

    /// Wait for the next event on this attachment
    ///
    /// Returns `None` once the transport drops the event stream.
    pub async fn recv(&mut self) -> Option<HandleEvent> {
        self.events.recv().await
    }

    /// Detach from the plugin, closing any media session it carries
    pub async fn detach(self) -> Result<()> {
        tracing::info!(plugin = %self.plugin, handle = %self.id, "Detaching");
        self.transport.detach(self.session, self.id).await
    }
}

impl<T: SignalingTransport> std::fmt::Debug for PluginHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHandle")
            .field("id", &self.id)
            .field("plugin", &self.plugin)
            .finish()
    }
}

fn encode<R: Serialize>(body: &R) -> Result<Value> {
    serde_json::to_value(body)
        .map_err(|e| TransportError::RequestFailed(format!("could not encode request: {}", e)).into())
}
