//! Builder pattern for session configuration.
//!
//! Provides a fluent API for configuring and creating [`Session`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use bidi_session::{ChannelOptions, Session};
//!
//! # fn example() -> bidi_session::Result<()> {
//! let session = Session::builder()
//!     .endpoint("ws://127.0.0.1:9222/session")
//!     .options(ChannelOptions::new().with_connect_timeout(Duration::from_secs(5)))
//!     .command_timeout(Duration::from_secs(30))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::{ChannelOptions, DEFAULT_COMMAND_TIMEOUT, Resolver, SystemResolver};

use super::core::{Endpoint, Session};

// ============================================================================
// Constants
// ============================================================================

/// Default number of buffered observer notifications per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

// ============================================================================
// SessionBuilder
// ============================================================================

/// Builder for configuring a [`Session`] instance.
///
/// Use [`Session::builder()`] to create a new builder.
#[derive(Clone)]
pub struct SessionBuilder {
    /// Endpoint URL.
    endpoint: Option<String>,
    /// Options passed to the channel layer.
    options: ChannelOptions,
    /// Deadline for each command's response.
    command_timeout: Duration,
    /// Connect without opening a channel.
    test_mode: bool,
    /// Host name resolver for candidate expansion.
    resolver: Option<Arc<dyn Resolver>>,
    /// Broadcast buffer size for observers.
    event_capacity: usize,
}

impl fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("endpoint", &self.endpoint)
            .field("options", &self.options)
            .field("command_timeout", &self.command_timeout)
            .field("test_mode", &self.test_mode)
            .field("custom_resolver", &self.resolver.is_some())
            .field("event_capacity", &self.event_capacity)
            .finish()
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self {
            endpoint: None,
            options: ChannelOptions::default(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            test_mode: false,
            resolver: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

// ============================================================================
// SessionBuilder Implementation
// ============================================================================

impl SessionBuilder {
    /// Creates a new session builder with no endpoint.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the endpoint URL (`ws://` or `wss://`).
    #[inline]
    #[must_use]
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    /// Sets the channel options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ChannelOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the response deadline applied by [`Session::send`].
    #[inline]
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Makes `connect()` succeed immediately without opening a channel.
    ///
    /// For exercising higher layers without a remote end.
    #[inline]
    #[must_use]
    pub fn test_mode(mut self, enabled: bool) -> Self {
        self.test_mode = enabled;
        self
    }

    /// Sets the resolver used to expand the endpoint host.
    #[inline]
    #[must_use]
    pub fn resolver(mut self, resolver: impl Resolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Sets how many notifications each subscriber may lag behind.
    #[inline]
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Builds the session with validation. Does not connect.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the endpoint is missing or not a `ws`/`wss` URL
    /// - [`Error::Config`] if the command timeout or event capacity is zero
    pub fn build(self) -> Result<Session> {
        let endpoint = self.validate_endpoint()?;

        if self.command_timeout.is_zero() {
            return Err(Error::config("Command timeout must be greater than zero"));
        }
        if self.event_capacity == 0 {
            return Err(Error::config("Event capacity must be greater than zero"));
        }

        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(SystemResolver));

        Ok(Session::new(
            endpoint,
            resolver,
            self.command_timeout,
            self.test_mode,
            self.event_capacity,
        ))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl SessionBuilder {
    /// Validates the endpoint configuration.
    fn validate_endpoint(&self) -> Result<Endpoint> {
        let url = self.endpoint.as_deref().ok_or_else(|| {
            Error::config(
                "Endpoint URL is required. Use .endpoint() to set it.\n\
                 Example: Session::builder().endpoint(\"ws://127.0.0.1:9222/session\")",
            )
        })?;

        Endpoint::new(url, self.options.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================
