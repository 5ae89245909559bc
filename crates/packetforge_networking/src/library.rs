//! # Network Library Handle
//!
//! Process-level handle to the socket layer. Every host takes a lease on
//! it, and the library can only be released once the last lease is gone.
//! A library that failed to initialize is represented by
//! [`NetworkLibrary::disabled`]; transports created from it run in
//! disabled mode.

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{TransportError, TransportResult};

#[derive(Debug, Default)]
struct LibraryInner {
    leases: AtomicUsize,
    released: AtomicBool,
}

/// Shared handle to the network library.
#[derive(Clone, Debug)]
pub struct NetworkLibrary {
    inner: Option<Arc<LibraryInner>>,
}

impl NetworkLibrary {
    /// Initializes the library by probing that a local socket can be bound.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::LibraryUnavailable`] when the socket layer
    /// cannot be used.
    pub fn initialize() -> TransportResult<Self> {
        let probe = UdpSocket::bind("127.0.0.1:0")
            .map_err(|err| TransportError::LibraryUnavailable(err.to_string()))?;
        drop(probe);
        tracing::debug!("network library initialized");
        Ok(Self {
            inner: Some(Arc::new(LibraryInner::default())),
        })
    }

    /// Initializes the library, falling back to a disabled handle.
    #[must_use]
    pub fn initialize_or_disabled() -> Self {
        Self::initialize().unwrap_or_else(|err| {
            tracing::error!(error = %err, "networking disabled");
            Self::disabled()
        })
    }

    /// A handle to a library that could not be loaded.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { inner: None }
    }

    /// Returns true while the library can host connections.
    #[inline]
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|inner| !inner.released.load(Ordering::Acquire))
    }

    /// Takes a lease for one host.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Disabled`] when the library is unavailable
    /// or already released.
    pub fn lease(&self) -> TransportResult<LibraryLease> {
        let inner = self.inner.as_ref().ok_or(TransportError::Disabled)?;
        if inner.released.load(Ordering::Acquire) {
            return Err(TransportError::Disabled);
        }
        inner.leases.fetch_add(1, Ordering::AcqRel);
        Ok(LibraryLease {
            inner: Arc::clone(inner),
        })
    }

    /// Number of live leases.
    #[must_use]
    pub fn active_leases(&self) -> usize {
        self.inner
            .as_ref()
            .map_or(0, |inner| inner.leases.load(Ordering::Acquire))
    }

    /// Releases the library. Releasing twice, or releasing a disabled
    /// library, is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::LibraryBusy`] while any lease is alive.
    pub fn release(&self) -> TransportResult<()> {
        let Some(inner) = self.inner.as_ref() else {
            return Ok(());
        };
        let leases = inner.leases.load(Ordering::Acquire);
        if leases > 0 {
            return Err(TransportError::LibraryBusy(leases));
        }
        if !inner.released.swap(true, Ordering::AcqRel) {
            tracing::info!("network library released");
        }
        Ok(())
    }
}

/// A host's hold on the library; dropping it returns the lease.
#[derive(Debug)]
pub struct LibraryLease {
    inner: Arc<LibraryInner>,
}

impl Drop for LibraryLease {
    fn drop(&mut self) {
        self.inner.leases.fetch_sub(1, Ordering::AcqRel);
    }
}
