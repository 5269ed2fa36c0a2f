//! Token lifecycle and session-control engine for multi-tenant backends.
//!
//! [`flows::SessionBroker`] issues paired access/refresh tokens, keeps one active refresh token
//! per subject, and checks revocation entries before trusting claims. [`flows::OAuthLinker`]
//! resolves provider identities to local subjects exactly once under concurrent callbacks. Both
//! coordinate only through a shared [`store::SessionStore`].

#![deny(clippy::all)]
#![warn(missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod clock;
pub mod codec;
pub mod config;
pub mod directory;
pub mod error;
pub mod flows;
pub mod obs;
pub mod provider;
pub mod rate_limit;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and fixtures for tests; enabled via `cfg(test)` or the `test`
	//! crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		clock::{Clock, ManualClock},
		codec::ClaimsCodec,
		config::SessionConfig,
		flows::SessionBroker,
		store::{MemoryStore, SessionStore},
	};

	/// Signing secret shared by test fixtures (32 bytes, the minimum accepted length).
	pub const TEST_SECRET: &[u8] = b"session-broker-test-secret-0032b";

	/// Instant every [`ManualClock`] fixture starts at.
	pub fn test_epoch() -> OffsetDateTime {
		time::macros::datetime!(2025-11-10 12:00 UTC)
	}

	/// Builds a manual clock pinned to [`test_epoch`].
	pub fn test_clock() -> Arc<ManualClock> {
		Arc::new(ManualClock::new(test_epoch()))
	}

	/// Builds a codec that signs with [`TEST_SECRET`] and reads time from `clock`.
	pub fn test_codec(clock: Arc<dyn Clock>) -> ClaimsCodec {
		ClaimsCodec::new(TEST_SECRET)
			.expect("Test signing secret should satisfy the minimum length.")
			.with_clock(clock)
	}

	/// Constructs a [`SessionBroker`] backed by an in-memory store and a manual clock.
	pub fn build_test_broker() -> (SessionBroker, Arc<MemoryStore>, Arc<ManualClock>) {
		let clock = test_clock();
		let store_backend = Arc::new(MemoryStore::with_clock(clock.clone()));
		let store: Arc<dyn SessionStore> = store_backend.clone();
		let broker = SessionBroker::new(store, test_codec(clock.clone()), SessionConfig::default())
			.with_clock(clock.clone());

		(broker, store_backend, clock)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeSet, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::Hash,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {httpmock as _, temp_env as _};
