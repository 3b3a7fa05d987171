//! Thread-safe in-memory [`TokenStore`] for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::TokenRecord,
	store::{StoreFuture, TokenStore},
};

/// Keeps the record in-process; clones share the same slot.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<Mutex<Option<TokenRecord>>>);
impl MemoryStore {
	/// Creates a store pre-seeded with `record`.
	pub fn with_record(record: TokenRecord) -> Self {
		Self(Arc::new(Mutex::new(Some(record))))
	}

	/// Returns the stored record without going through the async contract.
	pub fn snapshot(&self) -> Option<TokenRecord> {
		self.0.lock().clone()
	}
}
impl TokenStore for MemoryStore {
	fn load(&self) -> StoreFuture<'_, Option<TokenRecord>> {
		let slot = self.0.clone();

		Box::pin(async move { Ok(slot.lock().clone()) })
	}

	fn save(&self, record: TokenRecord) -> StoreFuture<'_, ()> {
		let slot = self.0.clone();

		Box::pin(async move {
			*slot.lock() = Some(record);

			Ok(())
		})
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		let slot = self.0.clone();

		Box::pin(async move {
			slot.lock().take();

			Ok(())
		})
	}
}
