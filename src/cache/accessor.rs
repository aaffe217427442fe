//! Concurrent in-memory storage for cached records.

// self
use crate::{
	_prelude::*,
	cache::{AccessTokenItem, AccountItem, CacheKey, IdTokenItem, KeyError, RefreshTokenItem},
	error::CacheError,
};

/// Serialized form of the whole cache.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot {
	/// Access tokens by key.
	#[serde(rename = "AccessToken", default)]
	pub access_tokens: BTreeMap<CacheKey, AccessTokenItem>,
	/// Refresh tokens by key.
	#[serde(rename = "RefreshToken", default)]
	pub refresh_tokens: BTreeMap<CacheKey, RefreshTokenItem>,
	/// ID tokens by key.
	#[serde(rename = "IdToken", default)]
	pub id_tokens: BTreeMap<CacheKey, IdTokenItem>,
	/// Accounts by key.
	#[serde(rename = "Account", default)]
	pub accounts: BTreeMap<CacheKey, AccountItem>,
}
impl CacheSnapshot {
	/// Encodes the snapshot as JSON.
	pub fn to_bytes(&self) -> Result<Vec<u8>, CacheError> {
		serde_json::to_vec(self).map_err(CacheError::Encode)
	}

	/// Decodes a snapshot, reporting the JSON path of any mismatch.
	pub fn from_bytes(bytes: &[u8]) -> Result<Self, CacheError> {
		let de = &mut serde_json::Deserializer::from_slice(bytes);

		serde_path_to_error::deserialize(de).map_err(|source| CacheError::Serialization { source })
	}
}

/// Record counts, for diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheCounts {
	/// Access tokens.
	pub access_tokens: usize,
	/// Refresh tokens.
	pub refresh_tokens: usize,
	/// ID tokens.
	pub id_tokens: usize,
	/// Accounts.
	pub accounts: usize,
}

/// Keyed storage for every credential kind; each operation is individually atomic.
#[derive(Debug, Default)]
pub struct TokenCacheAccessor {
	access_tokens: RwLock<HashMap<CacheKey, AccessTokenItem>>,
	refresh_tokens: RwLock<HashMap<CacheKey, RefreshTokenItem>>,
	id_tokens: RwLock<HashMap<CacheKey, IdTokenItem>>,
	accounts: RwLock<HashMap<CacheKey, AccountItem>>,
}
impl TokenCacheAccessor {
	/// Upserts an access token.
	pub fn save_access_token(&self, item: AccessTokenItem) -> Result<CacheKey, KeyError> {
		upsert(&self.access_tokens, item.key()?, item)
	}

	/// Upserts a refresh token.
	pub fn save_refresh_token(&self, item: RefreshTokenItem) -> Result<CacheKey, KeyError> {
		upsert(&self.refresh_tokens, item.key()?, item)
	}

	/// Upserts an ID token.
	pub fn save_id_token(&self, item: IdTokenItem) -> Result<CacheKey, KeyError> {
		upsert(&self.id_tokens, item.key()?, item)
	}

	/// Upserts an account.
	pub fn save_account(&self, item: AccountItem) -> Result<CacheKey, KeyError> {
		upsert(&self.accounts, item.key()?, item)
	}

	/// Access token stored under `key`.
	pub fn get_access_token(&self, key: &CacheKey) -> Option<AccessTokenItem> {
		self.access_tokens.read().get(key).cloned()
	}

	/// Refresh token stored under `key`.
	pub fn get_refresh_token(&self, key: &CacheKey) -> Option<RefreshTokenItem> {
		self.refresh_tokens.read().get(key).cloned()
	}

	/// ID token stored under `key`.
	pub fn get_id_token(&self, key: &CacheKey) -> Option<IdTokenItem> {
		self.id_tokens.read().get(key).cloned()
	}

	/// Account stored under `key`.
	pub fn get_account(&self, key: &CacheKey) -> Option<AccountItem> {
		self.accounts.read().get(key).cloned()
	}

	/// Removes an access token; returns whether one was present.
	pub fn delete_access_token(&self, key: &CacheKey) -> bool {
		self.access_tokens.write().remove(key).is_some()
	}

	/// Removes a refresh token; returns whether one was present.
	pub fn delete_refresh_token(&self, key: &CacheKey) -> bool {
		self.refresh_tokens.write().remove(key).is_some()
	}

	/// Removes an ID token; returns whether one was present.
	pub fn delete_id_token(&self, key: &CacheKey) -> bool {
		self.id_tokens.write().remove(key).is_some()
	}

	/// Removes an account; returns whether one was present.
	pub fn delete_account(&self, key: &CacheKey) -> bool {
		self.accounts.write().remove(key).is_some()
	}

	/// Snapshot of every access token.
	pub fn access_tokens(&self) -> Vec<AccessTokenItem> {
		self.access_tokens.read().values().cloned().collect()
	}

	/// Snapshot of every refresh token.
	pub fn refresh_tokens(&self) -> Vec<RefreshTokenItem> {
		self.refresh_tokens.read().values().cloned().collect()
	}

	/// Snapshot of every ID token.
	pub fn id_tokens(&self) -> Vec<IdTokenItem> {
		self.id_tokens.read().values().cloned().collect()
	}

	/// Snapshot of every account.
	pub fn accounts(&self) -> Vec<AccountItem> {
		self.accounts.read().values().cloned().collect()
	}

	/// Removes every access token matching `predicate`; returns how many were removed.
	pub fn delete_access_tokens_where(
		&self,
		predicate: impl Fn(&AccessTokenItem) -> bool,
	) -> usize {
		retain_not(&self.access_tokens, predicate)
	}

	/// Removes every refresh token matching `predicate`.
	pub fn delete_refresh_tokens_where(
		&self,
		predicate: impl Fn(&RefreshTokenItem) -> bool,
	) -> usize {
		retain_not(&self.refresh_tokens, predicate)
	}

	/// Removes every ID token matching `predicate`.
	pub fn delete_id_tokens_where(&self, predicate: impl Fn(&IdTokenItem) -> bool) -> usize {
		retain_not(&self.id_tokens, predicate)
	}

	/// Removes every account matching `predicate`.
	pub fn delete_accounts_where(&self, predicate: impl Fn(&AccountItem) -> bool) -> usize {
		retain_not(&self.accounts, predicate)
	}

	/// Removes every record.
	pub fn clear(&self) {
		self.access_tokens.write().clear();
		self.refresh_tokens.write().clear();
		self.id_tokens.write().clear();
		self.accounts.write().clear();
	}

	/// Record counts per kind.
	pub fn counts(&self) -> CacheCounts {
		CacheCounts {
			access_tokens: self.access_tokens.read().len(),
			refresh_tokens: self.refresh_tokens.read().len(),
			id_tokens: self.id_tokens.read().len(),
			accounts: self.accounts.read().len(),
		}
	}

	/// Copies the whole state into a serializable snapshot.
	pub fn snapshot(&self) -> CacheSnapshot {
		CacheSnapshot {
			access_tokens: clone_sorted(&self.access_tokens),
			refresh_tokens: clone_sorted(&self.refresh_tokens),
			id_tokens: clone_sorted(&self.id_tokens),
			accounts: clone_sorted(&self.accounts),
		}
	}

	/// Replaces the whole state with `snapshot`.
	pub fn restore(&self, snapshot: CacheSnapshot) {
		*self.access_tokens.write() = snapshot.access_tokens.into_iter().collect();
		*self.refresh_tokens.write() = snapshot.refresh_tokens.into_iter().collect();
		*self.id_tokens.write() = snapshot.id_tokens.into_iter().collect();
		*self.accounts.write() = snapshot.accounts.into_iter().collect();
	}
}

/// Read-only view over a [`TokenCacheAccessor`].
///
/// Handed out by [`TokenCache::records`](crate::cache::TokenCache::records); every mutation goes
/// through the owning cache so it is serialized and flushed.
#[derive(Clone, Copy, Debug)]
pub struct CacheView<'a>(&'a TokenCacheAccessor);
impl<'a> CacheView<'a> {
	/// Wraps `accessor`.
	pub fn new(accessor: &'a TokenCacheAccessor) -> Self {
		Self(accessor)
	}

	/// Access token by key.
	pub fn get_access_token(&self, key: &CacheKey) -> Option<AccessTokenItem> {
		self.0.get_access_token(key)
	}

	/// Refresh token by key.
	pub fn get_refresh_token(&self, key: &CacheKey) -> Option<RefreshTokenItem> {
		self.0.get_refresh_token(key)
	}

	/// ID token by key.
	pub fn get_id_token(&self, key: &CacheKey) -> Option<IdTokenItem> {
		self.0.get_id_token(key)
	}

	/// Account by key.
	pub fn get_account(&self, key: &CacheKey) -> Option<AccountItem> {
		self.0.get_account(key)
	}

	/// Snapshot of every access token.
	pub fn access_tokens(&self) -> Vec<AccessTokenItem> {
		self.0.access_tokens()
	}

	/// Snapshot of every refresh token.
	pub fn refresh_tokens(&self) -> Vec<RefreshTokenItem> {
		self.0.refresh_tokens()
	}

	/// Snapshot of every ID token.
	pub fn id_tokens(&self) -> Vec<IdTokenItem> {
		self.0.id_tokens()
	}

	/// Snapshot of every account.
	pub fn accounts(&self) -> Vec<AccountItem> {
		self.0.accounts()
	}

	/// Record counts per kind.
	pub fn counts(&self) -> CacheCounts {
		self.0.counts()
	}

	/// Serializable copy of the whole state.
	pub fn snapshot(&self) -> CacheSnapshot {
		self.0.snapshot()
	}
}

fn upsert<T>(
	map: &RwLock<HashMap<CacheKey, T>>,
	key: CacheKey,
	item: T,
) -> Result<CacheKey, KeyError> {
	map.write().insert(key.clone(), item);

	Ok(key)
}

fn retain_not<T>(map: &RwLock<HashMap<CacheKey, T>>, predicate: impl Fn(&T) -> bool) -> usize {
	let mut guard = map.write();
	let before = guard.len();

	guard.retain(|_, item| !predicate(item));

	before - guard.len()
}

fn clone_sorted<T>(map: &RwLock<HashMap<CacheKey, T>>) -> BTreeMap<CacheKey, T>
where
	T: Clone,
{
	map.read().iter().map(|(key, item)| (key.clone(), item.clone())).collect()
}
