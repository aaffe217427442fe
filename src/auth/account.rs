//! Public account handle returned by acquisitions and account enumeration.

// self
use crate::_prelude::*;

/// Signed-in account, identified by home account id + environment.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
	/// `uid.utid` home account identifier.
	pub home_account_id: String,
	/// Authority host that issued the account's tokens.
	pub environment: String,
	/// Tenant the account last authenticated against.
	pub tenant_id: String,
	/// Username (`preferred_username` or `upn`), when known.
	pub username: Option<String>,
	/// Display name, when known.
	pub name: Option<String>,
}
impl Account {
	/// Returns true when both handles refer to the same account identity.
	pub fn same_identity(&self, other: &Self) -> bool {
		self.home_account_id == other.home_account_id && self.environment == other.environment
	}

	/// Home tenant encoded in the `uid.utid` identifier, if present.
	pub fn home_tenant_id(&self) -> Option<&str> {
		self.home_account_id.split_once('.').map(|(_, utid)| utid).filter(|utid| !utid.is_empty())
	}
}
