//! Service and account handles
//!
//! Plain owning values over the storage adapter. A [`Service`] resolves
//! external account ids to [`Account`] handles; accounts hand out
//! [`Catalog`] handles. There is no runtime dispatch above the storage seam.

use std::sync::Arc;

use crate::catalog::Catalog;
use crate::error::Result;
use crate::store::Store;

/// Entry point into the engine, shared across requests.
#[derive(Clone)]
pub struct Service {
    store: Arc<dyn Store>,
}

impl Service {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Service { store }
    }

    /// Resolve an external account id, creating the account on first use.
    pub async fn account(&self, external_id: &str) -> Result<Account> {
        let id = self.store.get_account(external_id).await?;
        Ok(Account {
            store: self.store.clone(),
            id,
        })
    }
}

/// One tenant of the service.
#[derive(Clone)]
pub struct Account {
    store: Arc<dyn Store>,
    id: i64,
}

impl Account {
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Handle to a catalog of this account; the catalog itself may not exist
    /// yet (it is created lazily on first write).
    pub fn catalog(&self, name: &str) -> Catalog {
        Catalog::new(self.store.clone(), self.id, name.to_string())
    }

    /// Names of this account's catalogs.
    pub async fn list_catalogs(&self) -> Result<Vec<String>> {
        self.store.list_catalogs(self.id).await
    }
}
