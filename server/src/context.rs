//! Shared server state handed to every connection task.

use crate::accounts::AccountStore;
use crate::connections::ConnectionRegistry;
use crate::game::enhanced::{EnhancedMatches, EnhancedSettings};
use crate::game::simple::SimpleMatches;
use crate::rooms::RoomRegistry;
use crate::specs::SpecStore;
use std::sync::Arc;

/// Every registry, each behind its own lock.
pub struct ServerContext {
    pub specs: Arc<SpecStore>,
    pub accounts: Arc<AccountStore>,
    pub connections: Arc<ConnectionRegistry>,
    pub rooms: Arc<RoomRegistry>,
    pub simple: SimpleMatches,
    pub enhanced: Arc<EnhancedMatches>,
}

impl ServerContext {
    pub fn new(specs: SpecStore, accounts: AccountStore, settings: EnhancedSettings) -> Arc<Self> {
        let specs = Arc::new(specs);
        let accounts = Arc::new(accounts);
        let connections = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomRegistry::new());

        let simple = SimpleMatches::new(
            Arc::clone(&specs),
            Arc::clone(&rooms),
            Arc::clone(&connections),
        );
        let enhanced = Arc::new(EnhancedMatches::new(
            Arc::clone(&specs),
            Arc::clone(&rooms),
            Arc::clone(&connections),
            Arc::clone(&accounts),
            settings,
        ));

        Arc::new(Self {
            specs,
            accounts,
            connections,
            rooms,
            simple,
            enhanced,
        })
    }
}
