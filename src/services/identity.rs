//! Who is asking for a cart.

use async_trait::async_trait;

use crate::domain::value_objects::{AccountId, SessionToken};
use crate::store::StoreError;

/// Per-requester state the cart resolution reads and writes.
///
/// The session token lives in the requester's own state (a cookie-backed
/// session over HTTP), so every concurrent request of one browser sees the
/// same token once it has been remembered.
#[async_trait]
pub trait RequesterState: Send + Sync {
    /// Authenticated account, if any.
    fn account(&self) -> Option<AccountId>;

    async fn cart_token(&self) -> Result<Option<SessionToken>, StoreError>;

    /// Persists the token. Must be durable before returning.
    async fn remember_cart_token(&self, token: &SessionToken) -> Result<(), StoreError>;

    async fn forget_cart_token(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Requester whose session lives in memory.
    #[derive(Default)]
    pub struct TestRequester {
        pub account: Option<AccountId>,
        pub token: Mutex<Option<SessionToken>>,
    }

    impl TestRequester {
        pub fn guest() -> Self { Self::default() }

        pub fn guest_with(token: &SessionToken) -> Self {
            Self { account: None, token: Mutex::new(Some(token.clone())) }
        }

        pub fn signed_in(id: i64) -> Self { Self { account: Some(AccountId::new(id)), ..Default::default() } }

        pub fn logged_in_with(id: i64, token: &SessionToken) -> Self {
            Self { account: Some(AccountId::new(id)), token: Mutex::new(Some(token.clone())) }
        }

        pub fn token(&self) -> Option<SessionToken> { self.token.lock().unwrap().clone() }
    }

    #[async_trait]
    impl RequesterState for TestRequester {
        fn account(&self) -> Option<AccountId> { self.account }

        async fn cart_token(&self) -> Result<Option<SessionToken>, StoreError> { Ok(self.token()) }

        async fn remember_cart_token(&self, token: &SessionToken) -> Result<(), StoreError> {
            *self.token.lock().unwrap() = Some(token.clone());
            Ok(())
        }

        async fn forget_cart_token(&self) -> Result<(), StoreError> {
            *self.token.lock().unwrap() = None;
            Ok(())
        }
    }
}
