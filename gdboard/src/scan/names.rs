use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use gdboard_client::{Client, ClientError};
use gdboard_model::{Progress, ProgressFn};
use gdboard_util::{CancelToken, IntHasher};
use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;

use crate::Outcome;

const LOOKUP_WORKERS: usize = 8;

/// Username lookup by user id. Abstracted so resolution logic can be
/// exercised without a network.
#[async_trait]
pub trait NameLookup: Sync {
    async fn username(&self, user_id: u32) -> Result<Box<str>, ClientError>;
}

#[async_trait]
impl NameLookup for Client {
    async fn username(&self, user_id: u32) -> Result<Box<str>, ClientError> {
        self.user(user_id).await.map(|user| user.username)
    }
}

/// Caches id-to-name mappings for the process lifetime. Restricted BN
/// accounts 404 on lookup and keep their placeholder; a later run may
/// still resolve them once unrestricted.
#[derive(Default)]
pub struct NameResolver {
    names: Mutex<HashMap<u32, Arc<str>, IntHasher>>,
}

impl NameResolver {
    /// Seeds names already present in scan payloads so they need no
    /// lookup of their own.
    pub fn prime(&self, entries: impl IntoIterator<Item = (u32, Box<str>)>) {
        let mut names = self.names.lock();

        for (user_id, name) in entries {
            if user_id != 0 && !name.is_empty() {
                names.entry(user_id).or_insert_with(|| Arc::from(&*name));
            }
        }
    }

    pub fn get(&self, user_id: u32) -> Arc<str> {
        let names = self.names.lock();

        names
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| placeholder(user_id))
    }

    /// Resolves every id not yet cached, a bounded number of lookups in
    /// flight at once. Failed lookups fall back to `User_<id>` without
    /// poisoning the cache.
    pub async fn resolve_all<L: NameLookup>(
        &self,
        lookup: &L,
        ids: impl IntoIterator<Item = u32>,
        progress: ProgressFn<'_>,
        cancel: &CancelToken,
    ) -> Outcome<()> {
        // Dedup before spawning; nothing lands in the cache until the
        // pool drains, so repeated ids would each get their own lookup.
        let missing: HashSet<u32, IntHasher> = {
            let names = self.names.lock();

            ids.into_iter()
                .filter(|&id| id != 0 && !names.contains_key(&id))
                .collect()
        };

        let total = missing.len();

        if total == 0 {
            return Outcome::Completed(());
        }

        let tasks = missing.into_iter().map(|user_id| async move {
            if cancel.is_cancelled() {
                return None;
            }

            match lookup.username(user_id).await {
                Ok(name) => Some((user_id, Some(name))),
                Err(ClientError::Cancelled) => None,
                Err(err) => {
                    debug!(user_id, %err, "Username lookup failed");

                    Some((user_id, None))
                }
            }
        });

        let mut stream = stream::iter(tasks).buffer_unordered(LOOKUP_WORKERS);
        let mut done = 0;

        while let Some(resolved) = stream.next().await {
            let Some((user_id, name)) = resolved else {
                return Outcome::Cancelled;
            };

            done += 1;

            if done % 25 == 0 {
                progress(Progress::ResolvingNames { done, total });
            }

            if let Some(name) = name {
                self.names.lock().insert(user_id, Arc::from(&*name));
            }
        }

        Outcome::Completed(())
    }
}

fn placeholder(user_id: u32) -> Arc<str> {
    Arc::from(format!("User_{user_id}").as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeLookup {
        known: HashMap<u32, &'static str, IntHasher>,
        calls: Mutex<Vec<u32>>,
    }

    impl FakeLookup {
        fn new(known: &[(u32, &'static str)]) -> Self {
            Self {
                known: known.iter().copied().collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl NameLookup for FakeLookup {
        async fn username(&self, user_id: u32) -> Result<Box<str>, ClientError> {
            self.calls.lock().push(user_id);

            self.known
                .get(&user_id)
                .map(|name| Box::from(*name))
                .ok_or(ClientError::NotFound)
        }
    }

    #[tokio::test]
    async fn resolves_and_caches() {
        let lookup = FakeLookup::new(&[(7, "Okoayu"), (8, "Nevo")]);
        let resolver = NameResolver::default();
        let cancel = CancelToken::new();
        let progress = |_: Progress| ();

        let outcome = resolver
            .resolve_all(&lookup, [7, 8, 7], &progress, &cancel)
            .await;

        assert!(!outcome.is_cancelled());
        assert_eq!(&*resolver.get(7), "Okoayu");
        assert_eq!(&*resolver.get(8), "Nevo");

        // Second round touches the network for nothing.
        resolver.resolve_all(&lookup, [7, 8], &progress, &cancel).await;

        assert_eq!(lookup.calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn repeated_ids_resolve_with_one_lookup() {
        let lookup = FakeLookup::new(&[(7, "Okoayu")]);
        let resolver = NameResolver::default();
        let cancel = CancelToken::new();
        let progress = |_: Progress| ();

        resolver
            .resolve_all(&lookup, [7, 7, 7], &progress, &cancel)
            .await;

        assert_eq!(lookup.calls.lock().len(), 1);
        assert_eq!(&*resolver.get(7), "Okoayu");
    }

    #[tokio::test]
    async fn failed_lookup_gets_placeholder() {
        let lookup = FakeLookup::new(&[]);
        let resolver = NameResolver::default();
        let cancel = CancelToken::new();
        let progress = |_: Progress| ();

        resolver.resolve_all(&lookup, [42], &progress, &cancel).await;

        assert_eq!(&*resolver.get(42), "User_42");
    }

    #[tokio::test]
    async fn primed_names_skip_lookup() {
        let lookup = FakeLookup::new(&[]);
        let resolver = NameResolver::default();
        let cancel = CancelToken::new();
        let progress = |_: Progress| ();

        resolver.prime([(7, Box::from("Venix"))]);
        resolver.resolve_all(&lookup, [7], &progress, &cancel).await;

        assert!(lookup.calls.lock().is_empty());
        assert_eq!(&*resolver.get(7), "Venix");
    }

    #[test]
    fn unknown_id_is_a_placeholder() {
        let resolver = NameResolver::default();

        assert_eq!(&*resolver.get(9999), "User_9999");
    }
}
