//! Startup hydration: seed the identity store with its default state.
//!
//! Once the store is ready, [`Hydrator::run`] drives three independent
//! strands concurrently:
//!
//! 1. **default user**: insert the identity, then its key-auth credential.
//! 2. **named users**: the same two-stage chain, one task per user.
//! 3. **scopes**: check every configured scope, insert only the missing
//!    ones in a single batch.
//!
//! Every store failure is logged where it happens and ends only its own
//! chain. Nothing is retried or rolled back. All strands are joined before
//! `run` returns, and the outcome is summarised in a [`HydrationReport`].

pub mod scopes;

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::config::{HydrationConfig, IdentityDescriptor, DEFAULT_SCOPE_CONCURRENCY};
use crate::store::{
    Connection, Credential, CredentialRegistrar, CredentialType, IdentityFields, UserRegistrar,
};

pub use scopes::{dedup_scopes, missing_scopes, ScopeDiff};

/// Where a descriptor came from in the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    DefaultUser,
    User(usize),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::DefaultUser => f.write_str("default_user"),
            Origin::User(i) => write!(f, "users[{i}]"),
        }
    }
}

/// How far one identity chain got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChainOutcome {
    /// Identity and credential both written.
    Provisioned,
    /// Identity insert failed; credential never attempted.
    IdentityFailed,
    /// Identity written, credential insert failed. The identity stays.
    CredentialFailed,
}

/// Summary of one hydration run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HydrationReport {
    pub identities_created: usize,
    pub credentials_created: usize,
    pub identity_failures: usize,
    pub credential_failures: usize,
    /// Distinct scopes whose existence was checked (0 when the lookup failed).
    pub scopes_checked: usize,
    /// Scopes submitted in the bulk insert (empty when none were missing).
    pub scopes_inserted: Vec<String>,
    /// An existence check or the bulk insert failed.
    pub scope_step_failed: bool,
}

impl HydrationReport {
    pub fn failures(&self) -> usize {
        self.identity_failures + self.credential_failures + usize::from(self.scope_step_failed)
    }

    pub fn is_clean(&self) -> bool {
        self.failures() == 0
    }

    fn record(&mut self, outcome: ChainOutcome) {
        match outcome {
            ChainOutcome::Provisioned => {
                self.identities_created += 1;
                self.credentials_created += 1;
            }
            ChainOutcome::IdentityFailed => self.identity_failures += 1,
            ChainOutcome::CredentialFailed => {
                self.identities_created += 1;
                self.credential_failures += 1;
            }
        }
    }
}

impl fmt::Display for HydrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "identities={} credentials={} scopes_checked={} scopes_inserted={} failures={}",
            self.identities_created,
            self.credentials_created,
            self.scopes_checked,
            self.scopes_inserted.len(),
            self.failures()
        )
    }
}

#[derive(Debug, Default)]
struct ScopeOutcome {
    checked: usize,
    inserted: Vec<String>,
    failed: bool,
}

/// Drives the registrars to realise a [`HydrationConfig`].
#[derive(Clone)]
pub struct Hydrator {
    users: Arc<dyn UserRegistrar>,
    credentials: Arc<dyn CredentialRegistrar>,
    scope_concurrency: usize,
}

impl Hydrator {
    pub fn new(users: Arc<dyn UserRegistrar>, credentials: Arc<dyn CredentialRegistrar>) -> Self {
        Self {
            users,
            credentials,
            scope_concurrency: DEFAULT_SCOPE_CONCURRENCY,
        }
    }

    /// Cap on in-flight scope existence checks.
    pub fn with_scope_concurrency(mut self, limit: usize) -> Self {
        self.scope_concurrency = limit;
        self
    }

    /// Run hydration to completion. Never fails; see the report and logs.
    pub async fn run(&self, config: &HydrationConfig) -> HydrationReport {
        info!("attempting to hydrate store with default profiles/scopes");

        let (mut report, scopes) = tokio::join!(
            self.provision_identities(config),
            self.ensure_scopes(&config.scopes),
        );

        report.scopes_checked = scopes.checked;
        report.scopes_inserted = scopes.inserted;
        report.scope_step_failed = scopes.failed;

        if report.is_clean() {
            info!(%report, "hydration complete");
        } else {
            error!(%report, "hydration finished with failures");
        }
        report
    }

    /// Spawn one chain per descriptor and join them all.
    async fn provision_identities(&self, config: &HydrationConfig) -> HydrationReport {
        let mut chains: JoinSet<ChainOutcome> = JoinSet::new();

        if let Some(default_user) = &config.default_user {
            info!(origin = %Origin::DefaultUser, name = %default_user.name, "found default app");
            chains.spawn(provision(
                self.users.clone(),
                self.credentials.clone(),
                default_user.clone(),
                Origin::DefaultUser,
            ));
        }

        if !config.users.is_empty() {
            info!(count = config.users.len(), "found users to insert");
        }
        for (i, user) in config.users.iter().enumerate() {
            chains.spawn(provision(
                self.users.clone(),
                self.credentials.clone(),
                user.clone(),
                Origin::User(i),
            ));
        }

        let mut report = HydrationReport::default();
        while let Some(joined) = chains.join_next().await {
            match joined {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    error!("identity chain panicked: {e}");
                    report.record(ChainOutcome::IdentityFailed);
                }
            }
        }
        report
    }

    async fn ensure_scopes(&self, desired: &[String]) -> ScopeOutcome {
        if desired.is_empty() {
            debug!("no default scopes configured");
            return ScopeOutcome::default();
        }
        info!(count = desired.len(), "found default scopes");

        let ScopeDiff { checked, missing } =
            match missing_scopes(self.credentials.as_ref(), desired, self.scope_concurrency).await {
                Ok(diff) => diff,
                Err(e) => {
                    error!("scope lookup failed: {e}");
                    return ScopeOutcome { checked: 0, inserted: Vec::new(), failed: true };
                }
            };

        info!(?missing, "scope values after filter");
        if missing.is_empty() {
            info!("no scopes to insert");
            return ScopeOutcome { checked, ..Default::default() };
        }

        match self.credentials.insert_scopes(&missing).await {
            Ok(()) => {
                info!(count = missing.len(), "default scopes inserted");
                ScopeOutcome { checked, inserted: missing, failed: false }
            }
            Err(e) => {
                error!("scope insert failed: {e}");
                ScopeOutcome { checked, inserted: Vec::new(), failed: true }
            }
        }
    }
}

/// Insert one identity, then its key-auth credential.
async fn provision(
    users: Arc<dyn UserRegistrar>,
    credentials: Arc<dyn CredentialRegistrar>,
    descriptor: IdentityDescriptor,
    origin: Origin,
) -> ChainOutcome {
    let name = descriptor.name.as_str();
    debug!(%origin, name, "inserting identity");

    let record = match users.insert(IdentityFields::from_name(name)).await {
        Ok(record) => record,
        Err(e) => {
            error!(%origin, name, "identity insert failed: {e}");
            return ChainOutcome::IdentityFailed;
        }
    };
    info!(%origin, name, id = %record.id, "identity inserted");

    let credential = Credential::key_auth(name, &descriptor.key_id, &descriptor.key_secret);
    match credentials
        .insert_credential(&record.id, CredentialType::KeyAuth, credential)
        .await
    {
        Ok(()) => {
            info!(%origin, name, key_id = %descriptor.key_id, "credentials inserted");
            ChainOutcome::Provisioned
        }
        Err(e) => {
            error!(%origin, name, "credential insert failed: {e}");
            ChainOutcome::CredentialFailed
        }
    }
}

/// Wait for the store to become ready, then hydrate it once.
///
/// Returns `None` if the store never became ready; the failure is logged.
pub async fn on_ready(
    connection: Connection,
    config: &HydrationConfig,
    scope_concurrency: usize,
) -> Option<HydrationReport> {
    let store = match connection.ready().await {
        Ok(store) => store,
        Err(e) => {
            error!("error in identity store: {e}");
            return None;
        }
    };
    info!("identity store is ready");

    let hydrator = Hydrator::new(store.clone(), store).with_scope_concurrency(scope_concurrency);
    Some(hydrator.run(config).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn descriptor(name: &str, key_id: &str) -> IdentityDescriptor {
        IdentityDescriptor {
            name: name.into(),
            key_id: key_id.into(),
            key_secret: format!("{key_id}-secret"),
        }
    }

    fn hydrator(store: &Arc<MemoryStore>) -> Hydrator {
        Hydrator::new(store.clone(), store.clone())
    }

    #[test]
    fn origin_display() {
        assert_eq!(Origin::DefaultUser.to_string(), "default_user");
        assert_eq!(Origin::User(2).to_string(), "users[2]");
    }

    #[test]
    fn report_counts_failures() {
        let mut report = HydrationReport::default();
        assert!(report.is_clean());
        report.record(ChainOutcome::Provisioned);
        report.record(ChainOutcome::CredentialFailed);
        report.record(ChainOutcome::IdentityFailed);
        report.scope_step_failed = true;

        assert_eq!(report.identities_created, 2);
        assert_eq!(report.credentials_created, 1);
        assert_eq!(report.failures(), 3);
        assert!(report.to_string().contains("failures=3"));
    }

    #[tokio::test]
    async fn provisions_default_and_named_users() {
        let store = Arc::new(MemoryStore::new());
        let config = HydrationConfig {
            default_user: Some(descriptor("admin", "k1")),
            users: vec![descriptor("alice", "ka"), descriptor("bob", "kb")],
            scopes: vec![],
        };

        let report = hydrator(&store).run(&config).await;
        assert_eq!(report.identities_created, 3);
        assert_eq!(report.credentials_created, 3);
        assert!(report.is_clean());

        let bob = store.find_user("bob").await.unwrap();
        let creds = store.credentials(&bob.id).await;
        assert_eq!(creds.len(), 1);
        assert_eq!(creds[0].consumer_id, "bob");
        assert_eq!(creds[0].key_id, "kb");
        assert_eq!(creds[0].key_secret, "kb-secret");
    }

    #[tokio::test]
    async fn rerun_skips_existing_identities_and_scopes() {
        let store = Arc::new(MemoryStore::new());
        let config = HydrationConfig {
            default_user: Some(descriptor("admin", "k1")),
            users: vec![],
            scopes: vec!["read".into(), "write".into()],
        };

        let first = hydrator(&store).run(&config).await;
        assert_eq!(first.scopes_inserted, vec!["read".to_string(), "write".to_string()]);

        let second = hydrator(&store).run(&config).await;
        assert!(second.scopes_inserted.is_empty());
        assert!(!second.scope_step_failed);
        assert_eq!(second.scopes_checked, 2);
        // Duplicate username is a logged, isolated failure.
        assert_eq!(second.identity_failures, 1);
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn duplicate_scopes_are_checked_once() {
        let store = Arc::new(MemoryStore::new());
        let config = HydrationConfig {
            scopes: vec!["read".into(), "read".into(), "write".into()],
            ..Default::default()
        };
        let report = hydrator(&store).run(&config).await;
        assert_eq!(report.scopes_checked, 2);
        assert_eq!(report.scopes_inserted, vec!["read".to_string(), "write".to_string()]);
    }

    #[tokio::test]
    async fn on_ready_hydrates_emulated_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut cfg = crate::config::Config::minimal(dir.path().to_path_buf(), "info".into());
        cfg.db.hydration.scopes = vec!["read".into()];

        let connection = crate::store::connect(&cfg.db);
        let report = on_ready(connection, &cfg.db.hydration, 4).await.unwrap();
        assert_eq!(report.scopes_inserted, vec!["read".to_string()]);
    }

    #[tokio::test]
    async fn on_ready_returns_none_when_store_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut cfg = crate::config::Config::minimal(dir.path().to_path_buf(), "info".into());
        cfg.db.emulate = false;
        std::fs::write(&cfg.db.path, b"not json").unwrap();

        let connection = crate::store::connect(&cfg.db);
        assert!(on_ready(connection, &cfg.db.hydration, 4).await.is_none());
    }
}
