//! Test harness for Kerberos resolution scenarios.
//!
//! Builds an in-process deployment: one simulated KDC per realm (a service
//! keytab on disk plus a ticket issuer), in-memory directories, a
//! configuration store with a test provider factory, and a dispatcher over
//! an in-memory user store.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tempfile::TempDir;
use uuid::Uuid;

use kc_core::{EngineConfig, ProviderComponent, RecordingEventListener};
use kc_federation::config::keys;
use kc_federation::{
    ConfigurationStore, DirectoryEntry, DirectoryLookup, EditMode, FederatedProvider,
    FederationResult, IdentityMaterializer, InboundTicket, LookupError, PasswordPolicy,
    ProviderChange, ProviderConfig, ProviderFactory, ProviderRegistry, RegistryConfigurationStore,
    Resolution, ResolutionDispatcher,
};
use kc_federation_kerberos::{EncryptionType, Keytab, KeytabEntry, PrincipalName, TicketIssuer};
use kc_model::User;
use kc_storage::{InMemoryUserStore, UserProvider};

/// Provider type served by [`HarnessFactory`].
pub const PROVIDER_TYPE: &str = "test-directory";

/// Service principal every simulated KDC issues tickets for.
pub const SERVICE: &str = "HTTP/localhost";

// ============================================================================
// Directory
// ============================================================================

/// In-memory directory with optional latency and failure injection.
#[derive(Default)]
pub struct MemoryDirectory {
    entries: Mutex<HashMap<String, DirectoryEntry>>,
    delay: Option<Duration>,
    unreachable: bool,
    lookups: AtomicUsize,
}

impl MemoryDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every lookup.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fails every lookup with a connection error.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    /// Adds an entry with a DN derived from `base_dn`.
    pub fn with_user(self, username: &str, base_dn: &str) -> Self {
        let entry = DirectoryEntry::new(format!("uid={username},{base_dn}"), username)
            .with_id(Uuid::new_v4().to_string())
            .with_email(format!("{}@{}", username.to_lowercase(), mail_domain(base_dn)));
        self.with_entry(entry)
    }

    /// Adds an entry.
    pub fn with_entry(self, entry: DirectoryEntry) -> Self {
        self.put(entry);
        self
    }

    /// Adds or replaces an entry.
    pub fn put(&self, entry: DirectoryEntry) {
        self.entries
            .lock()
            .insert(entry.username.to_lowercase(), entry);
    }

    /// Number of lookups served or attempted.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

fn mail_domain(base_dn: &str) -> String {
    base_dn
        .split(',')
        .filter_map(|part| part.trim().strip_prefix("dc="))
        .collect::<Vec<_>>()
        .join(".")
}

#[async_trait]
impl DirectoryLookup for MemoryDirectory {
    async fn lookup(&self, username: &str) -> Result<DirectoryEntry, LookupError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable {
            return Err(LookupError::Connection("connection refused".into()));
        }
        self.entries
            .lock()
            .get(&username.to_lowercase())
            .cloned()
            .ok_or(LookupError::NotFound)
    }
}

// ============================================================================
// KDC
// ============================================================================

/// A simulated KDC: the service key of one realm.
pub struct Kdc {
    /// Realm name.
    pub realm: String,
    /// Service principal, `HTTP/localhost@REALM`.
    pub service: PrincipalName,
    /// Keytab file holding the service key.
    pub keytab_path: PathBuf,
    issuer: TicketIssuer,
}

impl Kdc {
    fn create(dir: &TempDir, realm: &str) -> anyhow::Result<Self> {
        let service = PrincipalName::parse(&format!("{SERVICE}@{realm}"))?;
        let mut keytab = Keytab::new();
        keytab.add(KeytabEntry::generate(service.clone(), 1, EncryptionType::Aes256));

        let keytab_path = dir.path().join(format!("{}.keytab", realm.to_lowercase()));
        keytab.write(&keytab_path)?;
        let issuer = TicketIssuer::from_keytab(&keytab, &service)?;

        Ok(Self {
            realm: realm.to_string(),
            service,
            keytab_path,
            issuer,
        })
    }

    /// Mints a fresh SPNEGO ticket for `client`.
    pub fn ticket(&self, client: &str) -> anyhow::Result<InboundTicket> {
        let token = self.issuer.ticket(PrincipalName::parse(client)?).mint()?;
        Ok(InboundTicket::new(token))
    }

    /// Mints a ticket valid only between `start` and `end`.
    pub fn ticket_between(
        &self,
        client: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<InboundTicket> {
        let token = self
            .issuer
            .ticket(PrincipalName::parse(client)?)
            .valid_between(start, end)
            .mint()?;
        Ok(InboundTicket::new(token))
    }
}

// ============================================================================
// Providers
// ============================================================================

/// Builds providers over the harness directories.
#[derive(Default)]
pub struct HarnessFactory {
    directories: Mutex<HashMap<String, Arc<dyn DirectoryLookup>>>,
}

impl HarnessFactory {
    fn attach(&self, provider: &str, directory: Arc<dyn DirectoryLookup>) {
        self.directories.lock().insert(provider.to_string(), directory);
    }
}

impl ProviderFactory for HarnessFactory {
    fn provider_type(&self) -> &str {
        PROVIDER_TYPE
    }

    fn create(&self, config: ProviderConfig) -> FederationResult<FederatedProvider> {
        let directory = self
            .directories
            .lock()
            .get(&config.name)
            .cloned()
            .unwrap_or_else(|| Arc::new(MemoryDirectory::new()));
        Ok(FederatedProvider::new(config, directory))
    }
}

/// Description of a provider to register.
pub struct ProviderSpec {
    name: String,
    priority: i32,
    kerberos_realm: String,
    directory: Arc<dyn DirectoryLookup>,
    settings: Vec<(&'static str, String)>,
    keytab: Option<PathBuf>,
}

impl ProviderSpec {
    /// A provider serving tickets of `kerberos_realm`.
    pub fn new(
        name: &str,
        priority: i32,
        kerberos_realm: &str,
        directory: Arc<dyn DirectoryLookup>,
    ) -> Self {
        Self {
            name: name.to_string(),
            priority,
            kerberos_realm: kerberos_realm.to_string(),
            directory,
            settings: Vec::new(),
            keytab: None,
        }
    }

    /// Restricts the provider to principals of `realm`.
    pub fn expected_realm(self, realm: &str) -> Self {
        self.set(keys::EXPECTED_REALM, realm)
    }

    pub fn edit_mode(self, mode: EditMode) -> Self {
        self.set(keys::EDIT_MODE, &mode.to_string())
    }

    pub fn validate_password_policy(self) -> Self {
        self.set(keys::VALIDATE_PASSWORD_POLICY, "true")
    }

    pub fn trust_email(self) -> Self {
        self.set(keys::TRUST_EMAIL, "true")
    }

    pub fn lookup_timeout(self, timeout: Duration) -> Self {
        let millis = timeout.as_millis().to_string();
        self.set(keys::LOOKUP_TIMEOUT, &millis)
    }

    pub fn disabled(self) -> Self {
        self.set(keys::ENABLED, "false")
    }

    /// Uses this keytab instead of the realm KDC's.
    pub fn keytab(mut self, path: PathBuf) -> Self {
        self.keytab = Some(path);
        self
    }

    fn set(mut self, key: &'static str, value: &str) -> Self {
        self.settings.push((key, value.to_string()));
        self
    }
}

// ============================================================================
// Harness
// ============================================================================

/// A complete resolution engine for one local realm.
pub struct DispatcherTestHarness {
    dir: TempDir,
    kdcs: Mutex<HashMap<String, Arc<Kdc>>>,
    factory: Arc<HarnessFactory>,
    /// Configuration store feeding the registry.
    pub config_store: RegistryConfigurationStore,
    /// Local user store.
    pub users: Arc<InMemoryUserStore>,
    /// Every event emitted by the engine.
    pub events: Arc<RecordingEventListener>,
    /// The dispatcher under test.
    pub dispatcher: Arc<ResolutionDispatcher>,
    /// Local realm id.
    pub realm_id: Uuid,
}

impl DispatcherTestHarness {
    /// Creates a harness with no password policy.
    pub fn new() -> anyhow::Result<Self> {
        Self::with_policy("")
    }

    /// Creates a harness whose realm enforces `policy`.
    pub fn with_policy(policy: &str) -> anyhow::Result<Self> {
        let realm_id = Uuid::now_v7();
        let registry = Arc::new(ProviderRegistry::new());
        let events = Arc::new(RecordingEventListener::new());
        let users = Arc::new(InMemoryUserStore::new());
        let factory = Arc::new(HarnessFactory::default());

        let config_store = RegistryConfigurationStore::new(
            registry.clone(),
            realm_id,
            EngineConfig::default(),
            events.clone(),
        )
        .with_factory(factory.clone());

        let materializer = IdentityMaterializer::new(users.clone(), events.clone())
            .with_policy(policy.parse::<PasswordPolicy>()?);
        let dispatcher = Arc::new(ResolutionDispatcher::new(
            registry,
            Arc::new(materializer),
            events.clone(),
        ));

        Ok(Self {
            dir: TempDir::new()?,
            kdcs: Mutex::new(HashMap::new()),
            factory,
            config_store,
            users,
            events,
            dispatcher,
            realm_id,
        })
    }

    /// Returns the KDC of `realm`, creating it on first use.
    pub fn kdc(&self, realm: &str) -> anyhow::Result<Arc<Kdc>> {
        let mut kdcs = self.kdcs.lock();
        if let Some(kdc) = kdcs.get(realm) {
            return Ok(kdc.clone());
        }
        let kdc = Arc::new(Kdc::create(&self.dir, realm)?);
        kdcs.insert(realm.to_string(), kdc.clone());
        Ok(kdc)
    }

    /// Writes a keytab with a freshly generated key for the service
    /// principal of `realm`, unrelated to the KDC's key.
    pub fn rogue_keytab(&self, realm: &str) -> anyhow::Result<PathBuf> {
        let service = PrincipalName::parse(&format!("{SERVICE}@{realm}"))?;
        let mut keytab = Keytab::new();
        keytab.add(KeytabEntry::generate(service, 1, EncryptionType::Aes256));

        let path = self
            .dir
            .path()
            .join(format!("{}-rogue.keytab", realm.to_lowercase()));
        keytab.write(&path)?;
        Ok(path)
    }

    /// Path inside the harness directory that does not exist.
    pub fn missing_keytab(&self) -> PathBuf {
        self.dir.path().join("missing.keytab")
    }

    /// Registers a provider through the configuration store.
    pub fn add_provider(&self, spec: ProviderSpec) -> anyhow::Result<()> {
        let keytab = match spec.keytab {
            Some(path) => path,
            None => self.kdc(&spec.kerberos_realm)?.keytab_path.clone(),
        };

        let mut component = ProviderComponent::new(&spec.name, PROVIDER_TYPE, spec.priority)
            .with_config(keys::KERBEROS_REALM, &spec.kerberos_realm)
            .with_config(keys::SERVER_PRINCIPAL, SERVICE)
            .with_config(keys::KEY_TAB, keytab.to_string_lossy());
        for (key, value) in spec.settings {
            component = component.with_config(key, value);
        }

        self.factory.attach(&spec.name, spec.directory);
        self.config_store
            .apply(ProviderChange::Register(component))?;
        Ok(())
    }

    /// Removes a provider through the configuration store.
    pub fn remove_provider(&self, name: &str) -> anyhow::Result<()> {
        self.config_store
            .apply(ProviderChange::Remove(name.to_string()))?;
        Ok(())
    }

    /// Mints a ticket for `client` from the KDC of the client's realm.
    pub fn ticket(&self, client: &str) -> anyhow::Result<InboundTicket> {
        let realm = PrincipalName::parse(client)?.realm().to_string();
        self.kdc(&realm)?.ticket(client)
    }

    /// Mints a ticket for `client` from the KDC of `service_realm`.
    ///
    /// This is what a client of another realm presents after a cross-realm
    /// referral: the ticket is sealed for the service realm's key while the
    /// client principal keeps its home realm.
    pub fn cross_realm_ticket(
        &self,
        client: &str,
        service_realm: &str,
    ) -> anyhow::Result<InboundTicket> {
        self.kdc(service_realm)?.ticket(client)
    }

    /// Resolves a ticket, keeping the attempt trace.
    pub async fn resolve(&self, ticket: &InboundTicket) -> Resolution {
        self.dispatcher.resolve_traced(ticket).await
    }

    /// Looks up a local user by username.
    pub async fn user(&self, username: &str) -> anyhow::Result<Option<User>> {
        Ok(self.users.get_by_username(self.realm_id, username).await?)
    }

    /// Number of local users.
    pub async fn user_count(&self) -> anyhow::Result<u64> {
        Ok(self.users.count(self.realm_id).await?)
    }
}
