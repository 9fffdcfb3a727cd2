use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_model::Role;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::infra_mysql::*;
use crate::infra_redis::*;
use crate::infra_tmdb::*;
use crate::logger::*;
use crate::server::*;
use crate::settings::{Auth, Settings};
use anyhow::{Context, anyhow, bail};
use secrecy::{ExposeSecret, SecretString};
use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Secret used only when `auth.allow_dev_key` is set and no key is in the environment.
const DEV_SIGNING_KEY: &str = "moviehub-dev-signing-key";

/// The services a request handler can reach.
pub struct Services {
    pub auth_service: Arc<dyn AuthService>,
    pub access_guard: Arc<dyn AccessGuard>,
    pub visitor_counter: Arc<dyn VisitorCounter>,
    pub catalog_sync: Arc<dyn CatalogSync>,
    pub catalog_repo: Arc<dyn CatalogRepo>,
}

pub struct Server {
    pub auth_service: Arc<dyn AuthService>,
    pub access_guard: Arc<dyn AccessGuard>,
    pub visitor_counter: Arc<dyn VisitorCounter>,
    pub catalog_sync: Arc<dyn CatalogSync>,
    pub catalog_repo: Arc<dyn CatalogRepo>,
    scheduler_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    pool: Option<MySqlPool>,
}

impl Server {
    /// Wrap ready-made services without background tasks or pooled connections.
    pub fn from_services(services: Services) -> Self {
        Self {
            auth_service: services.auth_service,
            access_guard: services.access_guard,
            visitor_counter: services.visitor_counter,
            catalog_sync: services.catalog_sync,
            catalog_repo: services.catalog_repo,
            scheduler_handle: Mutex::new(None),
            cancel: CancellationToken::new(),
            pool: None,
        }
    }

    /// Build every service and start the background sync scheduler when an interval is set.
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        Self::build(settings, true).await
    }

    /// Same services as `try_new`, but no background scheduler. For one-shot commands.
    pub async fn try_new_without_scheduler(settings: &Settings) -> anyhow::Result<Self> {
        Self::build(settings, false).await
    }

    async fn build(settings: &Settings, with_scheduler: bool) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let needs_mysql = settings.auth.backend == "mysql" || settings.catalog.store == "mysql";
        let pool = if needs_mysql {
            let pool = MySqlPoolOptions::new()
                .max_connections(settings.mysql.max_connections)
                .connect(settings.mysql.dsn.expose_secret())
                .await
                .context("connecting to mysql")?;
            Some(pool)
        } else {
            None
        };
        let require_pool = || {
            pool.clone()
                .ok_or_else(|| anyhow!("mysql pool was not created"))
        };

        // region auth
        let credential_hasher: Arc<dyn CredentialHasher> = Arc::new(Argon2PasswordHasher::new());
        let (current_key, retired_keys) = load_signing_keys(&settings.auth)?;
        let token_codec: Arc<dyn TokenCodec> = Arc::new(JwtHs256Codec::new(
            JwtConfig {
                issuer: settings.auth.issuer.clone(),
                audience: settings.auth.audience.clone(),
                current_key,
                retired_keys,
            },
            clock.clone(),
        ));

        let user_directory: Arc<dyn UserDirectory>;
        let credential_store: Arc<dyn CredentialStore>;
        match settings.auth.backend.as_str() {
            "memory" => {
                let users = MemoryUserDirectory::new(credential_hasher.clone());
                for seed in &settings.auth.seed_users {
                    let role: Role = seed.role.parse()?;
                    users.insert(&seed.email, seed.password.expose_secret(), role).await?;
                    debug!(email = %seed.email, %role, "seeded user");
                }
                user_directory = Arc::new(users);
                credential_store = Arc::new(MemoryCredentialStore::new(clock.clone()));
            }
            "mysql" => {
                user_directory = Arc::new(MySqlUserDirectory::new(
                    require_pool()?,
                    credential_hasher.clone(),
                ));
                credential_store = Arc::new(MySqlCredentialStore::new(require_pool()?, clock.clone()));
            }
            other => bail!("Unknown auth backend: {}", other),
        }

        let auth_service: Arc<dyn AuthService> = Arc::new(RealAuthService::new(
            user_directory,
            credential_store,
            token_codec,
            clock.clone(),
            AuthPolicy {
                access_ttl: Duration::from_secs(settings.auth.access_ttl_secs),
                refresh_ttl: Duration::from_secs(settings.auth.refresh_ttl_secs),
            },
        ));
        let access_guard: Arc<dyn AccessGuard> = Arc::new(RealAccessGuard::new(
            auth_service.clone(),
            Duration::from_millis(settings.auth.guard_timeout_ms),
        ));
        // endregion

        // region counter
        let counter_store: Arc<dyn CounterStore> = match settings.counter.backend.as_str() {
            "memory" => Arc::new(MemoryCounterStore::new()),
            "redis" => {
                let redis_client = redis::Client::open(settings.redis.dsn.expose_secret())?;
                let redis_manager = redis_client
                    .get_connection_manager()
                    .await
                    .context("connecting to redis")?;
                Arc::new(RedisCounterStore::new(
                    redis_manager,
                    settings.counter.prefix.clone(),
                ))
            }
            other => bail!("Unknown counter backend: {}", other),
        };
        let visitor_counter: Arc<dyn VisitorCounter> = Arc::new(RealVisitorCounter::new(
            counter_store,
            settings.counter.name.clone(),
        ));
        // endregion

        // region catalog
        let catalog = &settings.catalog;
        let catalog_source: Arc<dyn CatalogSource> = match catalog.source.as_str() {
            "memory" => Arc::new(ScriptedCatalogSource::default()),
            "tmdb" => {
                let api_key = std::env::var(&catalog.api_key_env)
                    .with_context(|| format!("{} is not set", catalog.api_key_env))?;
                Arc::new(TmdbCatalogSource::try_new(TmdbConfig {
                    base_url: catalog.base_url.clone(),
                    api_key: SecretString::from(api_key),
                    language: catalog.language.clone(),
                    request_timeout: Duration::from_millis(catalog.request_timeout_ms),
                })?)
            }
            other => bail!("Unknown catalog source: {}", other),
        };
        let catalog_repo: Arc<dyn CatalogRepo> = match catalog.store.as_str() {
            "memory" => Arc::new(MemoryCatalogRepo::new()),
            "mysql" => Arc::new(MySqlCatalogRepo::new(require_pool()?)),
            other => bail!("Unknown catalog store: {}", other),
        };
        let catalog_sync: Arc<dyn CatalogSync> = Arc::new(SerializedCatalogSync::new(Arc::new(
            RealCatalogSync::new(
                catalog_source,
                catalog_repo.clone(),
                clock.clone(),
                SyncConfig {
                    max_pages: catalog.max_pages,
                    retry: catalog.retry.clone(),
                },
            ),
        )));
        // endregion

        // region runtime
        let cancel = CancellationToken::new();
        let scheduler_handle = if with_scheduler && catalog.sync_interval_secs > 0 {
            let scheduler = SyncScheduler::new(
                catalog_sync.clone(),
                Duration::from_secs(catalog.sync_interval_secs),
                cancel.clone(),
            );
            Some(tokio::spawn(async move {
                let _ = scheduler.run().await;
            }))
        } else {
            None
        };
        // endregion

        info!("server started");

        Ok(Self {
            auth_service,
            access_guard,
            visitor_counter,
            catalog_sync,
            catalog_repo,
            scheduler_handle: Mutex::new(scheduler_handle),
            cancel,
            pool,
        })
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");

        self.cancel.cancel();

        let handle = self
            .scheduler_handle
            .lock()
            .ok()
            .and_then(|mut lock| lock.take());
        if let Some(handle) = handle {
            let r = handle.await;
            info!("sync scheduler handle dropped: {:?}", r);
        }

        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}

fn read_secret(env: &str) -> Option<Vec<u8>> {
    std::env::var(env)
        .ok()
        .filter(|value| !value.is_empty())
        .map(String::into_bytes)
}

/// Current signing key plus retired keys that still verify. Keys are read once here and
/// never reloaded while the process runs.
pub fn load_signing_keys(auth: &Auth) -> anyhow::Result<(SigningKey, Vec<SigningKey>)> {
    let secret = match read_secret(&auth.signing_key_env) {
        Some(secret) => secret,
        None if auth.allow_dev_key => {
            warn!(
                "{} is not set, signing with the development key",
                auth.signing_key_env
            );
            DEV_SIGNING_KEY.as_bytes().to_vec()
        }
        None => bail!("{} is not set", auth.signing_key_env),
    };
    let current_key = SigningKey {
        kid: auth.signing_kid.clone(),
        secret,
    };

    let mut retired_keys = Vec::with_capacity(auth.retired_keys.len());
    for retired in &auth.retired_keys {
        if retired.kid == current_key.kid {
            bail!("retired key id {} is also the current key id", retired.kid);
        }
        let secret = read_secret(&retired.env)
            .ok_or_else(|| anyhow!("{} is not set for retired key {}", retired.env, retired.kid))?;
        retired_keys.push(SigningKey {
            kid: retired.kid.clone(),
            secret,
        });
    }

    Ok((current_key, retired_keys))
}
