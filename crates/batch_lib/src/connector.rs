//! Contains the types used to open a connection to the primary Redis instance.
//!
//! Every worker opens its own connection with [`Connect::connect`]. When a sentinel is
//! configured, the address of the primary instance is asked to the sentinel each time, so two
//! workers may reach different instances if a failover happens during the run.

use std::{fmt, future::Future};

use deadpool_redis::redis::{
    self, AsyncCommands as _, Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo,
    RedisResult,
};

use crate::{RedisConnection, error::ConnectError};

/// The default Redis host.
pub const DEFAULT_HOST: &str = "localhost";
/// The default Redis port.
pub const DEFAULT_PORT: u16 = 6379;

/// The sentinel used to discover the primary instance of a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelConfig {
    /// The host of the sentinel.
    pub host: String,
    /// The port of the sentinel.
    pub port: u16,
    /// The name of the group monitored by the sentinel.
    pub group: String,
}

impl SentinelConfig {
    fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }
}

/// The configuration used by every worker to connect to the Redis database.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// The host of the instance, ignored when a sentinel is configured.
    pub host: String,
    /// The port of the instance, ignored when a sentinel is configured.
    pub port: u16,
    /// The index of the logical database.
    pub db: i64,
    /// The password, also sent to the sentinel.
    pub password: Option<String>,
    /// The sentinel to ask for the primary instance.
    pub sentinel: Option<SentinelConfig>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            db: 0,
            password: None,
            sentinel: None,
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db", &self.db)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("sentinel", &self.sentinel)
            .finish()
    }
}

/// The address of a Redis instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// The host.
    pub host: String,
    /// The port.
    pub port: u16,
}

impl Endpoint {
    /// Returns the endpoint with the provided host and port.
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// The operations a worker needs on the Redis database.
pub trait Store: Send {
    /// Returns the value of the key, or `None` if it doesn't exist.
    fn get(&mut self, key: &str) -> impl Future<Output = RedisResult<Option<String>>> + Send;

    /// Deletes the key. Deleting a missing key isn't an error.
    fn del(&mut self, key: &str) -> impl Future<Output = RedisResult<()>> + Send;
}

/// Something that opens a new [`Store`] for each worker.
pub trait Connect: Send + Sync + 'static {
    /// The type of the opened store.
    type Handle: Store + 'static;

    /// Opens a new connection.
    fn connect(&self) -> impl Future<Output = Result<Self::Handle, ConnectError>> + Send;
}

/// The query sent to a sentinel to get the address of the current primary instance.
pub trait SentinelQuery: Send {
    /// Returns the address of the primary instance of the group, or `None` if the group is
    /// unknown or has no primary.
    fn primary_addr(
        &mut self,
        group: &str,
    ) -> impl Future<Output = RedisResult<Option<(String, u16)>>> + Send;
}

impl SentinelQuery for RedisConnection {
    async fn primary_addr(&mut self, group: &str) -> RedisResult<Option<(String, u16)>> {
        redis::cmd("SENTINEL")
            .arg("get-master-addr-by-name")
            .arg(group)
            .query_async(self)
            .await
    }
}

/// Asks the sentinel for the address of the primary instance of its group.
pub async fn resolve_primary<Q: SentinelQuery>(
    query: &mut Q,
    sentinel: &SentinelConfig,
) -> Result<Endpoint, ConnectError> {
    match query.primary_addr(&sentinel.group).await {
        Ok(Some((host, port))) => Ok(Endpoint::new(host, port)),
        Ok(None) => Err(ConnectError::Primary {
            group: sentinel.group.clone(),
        }),
        Err(source) => Err(ConnectError::Sentinel {
            endpoint: sentinel.endpoint().to_string(),
            source,
        }),
    }
}

fn connection_info(endpoint: &Endpoint, db: i64, password: Option<&str>) -> ConnectionInfo {
    ConnectionInfo {
        addr: ConnectionAddr::Tcp(endpoint.host.clone(), endpoint.port),
        redis: RedisConnectionInfo {
            db,
            password: password.map(ToOwned::to_owned),
            ..Default::default()
        },
    }
}

/// Opens a connection to a single Redis instance, either a sentinel or a primary.
pub trait Open: Send + Sync + 'static {
    /// The type of the opened connection.
    type Conn: Store + SentinelQuery + 'static;

    /// Opens a connection to the logical database `db` of the instance at `endpoint`.
    fn open(
        &self,
        endpoint: &Endpoint,
        db: i64,
        password: Option<&str>,
    ) -> impl Future<Output = RedisResult<Self::Conn>> + Send;
}

/// Opens multiplexed TCP connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpOpener;

impl Open for TcpOpener {
    type Conn = StoreHandle;

    async fn open(
        &self,
        endpoint: &Endpoint,
        db: i64,
        password: Option<&str>,
    ) -> RedisResult<StoreHandle> {
        let client = Client::open(connection_info(endpoint, db, password))?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(StoreHandle { conn })
    }
}

/// An open connection to a Redis instance, owned by a single worker.
pub struct StoreHandle {
    conn: RedisConnection,
}

impl Store for StoreHandle {
    async fn get(&mut self, key: &str) -> RedisResult<Option<String>> {
        self.conn.get(key).await
    }

    async fn del(&mut self, key: &str) -> RedisResult<()> {
        let _: usize = self.conn.del(key).await?;
        Ok(())
    }
}

impl SentinelQuery for StoreHandle {
    async fn primary_addr(&mut self, group: &str) -> RedisResult<Option<(String, u16)>> {
        self.conn.primary_addr(group).await
    }
}

/// Opens connections to the Redis database described by a [`ConnectionConfig`].
#[derive(Debug, Clone)]
pub struct RedisConnector<O = TcpOpener> {
    config: ConnectionConfig,
    opener: O,
}

impl RedisConnector {
    /// Returns the connector using the provided configuration.
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_opener(config, TcpOpener)
    }
}

impl<O: Open> RedisConnector<O> {
    /// Returns the connector using the provided configuration, opening connections with `opener`.
    pub fn with_opener(config: ConnectionConfig, opener: O) -> Self {
        Self { config, opener }
    }

    /// Returns the address of the primary instance, asking the sentinel if there is one.
    pub async fn primary_endpoint(&self) -> Result<Endpoint, ConnectError> {
        let Some(sentinel) = &self.config.sentinel else {
            return Ok(Endpoint::new(self.config.host.clone(), self.config.port));
        };

        let sentinel_endpoint = sentinel.endpoint();
        // Sentinels don't have logical databases.
        let mut conn = self
            .opener
            .open(&sentinel_endpoint, 0, self.config.password.as_deref())
            .await
            .map_err(|source| ConnectError::Sentinel {
                endpoint: sentinel_endpoint.to_string(),
                source,
            })?;

        let endpoint = resolve_primary(&mut conn, sentinel).await?;
        tracing::debug!(
            "Sentinel {sentinel_endpoint} reports primary {endpoint} for group `{}`",
            sentinel.group
        );
        Ok(endpoint)
    }
}

impl<O: Open> Connect for RedisConnector<O> {
    type Handle = O::Conn;

    async fn connect(&self) -> Result<O::Conn, ConnectError> {
        let endpoint = self.primary_endpoint().await?;
        let conn = self
            .opener
            .open(&endpoint, self.config.db, self.config.password.as_deref())
            .await
            .map_err(|source| ConnectError::Connection {
                endpoint: endpoint.to_string(),
                source,
            })?;
        tracing::debug!("Connected to {endpoint}");
        Ok(conn)
    }
}
