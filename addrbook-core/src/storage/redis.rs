use super::{
    AddressBook, CreateEntryOutcome, DeleteEntryOutcome, ReadEntryOutcome, UpdateEntryOutcome,
};
use crate::{AddrBookError, Phone, Result};
use ::redis::AsyncCommands;
use ::redis::aio::{ConnectionLike, MultiplexedConnection};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::RwLock;

/// Address book backed by one Redis hash.
///
/// Holds a single connection shared by all requests. The connection is
/// opened by [`RedisAddressBook::connect`] and released by
/// [`AddressBook::close`]; operations after close fail with
/// [`AddrBookError::StoreUnavailable`].
pub struct RedisAddressBook<C = MultiplexedConnection> {
    conn: RwLock<Option<C>>,
    hash_key: String,
    ping_timeout: Duration,
}

impl RedisAddressBook {
    pub async fn connect(url: &str, hash_key: &str, ping_timeout: Duration) -> Result<Self> {
        let client = ::redis::Client::open(url).map_err(|error| {
            AddrBookError::Config(format!("redis connection config error: {}", error))
        })?;

        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| {
                AddrBookError::StoreUnavailable(format!("redis connection failed: {}", error))
            })?;

        tracing::info!("Connected to redis, hash key '{}'", hash_key);

        Ok(Self::from_connection(conn, hash_key, ping_timeout))
    }
}

impl<C> RedisAddressBook<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    /// Wraps an already established connection.
    pub fn from_connection(conn: C, hash_key: &str, ping_timeout: Duration) -> Self {
        Self {
            conn: RwLock::new(Some(conn)),
            hash_key: hash_key.to_string(),
            ping_timeout,
        }
    }

    async fn connection(&self) -> Result<C> {
        self.conn.read().await.clone().ok_or_else(|| {
            AddrBookError::StoreUnavailable("redis connection is closed".to_string())
        })
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let pong: String = ::redis::cmd("PING").query_async(&mut conn).await?;
        tracing::trace!("redis PING -> {}", pong);
        Ok(())
    }
}

#[async_trait]
impl<C> AddressBook for RedisAddressBook<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    async fn create(&self, phone: &Phone, address: &str) -> Result<CreateEntryOutcome> {
        let mut conn = self.connection().await?;
        let created: bool = conn
            .hset_nx(&self.hash_key, phone.as_str(), address)
            .await?;

        if !created {
            return Ok(CreateEntryOutcome::AlreadyExists);
        }

        Ok(CreateEntryOutcome::Created(address.to_string()))
    }

    async fn get(&self, phone: &Phone) -> Result<ReadEntryOutcome> {
        let mut conn = self.connection().await?;
        let address: Option<String> = conn.hget(&self.hash_key, phone.as_str()).await?;

        Ok(match address {
            Some(address) => ReadEntryOutcome::Found(address),
            None => ReadEntryOutcome::NotFound,
        })
    }

    async fn update(&self, phone: &Phone, address: &str) -> Result<UpdateEntryOutcome> {
        let mut conn = self.connection().await?;
        let exists: bool = conn.hexists(&self.hash_key, phone.as_str()).await?;
        if !exists {
            return Ok(UpdateEntryOutcome::NotFound);
        }

        // An entry deleted between HEXISTS and HSET is recreated here.
        let _: () = conn.hset(&self.hash_key, phone.as_str(), address).await?;

        Ok(UpdateEntryOutcome::Updated(address.to_string()))
    }

    async fn delete(&self, phone: &Phone) -> Result<DeleteEntryOutcome> {
        let mut conn = self.connection().await?;
        let removed: i64 = conn.hdel(&self.hash_key, phone.as_str()).await?;

        if removed == 0 {
            return Ok(DeleteEntryOutcome::NotFound);
        }

        Ok(DeleteEntryOutcome::Deleted)
    }

    async fn is_alive(&self) -> bool {
        match tokio::time::timeout(self.ping_timeout, self.ping()).await {
            Ok(Ok(())) => true,
            Ok(Err(error)) => {
                tracing::warn!("redis liveness check failed: {}", error);
                false
            }
            Err(_) => {
                tracing::warn!(
                    "redis liveness check timed out after {}ms",
                    self.ping_timeout.as_millis()
                );
                false
            }
        }
    }

    async fn close(&self) {
        if self.conn.write().await.take().is_some() {
            tracing::info!("Closed redis connection");
        }
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PhoneValidator;
    use ::redis::{Arg, Cmd, ErrorKind, Pipeline, RedisError, RedisFuture, Value};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    enum Reply {
        Value(Value),
        Error(ErrorKind),
        Hang,
    }

    /// Connection that checks each command against a script and answers
    /// with the scripted reply.
    #[derive(Clone, Default)]
    struct ScriptedConnection {
        script: Arc<Mutex<VecDeque<(Vec<String>, Reply)>>>,
    }

    impl ScriptedConnection {
        fn expect(self, command: &[&str], reply: Reply) -> Self {
            let args = command.iter().map(|arg| arg.to_string()).collect();
            self.script.lock().unwrap().push_back((args, reply));
            self
        }

        fn is_exhausted(&self) -> bool {
            self.script.lock().unwrap().is_empty()
        }
    }

    impl ConnectionLike for ScriptedConnection {
        fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
            let sent: Vec<String> = cmd
                .args_iter()
                .map(|arg| match arg {
                    Arg::Simple(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                    Arg::Cursor => "<cursor>".to_string(),
                })
                .collect();

            let (expected, reply) = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| panic!("unexpected command {:?}", sent));
            assert_eq!(sent, expected);

            Box::pin(async move {
                match reply {
                    Reply::Value(value) => Ok(value),
                    Reply::Error(kind) => Err(RedisError::from((kind, "scripted failure"))),
                    Reply::Hang => std::future::pending().await,
                }
            })
        }

        fn req_packed_commands<'a>(
            &'a mut self,
            _cmd: &'a Pipeline,
            _offset: usize,
            _count: usize,
        ) -> RedisFuture<'a, Vec<Value>> {
            panic!("pipelines are not used by the address book")
        }

        fn get_db(&self) -> i64 {
            0
        }
    }

    fn scripted_store(conn: ScriptedConnection) -> RedisAddressBook<ScriptedConnection> {
        RedisAddressBook::from_connection(conn, "phone", Duration::from_millis(50))
    }

    fn phone() -> Phone {
        PhoneValidator::default().validate("+79991234567").unwrap()
    }

    #[tokio::test]
    async fn test_create_uses_hsetnx() {
        let conn = ScriptedConnection::default()
            .expect(
                &["HSETNX", "phone", "+79991234567", "Moscow"],
                Reply::Value(Value::Int(1)),
            )
            .expect(
                &["HSETNX", "phone", "+79991234567", "Kazan"],
                Reply::Value(Value::Int(0)),
            );
        let store = scripted_store(conn.clone());

        assert_eq!(
            store.create(&phone(), "Moscow").await.unwrap(),
            CreateEntryOutcome::Created("Moscow".to_string())
        );
        assert_eq!(
            store.create(&phone(), "Kazan").await.unwrap(),
            CreateEntryOutcome::AlreadyExists
        );
        assert!(conn.is_exhausted());
    }

    #[tokio::test]
    async fn test_get_maps_nil_to_not_found() {
        let conn = ScriptedConnection::default()
            .expect(
                &["HGET", "phone", "+79991234567"],
                Reply::Value(Value::Data(b"Moscow".to_vec())),
            )
            .expect(&["HGET", "phone", "+79991234567"], Reply::Value(Value::Nil));
        let store = scripted_store(conn.clone());

        assert_eq!(
            store.get(&phone()).await.unwrap(),
            ReadEntryOutcome::Found("Moscow".to_string())
        );
        assert_eq!(store.get(&phone()).await.unwrap(), ReadEntryOutcome::NotFound);
        assert!(conn.is_exhausted());
    }

    #[tokio::test]
    async fn test_update_checks_existence_before_hset() {
        let conn = ScriptedConnection::default()
            .expect(
                &["HEXISTS", "phone", "+79991234567"],
                Reply::Value(Value::Int(1)),
            )
            .expect(
                &["HSET", "phone", "+79991234567", "Kazan"],
                Reply::Value(Value::Int(0)),
            )
            .expect(
                &["HEXISTS", "phone", "+79991234567"],
                Reply::Value(Value::Int(0)),
            );
        let store = scripted_store(conn.clone());

        assert_eq!(
            store.update(&phone(), "Kazan").await.unwrap(),
            UpdateEntryOutcome::Updated("Kazan".to_string())
        );
        // No HSET is sent for a missing entry.
        assert_eq!(
            store.update(&phone(), "Kazan").await.unwrap(),
            UpdateEntryOutcome::NotFound
        );
        assert!(conn.is_exhausted());
    }

    #[tokio::test]
    async fn test_delete_reads_hdel_count() {
        let conn = ScriptedConnection::default()
            .expect(
                &["HDEL", "phone", "+79991234567"],
                Reply::Value(Value::Int(1)),
            )
            .expect(
                &["HDEL", "phone", "+79991234567"],
                Reply::Value(Value::Int(0)),
            );
        let store = scripted_store(conn.clone());

        assert_eq!(
            store.delete(&phone()).await.unwrap(),
            DeleteEntryOutcome::Deleted
        );
        assert_eq!(
            store.delete(&phone()).await.unwrap(),
            DeleteEntryOutcome::NotFound
        );
        assert!(conn.is_exhausted());
    }

    #[tokio::test]
    async fn test_store_error_propagates() {
        let conn = ScriptedConnection::default().expect(
            &["HGET", "phone", "+79991234567"],
            Reply::Error(ErrorKind::IoError),
        );
        let store = scripted_store(conn);

        assert!(matches!(
            store.get(&phone()).await,
            Err(AddrBookError::Redis(_))
        ));
    }

    #[tokio::test]
    async fn test_is_alive_never_fails() {
        let conn = ScriptedConnection::default()
            .expect(&["PING"], Reply::Value(Value::Status("PONG".to_string())))
            .expect(&["PING"], Reply::Error(ErrorKind::IoError))
            .expect(&["PING"], Reply::Hang);
        let store = scripted_store(conn.clone());

        assert!(store.is_alive().await);
        assert!(!store.is_alive().await);
        // Bounded by the 50ms ping timeout.
        assert!(!store.is_alive().await);
        assert!(conn.is_exhausted());
    }

    #[tokio::test]
    async fn test_closed_store_is_unavailable() {
        let store = scripted_store(ScriptedConnection::default());

        store.close().await;
        store.close().await;

        assert!(!store.is_alive().await);
        assert!(matches!(
            store.get(&phone()).await,
            Err(AddrBookError::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_url() {
        let result =
            RedisAddressBook::connect("not a url", "phone", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(AddrBookError::Config(_))));
    }

    async fn connect_live_store(hash_key: &str) -> RedisAddressBook {
        let url = std::env::var("ADDRBOOK_TEST_REDIS_URL")
            .expect("ADDRBOOK_TEST_REDIS_URL must point at a disposable redis");
        let store = RedisAddressBook::connect(&url, hash_key, Duration::from_secs(1))
            .await
            .unwrap();

        let mut conn = store.connection().await.unwrap();
        let _: () = conn.del(hash_key).await.unwrap();
        store
    }

    #[tokio::test]
    #[ignore = "requires ADDRBOOK_TEST_REDIS_URL"]
    async fn test_live_redis_entry_lifecycle() {
        let store = connect_live_store("addrbook:test:lifecycle").await;
        let p = phone();

        assert!(store.is_alive().await);

        assert_eq!(
            store.create(&p, "Moscow").await.unwrap(),
            CreateEntryOutcome::Created("Moscow".to_string())
        );
        assert_eq!(
            store.create(&p, "Tver").await.unwrap(),
            CreateEntryOutcome::AlreadyExists
        );
        assert_eq!(
            store.update(&p, "Kazan").await.unwrap(),
            UpdateEntryOutcome::Updated("Kazan".to_string())
        );
        assert_eq!(
            store.get(&p).await.unwrap(),
            ReadEntryOutcome::Found("Kazan".to_string())
        );
        assert_eq!(store.delete(&p).await.unwrap(), DeleteEntryOutcome::Deleted);
        assert_eq!(store.delete(&p).await.unwrap(), DeleteEntryOutcome::NotFound);
        assert_eq!(
            store.update(&p, "Kazan").await.unwrap(),
            UpdateEntryOutcome::NotFound
        );
    }

    #[tokio::test]
    #[ignore = "requires ADDRBOOK_TEST_REDIS_URL"]
    async fn test_live_redis_closed_store_is_not_alive() {
        let store = connect_live_store("addrbook:test:close").await;

        store.close().await;

        assert!(!store.is_alive().await);
        assert!(matches!(
            store.get(&phone()).await,
            Err(AddrBookError::StoreUnavailable(_))
        ));
    }
}
