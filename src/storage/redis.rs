//! Redis-backed store.

use super::{KvStore, StoreError};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    /// Open a client and check that the server answers.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let mut con = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut con).await?;
        Ok(Self::new(client))
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut con = self.connection().await?;
        Ok(con.get(key).await?)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let mut con = self.connection().await?;
        con.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut con = self.connection().await?;
        let deleted: i32 = con.del(key).await?;
        Ok(deleted > 0)
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut con = self.connection().await?;

        // Lua script for atomic GET + DEL
        let script = redis::Script::new(
            r"
            local val = redis.call('GET', KEYS[1])
            if val then
                redis.call('DEL', KEYS[1])
            end
            return val
            ",
        );

        Ok(script.key(key).invoke_async(&mut con).await?)
    }

    async fn incr_with_ttl(&self, key: &str, ttl_secs: u64) -> Result<u64, StoreError> {
        let mut con = self.connection().await?;
        let count: u64 = con.incr(key, 1).await?;

        // Set TTL on first request
        if count == 1 {
            con.expire::<_, ()>(key, ttl_secs as i64).await?;
        }

        Ok(count)
    }
}
