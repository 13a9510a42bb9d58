use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use super::keys::{tag_index_key, tag_pin_key};
use super::{apply_ttl_jitter, Cache};
use crate::error::CacheError;

/// Redis-backed cache. Tags are redis sets of member keys whose expiry is
/// raised to cover every key added to them. A key written without expiry
/// pins its tag sets until they are invalidated.
#[derive(Clone)]
pub struct RedisCache {
    connection: MultiplexedConnection,
}

impl RedisCache {
    pub fn new(connection: MultiplexedConnection) -> Self {
        Self { connection }
    }

    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        let connection = client.get_multiplexed_tokio_connection().await?;
        Ok(Self::new(connection))
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection.clone();
        let payload: Option<String> = conn.get(key).await?;
        Ok(payload)
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
        tags: &[String],
    ) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let ttl_secs = (!ttl.is_zero()).then(|| apply_ttl_jitter(ttl).as_secs().max(1));

        let mut pipe = redis::pipe();
        pipe.atomic();
        match ttl_secs {
            Some(secs) => pipe.set_ex(key, value, secs).ignore(),
            None => pipe.set(key, value).ignore(),
        };
        for tag in tags {
            pipe.sadd(tag_index_key(tag), key).ignore();
        }
        pipe.query_async::<()>(&mut conn).await?;

        for tag in tags {
            let index = tag_index_key(tag);
            match ttl_secs {
                Some(secs) => {
                    let (remaining, pinned): (i64, bool) = redis::pipe()
                        .ttl(&index)
                        .exists(tag_pin_key(tag))
                        .query_async(&mut conn)
                        .await?;
                    // a fresh index reports -1 and needs its first expiry here
                    if !pinned && remaining < secs as i64 {
                        let _: bool = conn.expire(&index, secs as i64).await?;
                    }
                }
                None => {
                    redis::pipe()
                        .persist(&index)
                        .ignore()
                        .set(tag_pin_key(tag), 1)
                        .ignore()
                        .query_async::<()>(&mut conn)
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn invalidate_by_tags(&self, tags: &[String]) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        for tag in tags {
            let index = tag_index_key(tag);
            let members: Vec<String> = conn.smembers(&index).await?;
            if !members.is_empty() {
                let _: i64 = conn.del(&members).await?;
            }
            let bookkeeping = vec![index, tag_pin_key(tag)];
            let _: i64 = conn.del(&bookkeeping).await?;
        }
        Ok(())
    }
}
