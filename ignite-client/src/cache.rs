//! Typed cache handle.

use std::marker::PhantomData;
use std::sync::Arc;

use ignite_core::protocol::{cache_body_writer, cache_id, OpCode, Response};
use ignite_core::serialization::{decode, write_value, BinaryValue, BinaryWriter, FromBinary, ToBinary};
use ignite_core::{IgniteError, Result};

use crate::connection::ConnectionManager;

/// Default number of entries requested by [`Cache::scan`].
pub const DEFAULT_SCAN_PAGE_SIZE: i32 = 1024;

/// A handle to a named server-side cache.
///
/// Creating a handle costs no round trip; operations on a cache that does not
/// exist fail with a server error.
#[derive(Debug)]
pub struct Cache<K, V> {
    name: String,
    cache_id: i32,
    connection_manager: Arc<ConnectionManager>,
    _phantom: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            cache_id: self.cache_id,
            connection_manager: Arc::clone(&self.connection_manager),
            _phantom: PhantomData,
        }
    }
}

impl<K, V> Cache<K, V> {
    pub(crate) fn new(name: String, connection_manager: Arc<ConnectionManager>) -> Self {
        Self {
            cache_id: cache_id(&name),
            name,
            connection_manager,
            _phantom: PhantomData,
        }
    }

    /// Returns the cache name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the id the server addresses this cache by.
    pub fn cache_id(&self) -> i32 {
        self.cache_id
    }
}

impl<K, V> Cache<K, V>
where
    K: ToBinary + FromBinary,
    V: ToBinary + FromBinary,
{
    /// Retrieves the value for `key`, or `None` if absent.
    pub async fn get(&self, key: &K) -> Result<Option<V>> {
        let body = self.body_with(&[key.to_binary()])?;
        let response = self.invoke(OpCode::CacheGet, body).await?;
        decode_nullable(&response)
    }

    /// Associates `value` with `key`.
    pub async fn put(&self, key: &K, value: &V) -> Result<()> {
        let body = self.body_with(&[key.to_binary(), value.to_binary()])?;
        self.invoke(OpCode::CachePut, body).await.map(|_| ())
    }

    /// Stores `value` only if `key` is absent. Returns `true` if stored.
    pub async fn put_if_absent(&self, key: &K, value: &V) -> Result<bool> {
        let body = self.body_with(&[key.to_binary(), value.to_binary()])?;
        let response = self.invoke(OpCode::CachePutIfAbsent, body).await?;
        decode_bool(&response)
    }

    /// Stores `value` and returns the previous value.
    pub async fn get_and_put(&self, key: &K, value: &V) -> Result<Option<V>> {
        let body = self.body_with(&[key.to_binary(), value.to_binary()])?;
        let response = self.invoke(OpCode::CacheGetAndPut, body).await?;
        decode_nullable(&response)
    }

    /// Removes `key` and returns its value.
    pub async fn get_and_remove(&self, key: &K) -> Result<Option<V>> {
        let body = self.body_with(&[key.to_binary()])?;
        let response = self.invoke(OpCode::CacheGetAndRemove, body).await?;
        decode_nullable(&response)
    }

    /// Replaces the value of an existing key. Returns `false` if the key is absent.
    pub async fn replace(&self, key: &K, value: &V) -> Result<bool> {
        let body = self.body_with(&[key.to_binary(), value.to_binary()])?;
        let response = self.invoke(OpCode::CacheReplace, body).await?;
        decode_bool(&response)
    }

    /// Returns `true` if the cache holds `key`.
    pub async fn contains_key(&self, key: &K) -> Result<bool> {
        let body = self.body_with(&[key.to_binary()])?;
        let response = self.invoke(OpCode::CacheContainsKey, body).await?;
        decode_bool(&response)
    }

    /// Removes `key`. Returns `true` if it was present.
    pub async fn remove(&self, key: &K) -> Result<bool> {
        let body = self.body_with(&[key.to_binary()])?;
        let response = self.invoke(OpCode::CacheRemoveKey, body).await?;
        decode_bool(&response)
    }

    /// Retrieves the values of several keys. Absent keys are omitted.
    pub async fn get_all(&self, keys: &[K]) -> Result<Vec<(K, V)>> {
        let keys = BinaryValue::Collection(keys.iter().map(ToBinary::to_binary).collect());
        let body = self.body_with(&[keys])?;
        let response = self.invoke(OpCode::CacheGetAll, body).await?;
        decode_entries(&response)
    }

    /// Stores several entries.
    pub async fn put_all(&self, entries: &[(K, V)]) -> Result<()> {
        let map = BinaryValue::Map(
            entries
                .iter()
                .map(|(k, v)| (k.to_binary(), v.to_binary()))
                .collect(),
        );
        let body = self.body_with(&[map])?;
        self.invoke(OpCode::CachePutAll, body).await.map(|_| ())
    }

    /// Returns the number of entries.
    pub async fn size(&self) -> Result<i64> {
        let body = self.body_with(&[])?;
        let response = self.invoke(OpCode::CacheGetSize, body).await?;
        decode_required(&response)
    }

    /// Removes every entry.
    pub async fn clear(&self) -> Result<()> {
        let body = self.body_with(&[])?;
        self.invoke(OpCode::CacheClear, body).await.map(|_| ())
    }

    /// Returns one page of entries, at most [`DEFAULT_SCAN_PAGE_SIZE`].
    pub async fn scan(&self) -> Result<Vec<(K, V)>> {
        self.scan_with_page_size(DEFAULT_SCAN_PAGE_SIZE).await
    }

    /// Returns one page of at most `page_size` entries.
    pub async fn scan_with_page_size(&self, page_size: i32) -> Result<Vec<(K, V)>> {
        if page_size <= 0 {
            return Err(IgniteError::Configuration(format!(
                "scan page size must be positive, got {}",
                page_size
            )));
        }
        let mut writer = cache_body_writer(self.cache_id);
        writer.write_i32(page_size);
        let response = self.invoke(OpCode::QueryScan, writer).await?;
        decode_entries(&response)
    }

    fn body_with(&self, values: &[BinaryValue]) -> Result<BinaryWriter> {
        let mut writer = cache_body_writer(self.cache_id);
        for value in values {
            write_value(&mut writer, value)?;
        }
        Ok(writer)
    }

    async fn invoke(&self, opcode: OpCode, body: BinaryWriter) -> Result<Response> {
        tracing::trace!(cache = %self.name, opcode = %opcode, "cache operation");
        self.connection_manager.invoke(opcode, body.as_bytes()).await
    }
}

/// Decodes the single value carried by a successful response.
///
/// Only operations that answer with a value call this; an empty body or
/// bytes after the value are protocol violations.
pub(crate) fn decode_body(response: &Response) -> Result<BinaryValue> {
    if response.body.is_empty() {
        return Err(IgniteError::Protocol(format!(
            "response {} has an empty body where a value was expected",
            response.request_id
        )));
    }
    let (value, consumed) = decode(&response.body)?;
    if consumed != response.body.len() {
        return Err(IgniteError::Protocol(format!(
            "response {} has {} trailing bytes after its value",
            response.request_id,
            response.body.len() - consumed
        )));
    }
    Ok(value)
}

fn decode_nullable<T: FromBinary>(response: &Response) -> Result<Option<T>> {
    Ok(Option::<T>::from_binary(decode_body(response)?)?)
}

fn decode_required<T: FromBinary>(response: &Response) -> Result<T> {
    match decode_body(response)? {
        BinaryValue::Null => Err(IgniteError::Protocol(format!(
            "request {} returned no value",
            response.request_id
        ))),
        value => Ok(T::from_binary(value)?),
    }
}

fn decode_bool(response: &Response) -> Result<bool> {
    decode_required(response)
}

fn decode_entries<K: FromBinary, V: FromBinary>(response: &Response) -> Result<Vec<(K, V)>> {
    match decode_body(response)? {
        BinaryValue::Map(pairs) => pairs
            .into_iter()
            .map(|(k, v)| Ok((K::from_binary(k)?, V::from_binary(v)?)))
            .collect(),
        BinaryValue::Null => Ok(Vec::new()),
        other => Err(IgniteError::Protocol(format!(
            "expected a map of entries, got {}",
            other.type_name()
        ))),
    }
}
