//! Query Encoder
//!
//! Turns lookup argument structs into an ordered query parameter multimap.
//! Pairs are emitted in the order fields are encoded, which for every
//! [`ToQuery`] impl in this crate is field declaration order. Nothing is
//! sorted afterwards.

use super::reference::Reference;
use crate::api::error::ApiError;
use std::fmt::Display;

/// Value emitted as `key[]=` for an explicitly empty list.
///
/// The API reads it as "clear all values", which is different from leaving
/// the field out.
pub const CLEAR_SENTINEL: &str = "";

/// Ordered query parameter multimap. Keys may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pair, keeping any existing pairs for the same key
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// Replace every pair for `key` with a single pair
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.pairs.retain(|(k, _)| *k != key);
        self.pairs.push((key, value.into()));
    }

    pub fn extend(&mut self, other: QueryParams) {
        self.pairs.extend(other.pairs);
    }

    /// First value for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All values for `key`, in insertion order
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// `application/x-www-form-urlencoded` query string, without the `?`
    pub fn encode(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish()
    }
}

impl IntoIterator for QueryParams {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.into_iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Something that can be encoded into query parameters
pub trait ToQuery {
    fn encode_query(&self, query: &mut QueryEncoder) -> Result<(), ApiError>;
}

impl ToQuery for Reference {
    fn encode_query(&self, query: &mut QueryEncoder) -> Result<(), ApiError> {
        query.reference(self)?;
        Ok(())
    }
}

impl<T: ToQuery> ToQuery for Option<T> {
    fn encode_query(&self, query: &mut QueryEncoder) -> Result<(), ApiError> {
        match self {
            Some(inner) => inner.encode_query(query),
            None => Ok(()),
        }
    }
}

impl<T: ToQuery + ?Sized> ToQuery for &T {
    fn encode_query(&self, query: &mut QueryEncoder) -> Result<(), ApiError> {
        (**self).encode_query(query)
    }
}

/// Accumulates pairs for one [`ToQuery`] value
#[derive(Debug, Default)]
pub struct QueryEncoder {
    params: QueryParams,
}

impl QueryEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always-present scalar field
    pub fn field(&mut self, key: &str, value: impl Display) -> &mut Self {
        self.params.push(key, value.to_string());
        self
    }

    /// Scalar field, skipped when unset
    pub fn optional<V: Display>(&mut self, key: &str, value: Option<V>) -> &mut Self {
        if let Some(value) = value {
            self.params.push(key, value.to_string());
        }
        self
    }

    /// Splice in the reference's single query pair
    pub fn reference(&mut self, reference: impl AsRef<Reference>) -> Result<&mut Self, ApiError> {
        let (key, value) = reference.as_ref().query_field()?;
        self.params.push(key, value);
        Ok(self)
    }

    /// Reference field, skipped when unset
    pub fn optional_reference<R: AsRef<Reference>>(
        &mut self,
        reference: Option<R>,
    ) -> Result<&mut Self, ApiError> {
        match reference {
            Some(reference) => self.reference(reference),
            None => Ok(self),
        }
    }

    /// List field.
    ///
    /// `None` emits nothing. `Some(&[])` emits the clear sentinel
    /// `key[]=`. Otherwise one `key[]=value` pair per element, in order.
    pub fn list<V: Display>(&mut self, key: &str, values: Option<&[V]>) -> &mut Self {
        let Some(values) = values else {
            return self;
        };

        let key = format!("{}[]", key);
        if values.is_empty() {
            self.params.push(key, CLEAR_SENTINEL);
        } else {
            for value in values {
                self.params.push(key.clone(), value.to_string());
            }
        }
        self
    }

    /// Encode another value's fields in place
    pub fn nested<T: ToQuery + ?Sized>(&mut self, value: &T) -> Result<&mut Self, ApiError> {
        value.encode_query(self)?;
        Ok(self)
    }

    pub fn finish(self) -> QueryParams {
        self.params
    }
}

/// Encode one argument value
pub fn encode<T: ToQuery + ?Sized>(args: &T) -> Result<QueryParams, ApiError> {
    let mut encoder = QueryEncoder::new();
    args.encode_query(&mut encoder)?;
    Ok(encoder.finish())
}

/// Encode several argument values, concatenated in the order given
pub fn encode_all(args: &[&dyn ToQuery]) -> Result<QueryParams, ApiError> {
    let mut encoder = QueryEncoder::new();
    for arg in args {
        arg.encode_query(&mut encoder)?;
    }
    Ok(encoder.finish())
}
