use crate::error::BoxError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;

type EncodeFn<V> = dyn Fn(&V) -> Result<String, BoxError> + Send + Sync;
type DecodeFn<V> = dyn Fn(&str) -> Result<V, BoxError> + Send + Sync;

/// Converts values to and from the text stored in the `value` column.
///
/// Both functions must be pure and inverse to each other: recovery rebuilds
/// state by decoding what a flush encoded.
///
/// # Examples
///
/// ```
/// use foldkv::Codec;
///
/// let codec = Codec::new(
///     |n: &u32| Ok(n.to_string()),
///     |s: &str| Ok(s.parse::<u32>()?),
/// );
/// assert_eq!(codec.encode(&7).unwrap(), "7");
/// assert_eq!(codec.decode("7").unwrap(), 7);
/// assert!(codec.decode("seven").is_err());
/// ```
pub struct Codec<V> {
    encode: Arc<EncodeFn<V>>,
    decode: Arc<DecodeFn<V>>,
}

impl<V> Clone for Codec<V> {
    fn clone(&self) -> Self {
        Codec {
            encode: Arc::clone(&self.encode),
            decode: Arc::clone(&self.decode),
        }
    }
}

impl<V> fmt::Debug for Codec<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec").finish_non_exhaustive()
    }
}

impl<V> Codec<V> {
    /// Build a codec from an encode/decode pair.
    pub fn new<E, D>(encode: E, decode: D) -> Self
    where
        E: Fn(&V) -> Result<String, BoxError> + Send + Sync + 'static,
        D: Fn(&str) -> Result<V, BoxError> + Send + Sync + 'static,
    {
        Codec {
            encode: Arc::new(encode),
            decode: Arc::new(decode),
        }
    }

    /// Encode a value for storage.
    pub fn encode(&self, value: &V) -> Result<String, BoxError> {
        (self.encode)(value)
    }

    /// Decode a stored value.
    pub fn decode(&self, text: &str) -> Result<V, BoxError> {
        (self.decode)(text)
    }
}

impl<V> Codec<V>
where
    V: Serialize + DeserializeOwned + 'static,
{
    /// A codec storing values as compact JSON.
    ///
    /// ```
    /// use foldkv::Codec;
    ///
    /// let codec: Codec<Vec<u8>> = Codec::json();
    /// assert_eq!(codec.encode(&vec![1, 2]).unwrap(), "[1,2]");
    /// assert_eq!(codec.decode("[3]").unwrap(), vec![3]);
    /// ```
    pub fn json() -> Self {
        Codec::new(
            |value: &V| Ok(serde_json::to_string(value)?),
            |text: &str| Ok(serde_json::from_str(text)?),
        )
    }
}

impl Codec<String> {
    /// A codec that stores strings as-is.
    pub fn identity() -> Self {
        Codec::new(|value: &String| Ok(value.clone()), |text: &str| Ok(text.to_string()))
    }
}
