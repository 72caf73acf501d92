//! [`Compression`] is stored by name in backup metadata and configuration.

use crate::Compression;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;

impl Serialize for Compression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Compression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = Cow::<'de, str>::deserialize(deserializer)?;
        name.parse().map_err(|err: crate::error::Error| D::Error::custom(&*err))
    }
}

#[cfg(test)]
mod tests {
    use crate::Compression;

    #[test]
    fn test_stored_by_name() {
        assert_eq!(serde_json::to_string(&Compression::Gzip).unwrap(), r#""gzip""#);
        assert_eq!(serde_json::from_str::<Compression>(r#""bz2""#).unwrap(), Compression::Bzip2);
        assert!(serde_json::from_str::<Compression>(r#""lz4""#).is_err());
        assert!(serde_json::from_str::<Compression>("3").is_err());
    }
}
