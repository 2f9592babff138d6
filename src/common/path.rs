// SPDX-License-Identifier: GPL-2.0-or-later

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A validated `/container/object[/with/slashes]` reference, the form every
/// manifest entry and every backend call uses.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize)]
pub struct ObjectPath {
    container: String,
    object: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseObjectPathError {
    #[error("path must start with '/'")]
    MissingLeadingSlash,

    #[error("path must contain a container and an object component")]
    MissingObjectComponent,

    #[error("container component is empty")]
    EmptyContainer,

    #[error("object component is empty")]
    EmptyObject,
}

impl ObjectPath {
    pub fn parse(s: &str) -> Result<Self, ParseObjectPathError> {
        use ParseObjectPathError::*;
        let rest = s.strip_prefix('/').ok_or(MissingLeadingSlash)?;
        let (container, object) = rest.split_once('/').ok_or(MissingObjectComponent)?;
        if container.is_empty() {
            return Err(EmptyContainer);
        }
        if object.is_empty() {
            return Err(EmptyObject);
        }
        Ok(Self {
            container: container.to_owned(),
            object: object.to_owned(),
        })
    }

    #[must_use]
    pub fn container(&self) -> &str {
        &self.container
    }

    #[must_use]
    pub fn object(&self) -> &str {
        &self.object
    }
}

impl<'de> Deserialize<'de> for ObjectPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.container, self.object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ok() {
        let p = ObjectPath::parse("/c/o").unwrap();
        assert_eq!("c", p.container());
        assert_eq!("o", p.object());
    }

    #[test]
    fn test_parse_nested_object() {
        let p = ObjectPath::parse("/c/a/b/c").unwrap();
        assert_eq!("c", p.container());
        assert_eq!("a/b/c", p.object());
    }

    #[test]
    fn test_parse_missing_leading_slash() {
        assert_eq!(
            Err(ParseObjectPathError::MissingLeadingSlash),
            ObjectPath::parse("c/o")
        );
    }

    #[test]
    fn test_parse_missing_object() {
        assert_eq!(
            Err(ParseObjectPathError::MissingObjectComponent),
            ObjectPath::parse("/c")
        );
    }

    #[test]
    fn test_display_round_trip() {
        let p = ObjectPath::parse("/c/o").unwrap();
        assert_eq!("/c/o", p.to_string());
    }
}
