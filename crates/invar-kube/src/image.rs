//! Image references

use std::fmt;

/// Tag used when an image reference has none
pub const LATEST: &str = "latest";

/// An image split into name and tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub name: String,
    pub tag: String,
}

impl ImageRef {
    /// Split on the first `:`; no `:` means `latest`
    pub fn parse(image: &str) -> Self {
        match image.split_once(':') {
            Some((name, tag)) => Self {
                name: name.to_string(),
                tag: tag.to_string(),
            },
            None => Self {
                name: image.to_string(),
                tag: LATEST.to_string(),
            },
        }
    }

    pub fn is_latest(&self) -> bool {
        self.tag == LATEST
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

/// Container and service name derived from an image name
///
/// `registry.local/team/Web.App` becomes `webapp`.
pub fn derive_name(image_name: &str) -> String {
    image_name
        .rsplit('/')
        .next()
        .unwrap_or(image_name)
        .replace('.', "")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(
            ImageRef::parse("nginx"),
            ImageRef {
                name: "nginx".to_string(),
                tag: "latest".to_string()
            }
        );
        assert_eq!(
            ImageRef::parse("nginx:1.21"),
            ImageRef {
                name: "nginx".to_string(),
                tag: "1.21".to_string()
            }
        );
        let with_path = ImageRef::parse("team/api:2.0-rc1");
        assert_eq!(with_path.name, "team/api");
        assert_eq!(with_path.tag, "2.0-rc1");
        assert!(ImageRef::parse("redis").is_latest());
        assert_eq!(ImageRef::parse("redis").to_string(), "redis:latest");
    }

    #[test]
    fn test_derive_name() {
        assert_eq!(derive_name("nginx"), "nginx");
        assert_eq!(derive_name("registry.local/team/Web.App"), "webapp");
        assert_eq!(derive_name("library/node.js"), "nodejs");
    }

    #[test]
    fn test_derive_name_keeps_last_segment() {
        assert_eq!(derive_name("registry/team/app"), "app");
        assert_eq!(derive_name("registry:5000/team/app"), "app");
        assert_ne!(derive_name("registry/team/app"), "registryteamapp");
        assert_eq!(derive_name("registry/team/app"), derive_name("other/app"));
    }
}
