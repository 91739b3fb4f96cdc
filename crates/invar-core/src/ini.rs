//! Minimal INI reader shared by the `groups` control file and
//! `.ini` / `.properties` variable files

use serde_json::Value as JsonValue;
use std::path::Path;

use crate::error::{CoreError, Result};
use crate::values::VarMap;

/// A parsed INI document, sections in file order
///
/// Entries before the first header live in a section with an empty name.
#[derive(Debug, Clone, Default)]
pub struct IniDocument {
    pub sections: Vec<IniSection>,
}

#[derive(Debug, Clone)]
pub struct IniSection {
    pub name: String,
    pub entries: Vec<IniEntry>,
}

/// One line of a section
///
/// Bare lines (`web01 ansible_host=10.0.0.1` or just `web`) have no value and
/// keep the remainder of the line in `rest`.
#[derive(Debug, Clone)]
pub struct IniEntry {
    pub key: String,
    pub value: Option<String>,
    pub rest: String,
    pub line: usize,
}

impl IniDocument {
    /// Parse INI text; `origin` is only used in error messages
    pub fn parse(content: &str, origin: &Path) -> Result<Self> {
        let mut doc = IniDocument {
            sections: vec![IniSection {
                name: String::new(),
                entries: Vec::new(),
            }],
        };

        for (idx, raw) in content.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(header) = line.strip_prefix('[') {
                let name = header.strip_suffix(']').ok_or_else(|| CoreError::IniSyntax {
                    path: origin.to_path_buf(),
                    line: line_no,
                    message: format!("unterminated section header '{}'", line),
                })?;
                let name = name.trim();
                if name.is_empty() {
                    return Err(CoreError::IniSyntax {
                        path: origin.to_path_buf(),
                        line: line_no,
                        message: "empty section name".to_string(),
                    });
                }
                doc.sections.push(IniSection {
                    name: name.to_string(),
                    entries: Vec::new(),
                });
                continue;
            }

            let entry = parse_entry(line, line_no).ok_or_else(|| CoreError::IniSyntax {
                path: origin.to_path_buf(),
                line: line_no,
                message: format!("missing key in '{}'", line),
            })?;

            if let Some(section) = doc.sections.last_mut() {
                section.entries.push(entry);
            }
        }

        Ok(doc)
    }

    /// Look up a section by name
    pub fn section(&self, name: &str) -> Option<&IniSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Named sections, skipping the implicit leading one
    pub fn named_sections(&self) -> impl Iterator<Item = &IniSection> {
        self.sections.iter().filter(|s| !s.name.is_empty())
    }

    /// Flatten into string variables keyed `section.key` (bare `key` outside sections)
    pub fn to_flat_map(&self) -> VarMap {
        let mut vars = VarMap::new();
        for section in &self.sections {
            for entry in &section.entries {
                let key = if section.name.is_empty() {
                    entry.key.clone()
                } else {
                    format!("{}.{}", section.name, entry.key)
                };
                let value = entry.value.clone().unwrap_or_else(|| entry.rest.clone());
                vars.insert(key, JsonValue::String(value));
            }
        }
        vars
    }
}

fn parse_entry(line: &str, line_no: usize) -> Option<IniEntry> {
    // `key = value` or `key: value`, unless the key part contains whitespace
    // (host lines like `web01 ansible_port=2222` are bare entries)
    let split = line
        .find(['=', ':'])
        .map(|pos| (&line[..pos], &line[pos + 1..]))
        .filter(|(key, _)| !key.trim().contains(char::is_whitespace));

    if let Some((key, value)) = split {
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        return Some(IniEntry {
            key: key.to_string(),
            value: Some(unquote(value.trim()).to_string()),
            rest: String::new(),
            line: line_no,
        });
    }

    let mut parts = line.splitn(2, char::is_whitespace);
    let key = parts.next()?.trim();
    if key.is_empty() {
        return None;
    }
    Some(IniEntry {
        key: key.to_string(),
        value: None,
        rest: parts.next().unwrap_or_default().trim().to_string(),
        line: line_no,
    })
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_children_sections() {
        let doc = IniDocument::parse(
            r#"
# environments
[prod:children]
web
db

[web]
web01 ansible_host=10.0.0.1
web02
"#,
            Path::new("groups"),
        )
        .unwrap();

        let children = doc.section("prod:children").unwrap();
        let names: Vec<_> = children.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(names, vec!["web", "db"]);

        let web = doc.section("web").unwrap();
        assert_eq!(web.entries[0].key, "web01");
        assert_eq!(web.entries[0].value, None);
        assert_eq!(web.entries[0].rest, "ansible_host=10.0.0.1");
        assert_eq!(doc.named_sections().count(), 2);
    }

    #[test]
    fn test_flatten_properties() {
        let doc = IniDocument::parse(
            "name = api\n[database]\nhost=db.local\nport: 5432\nuser = \"admin\"\n",
            Path::new("app.properties"),
        )
        .unwrap();
        let vars = doc.to_flat_map();

        assert_eq!(vars["name"], "api");
        assert_eq!(vars["database.host"], "db.local");
        assert_eq!(vars["database.port"], "5432");
        assert_eq!(vars["database.user"], "admin");
    }

    #[test]
    fn test_unterminated_header_is_an_error() {
        let err = IniDocument::parse("[prod:children\nweb\n", Path::new("groups")).unwrap_err();
        match err {
            CoreError::IniSyntax { line, .. } => assert_eq!(line, 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_key_is_an_error() {
        let err = IniDocument::parse("[web]\n=value\n", Path::new("groups")).unwrap_err();
        assert!(matches!(err, CoreError::IniSyntax { line: 2, .. }));
    }
}
