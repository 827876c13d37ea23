//! Partner records and the fields that can be requested for them.

use std::{collections::BTreeMap, collections::BTreeSet, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Substituted for a partner name that could not be read.
pub const NO_NAME: &str = "No Name";
/// Substituted for any requested attribute that could not be read.
pub const NOT_AVAILABLE: &str = "N/A";

/// Attributes a caller may ask the detail extractor to fill in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Tagline,
    Description,
    Expertise,
    Industries,
    Services,
    ExtendedDescription,
    Countries,
}

impl Field {
    pub const ALL: [Field; 7] = [
        Field::Tagline,
        Field::Description,
        Field::Expertise,
        Field::Industries,
        Field::Services,
        Field::ExtendedDescription,
        Field::Countries,
    ];

    /// Attribute name used in records and on disk.
    pub fn key(&self) -> &'static str {
        match self {
            Field::Tagline => "tagline",
            Field::Description => "description",
            Field::Expertise => "expertise",
            Field::Industries => "industries",
            Field::Services => "services",
            Field::ExtendedDescription => "extendedDescription",
            Field::Countries => "countries",
        }
    }

    pub fn sentinel(&self) -> AttributeValue {
        AttributeValue::Text(NOT_AVAILABLE.to_string())
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownField(pub String);

impl fmt::Display for UnknownField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown field '{}'", self.0)
    }
}

impl std::error::Error for UnknownField {}

impl FromStr for Field {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|field| field.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownField(s.to_string()))
    }
}

pub type FieldSet = BTreeSet<Field>;

/// Value of one scraped attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Text(String),
    List(Vec<String>),
    Object(BTreeMap<String, AttributeValue>),
}

impl AttributeValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.as_text() == Some(NOT_AVAILABLE)
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(value: Vec<String>) -> Self {
        AttributeValue::List(value)
    }
}

/// One filter section a partner was found under, with every filter value
/// that surfaced it. Filters never repeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoundIn {
    pub section: String,
    pub filters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerRecord {
    pub name: String,
    /// Canonical detail link; the aggregation key.
    pub link: String,
    #[serde(default)]
    pub found_in: Vec<FoundIn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scraped_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl PartnerRecord {
    pub fn new<L: Into<String>, N: Into<String>>(link: L, name: N) -> Self {
        let name = name.into();
        let name = if name.trim().is_empty() {
            NO_NAME.to_string()
        } else {
            name.trim().to_string()
        };
        Self {
            name,
            link: link.into(),
            found_in: Vec::new(),
            scraped_at: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.link
    }

    pub fn with_attribute<V: Into<AttributeValue>>(mut self, field: Field, value: V) -> Self {
        self.attributes.insert(field.key().to_string(), value.into());
        self
    }

    pub fn attribute(&self, field: Field) -> Option<&AttributeValue> {
        self.attributes.get(field.key())
    }

    /// Records that this partner was found under `filter` in `section`.
    /// Returns `false` when the tag was already present.
    pub fn add_tag(&mut self, section: &str, filter: &str) -> bool {
        match self.found_in.iter_mut().find(|entry| entry.section == section) {
            Some(entry) => {
                if entry.filters.iter().any(|existing| existing == filter) {
                    false
                } else {
                    entry.filters.push(filter.to_string());
                    true
                }
            }
            None => {
                self.found_in.push(FoundIn {
                    section: section.to_string(),
                    filters: vec![filter.to_string()],
                });
                true
            }
        }
    }

    pub fn filters_in(&self, section: &str) -> Option<&[String]> {
        self.found_in
            .iter()
            .find(|entry| entry.section == section)
            .map(|entry| entry.filters.as_slice())
    }
}

/// Canonical form of a partner link: fragment dropped, trailing slash trimmed.
pub fn canonical_key(link: &str) -> String {
    let link = link.trim();
    match url::Url::parse(link) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            let canonical = parsed.to_string();
            match canonical.strip_suffix('/') {
                Some(stripped) if parsed.path() != "/" => stripped.to_string(),
                _ => canonical,
            }
        }
        Err(_) => link.trim_end_matches('/').to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_tag_accumulates_without_duplicates() {
        let mut record = PartnerRecord::new("https://x/p1", "Acme");
        assert!(record.add_tag("Salesforce Expertise", "Commerce"));
        assert!(record.add_tag("Salesforce Expertise", "Service"));
        assert!(!record.add_tag("Salesforce Expertise", "Commerce"));
        assert!(record.add_tag("Industry Expertise", "Retail"));

        assert_eq!(
            record.filters_in("Salesforce Expertise"),
            Some(&["Commerce".to_string(), "Service".to_string()][..])
        );
        assert_eq!(record.found_in.len(), 2);
    }

    #[test]
    fn blank_name_becomes_sentinel() {
        let record = PartnerRecord::new("https://x/p1", "   ");
        assert_eq!(record.name, NO_NAME);
    }

    #[test]
    fn serializes_with_flattened_attributes() {
        let mut record = PartnerRecord::new("https://x/p1", "Acme")
            .with_attribute(Field::Tagline, "We build things")
            .with_attribute(Field::Countries, vec!["SE".to_string(), "NO".to_string()]);
        record.add_tag("Salesforce Expertise", "Commerce");

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["name"], "Acme");
        assert_eq!(json["link"], "https://x/p1");
        assert_eq!(json["tagline"], "We build things");
        assert_eq!(json["countries"][1], "NO");
        assert_eq!(json["foundIn"][0]["section"], "Salesforce Expertise");
        assert_eq!(json["foundIn"][0]["filters"][0], "Commerce");
        assert!(json.get("scrapedAt").is_none());

        let back: PartnerRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn field_names_parse_case_insensitively() {
        assert_eq!("extendedDescription".parse::<Field>(), Ok(Field::ExtendedDescription));
        assert_eq!(" TAGLINE ".parse::<Field>(), Ok(Field::Tagline));
        assert!("logo".parse::<Field>().is_err());
    }

    #[test]
    fn canonical_key_drops_fragment_and_trailing_slash() {
        assert_eq!(canonical_key("https://x/p1/#about"), "https://x/p1");
        assert_eq!(canonical_key("https://x/p1"), "https://x/p1");
        assert_eq!(canonical_key("https://x/"), "https://x/");
        assert_eq!(canonical_key("partner-42/"), "partner-42");
    }
}
