use crate::core::error::Result;
use crate::metadata::cache::MetadataCache;
use crate::metadata::model::MediaMetadata;
use crate::storage::index::FileRecord;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Modification times below this are not real timestamps (e.g. a year)
const MIN_EPOCH_SECS: f64 = 10_000_000.0;

/// Attribute a rule can test. Index fields come from the stored row,
/// the rest from the metadata cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Path,
    Kind,
    Size,
    Mtime,
    Rating,
    Tags,
    Title,
    Album,
    Artist,
    Genre,
    Year,
    Duration,
    Resolution,
    Bitrate,
    /// Anything else in a saved playlist; never matches
    #[serde(other)]
    Unknown,
}

impl Field {
    fn needs_metadata(self) -> bool {
        matches!(
            self,
            Field::Title
                | Field::Album
                | Field::Artist
                | Field::Genre
                | Field::Year
                | Field::Duration
                | Field::Resolution
                | Field::Bitrate
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "contains", alias = "icontains")]
    Contains,
    #[serde(rename = "not_contains")]
    NotContains,
    #[serde(rename = "startswith")]
    StartsWith,
    #[serde(rename = "endswith")]
    EndsWith,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "between")]
    Between,
    #[serde(rename = "regex")]
    Regex,
    #[serde(rename = "has_tag")]
    HasTag,
    #[serde(rename = "within_days")]
    WithinDays,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    #[default]
    All,
    Any,
}

/// Value of one field for one file
#[derive(Debug, Clone, PartialEq)]
enum FieldValue {
    Text(String),
    Number(f64),
    List(Vec<String>),
    Missing,
}

impl FieldValue {
    fn text(value: Option<&str>) -> Self {
        value.map_or(Self::Missing, |s| Self::Text(s.to_string()))
    }

    fn number(value: Option<f64>) -> Self {
        value.map_or(Self::Missing, Self::Number)
    }

    /// Numbers, and text that parses as one
    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Missing, Value::Null) => true,
            (Self::Number(n), _) => json_number(other).is_some_and(|o| *n == o),
            (Self::Text(s), Value::String(o)) => s == o,
            (Self::List(items), Value::Array(values)) => {
                items.len() == values.len()
                    && items
                        .iter()
                        .zip(values)
                        .all(|(item, value)| value.as_str() == Some(item.as_str()))
            }
            _ => false,
        }
    }
}

/// JSON numbers, and strings that parse as one
fn json_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// One `field op value` test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub field: Field,
    pub op: Op,
    #[serde(default)]
    pub value: Value,
}

impl Rule {
    pub fn new(field: Field, op: Op, value: Value) -> Self {
        Self { field, op, value }
    }

    fn matches(&self, file: &FileView<'_>, now: DateTime<Utc>) -> bool {
        if self.field == Field::Unknown {
            return false;
        }
        let left = file.value(self.field);
        let right = &self.value;

        match self.op {
            Op::Eq => left.equals(right),
            Op::Ne => !left.equals(right),
            Op::Gt | Op::Ge | Op::Lt | Op::Le => compare(&left, right)
                .is_some_and(|ordering| match self.op {
                    Op::Gt => ordering.is_gt(),
                    Op::Ge => ordering.is_ge(),
                    Op::Lt => ordering.is_lt(),
                    _ => ordering.is_le(),
                }),
            Op::Contains => text_pair(&left, right).is_some_and(|(a, b)| a.contains(&b)),
            Op::NotContains => text_pair(&left, right).is_some_and(|(a, b)| !a.contains(&b)),
            Op::StartsWith => text_pair(&left, right).is_some_and(|(a, b)| a.starts_with(&b)),
            Op::EndsWith => text_pair(&left, right).is_some_and(|(a, b)| a.ends_with(&b)),
            Op::In => right
                .as_array()
                .is_some_and(|options| options.iter().any(|option| left.equals(option))),
            Op::Between => {
                let bounds = right.as_array().filter(|b| b.len() == 2);
                match (left.as_number(), bounds) {
                    (Some(value), Some(bounds)) => {
                        match (json_number(&bounds[0]), json_number(&bounds[1])) {
                            (Some(low), Some(high)) => low <= value && value <= high,
                            _ => false,
                        }
                    }
                    _ => false,
                }
            }
            Op::Regex => match (left.as_text(), right.as_str()) {
                (Some(text), Some(pattern)) => Regex::new(pattern)
                    .map(|re| re.is_match(text))
                    .unwrap_or(false),
                _ => false,
            },
            Op::HasTag => match (&left, right.as_str()) {
                (FieldValue::List(tags), Some(wanted)) => {
                    tags.iter().any(|tag| tag.eq_ignore_ascii_case(wanted))
                }
                _ => false,
            },
            Op::WithinDays => {
                let days = right.as_f64().filter(|d| *d >= 0.0);
                let stamp = left.as_number().filter(|s| *s > MIN_EPOCH_SECS);
                match (days, stamp) {
                    (Some(days), Some(stamp)) => {
                        stamp >= now.timestamp() as f64 - days * 86_400.0
                    }
                    _ => false,
                }
            }
            Op::Unknown => false,
        }
    }
}

/// Numeric comparison when both sides are numbers, else text comparison
fn compare(left: &FieldValue, right: &Value) -> Option<std::cmp::Ordering> {
    if let (Some(a), Some(b)) = (left.as_number(), json_number(right)) {
        return a.partial_cmp(&b);
    }
    match (left.as_text(), right.as_str()) {
        (Some(a), Some(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Both sides lowercased, when both are text
fn text_pair(left: &FieldValue, right: &Value) -> Option<(String, String)> {
    Some((left.as_text()?.to_lowercase(), right.as_str()?.to_lowercase()))
}

/// Rules and nested groups combined with AND (`all`) or OR (`any`).
/// An empty group matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleGroup {
    #[serde(rename = "match")]
    pub match_mode: MatchMode,
    pub negate: bool,
    pub rules: Vec<Rule>,
    pub groups: Vec<RuleGroup>,
}

impl RuleGroup {
    fn needs_metadata(&self) -> bool {
        self.rules.iter().any(|r| r.field.needs_metadata())
            || self.groups.iter().any(RuleGroup::needs_metadata)
    }

    fn evaluate(&self, file: &FileView<'_>, now: DateTime<Utc>) -> bool {
        let mut results = self
            .rules
            .iter()
            .map(|rule| rule.matches(file, now))
            .chain(self.groups.iter().map(|group| group.evaluate(file, now)))
            .peekable();

        let result = if results.peek().is_none() {
            true
        } else {
            match self.match_mode {
                MatchMode::All => results.all(|r| r),
                MatchMode::Any => results.any(|r| r),
            }
        };
        result != self.negate
    }
}

/// Saved query over the library.
///
/// Older files store a flat `rules` list with a top-level `match`; newer ones
/// a nested `group`, which wins when both are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartPlaylist {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<Rule>,
    #[serde(default, rename = "match")]
    pub match_mode: MatchMode,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<RuleGroup>,
}

impl SmartPlaylist {
    pub fn new(name: impl Into<String>, group: RuleGroup) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
            match_mode: MatchMode::All,
            limit: None,
            description: None,
            group: Some(group),
        }
    }

    /// The rule tree to evaluate, building one from flat rules if needed
    pub fn root_group(&self) -> RuleGroup {
        self.group.clone().unwrap_or_else(|| RuleGroup {
            match_mode: self.match_mode,
            rules: self.rules.clone(),
            ..RuleGroup::default()
        })
    }

    /// Entries that satisfy the rules, in input order, capped at `limit`.
    /// Metadata is read only when a rule looks at a tag field.
    pub fn evaluate(
        &self,
        entries: Vec<(FileRecord, PathBuf)>,
        metadata: &MetadataCache,
        now: DateTime<Utc>,
    ) -> Vec<(FileRecord, PathBuf)> {
        let root = self.root_group();
        let with_metadata = root.needs_metadata();

        entries
            .into_iter()
            .filter(|(record, source_path)| {
                let path = record.absolute_path(source_path);
                let tags = with_metadata.then(|| metadata.get(&path));
                let view = FileView {
                    record,
                    path: &path,
                    metadata: tags.as_ref(),
                };
                root.evaluate(&view, now)
            })
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

/// One file as the rules see it
struct FileView<'a> {
    record: &'a FileRecord,
    path: &'a Path,
    metadata: Option<&'a MediaMetadata>,
}

impl FileView<'_> {
    fn value(&self, field: Field) -> FieldValue {
        let tags = self.metadata;
        match field {
            Field::Path => FieldValue::Text(self.path.to_string_lossy().into_owned()),
            Field::Kind => FieldValue::Text(self.record.kind.to_string()),
            Field::Size => FieldValue::Number(self.record.size as f64),
            Field::Mtime => FieldValue::Number(self.record.modified_time),
            Field::Rating => FieldValue::number(self.record.rating.map(f64::from)),
            Field::Tags => FieldValue::List(self.record.tags.clone()),
            Field::Title => FieldValue::text(tags.and_then(|m| m.title.as_deref())),
            Field::Album => FieldValue::text(tags.and_then(|m| m.album.as_deref())),
            Field::Artist => FieldValue::text(tags.and_then(|m| m.artist.as_deref())),
            Field::Genre => FieldValue::text(tags.and_then(|m| m.genre.as_deref())),
            Field::Resolution => FieldValue::text(tags.and_then(|m| m.resolution.as_deref())),
            Field::Year => FieldValue::number(tags.and_then(|m| m.year).map(f64::from)),
            Field::Duration => FieldValue::number(tags.and_then(|m| m.duration)),
            Field::Bitrate => FieldValue::number(tags.and_then(|m| m.bitrate).map(f64::from)),
            Field::Unknown => FieldValue::Missing,
        }
    }
}

/// Saved playlists; a missing or unreadable file is an empty list and
/// undecodable entries are skipped
pub fn load_smart_playlists(path: &Path) -> Vec<SmartPlaylist> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Smart playlists unreadable");
            return Vec::new();
        }
    };
    let raw: Vec<Value> = match serde_json::from_str(&text) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Smart playlists corrupt");
            return Vec::new();
        }
    };
    raw.into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(playlist) => Some(playlist),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping undecodable smart playlist");
                None
            }
        })
        .collect()
}

/// Write every playlist through a temp file and a rename
pub fn save_smart_playlists(path: &Path, playlists: &[SmartPlaylist]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(playlists)?;
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    tracing::debug!(path = %path.display(), count = playlists.len(), "Saved smart playlists");
    Ok(())
}
