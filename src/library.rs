use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// One downloaded company library, exactly as persisted in the store file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompanyEntry {
    pub company_code: String,
    pub description: String,
    pub source_url: String,
    /// When the library was downloaded (epoch millis).
    pub local_timestamp: Option<i64>,
    /// Last-Modified reported by the source on the most recent check.
    pub remote_timestamp: Option<i64>,
    /// Last-Modified reported by the source when the library was downloaded.
    pub local_remote_timestamp: Option<i64>,
    #[serde(deserialize_with = "null_as_default")]
    pub field_groups: Vec<FieldGroup>,
    #[serde(deserialize_with = "null_as_default")]
    pub programs: Vec<Program>,
    #[serde(deserialize_with = "null_as_default")]
    pub classes: Vec<ClassDef>,
    #[serde(deserialize_with = "null_as_default")]
    pub static_methods: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FieldGroup {
    pub group_name: String,
    /// Raw `name:type:description` rows.
    #[serde(deserialize_with = "null_as_default")]
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Program {
    pub name: String,
    pub title: String,
    /// Raw comma-joined argument lists, one per overload.
    #[serde(deserialize_with = "null_as_default")]
    pub arg_options: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClassDef {
    pub class_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub constructors: Vec<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl CompanyEntry {
    pub fn local_time(&self) -> String {
        format_timestamp(self.local_timestamp)
    }

    pub fn remote_time(&self) -> String {
        format_timestamp(self.remote_timestamp)
    }

    /// True when the source reports a newer Last-Modified than the one we
    /// downloaded.
    pub fn has_update(&self) -> bool {
        match (self.remote_timestamp, self.local_remote_timestamp) {
            (Some(remote), Some(local_remote)) => remote > local_remote,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

/// Render epoch millis as `MM/DD/YYYY HH:MM GMT+0`, or `Unknown`.
pub fn format_timestamp(ms: Option<i64>) -> String {
    ms.and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|dt| dt.format("%m/%d/%Y %H:%M GMT+0").to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

// ---------------------------------------------------------------------------
// Field specs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// `U`: unsigned, rendered with a `%` sigil.
    Unsigned,
    /// `I`: integer.
    Integer,
    /// `C`: character data.
    String,
    /// `O`: object, read back as a string.
    Object,
    Numeric,
}

impl FieldKind {
    pub fn from_type_code(code: &str) -> Self {
        match code.chars().next().map(|c| c.to_ascii_uppercase()) {
            Some('U') => FieldKind::Unsigned,
            Some('I') => FieldKind::Integer,
            Some('C') => FieldKind::String,
            Some('O') => FieldKind::Object,
            _ => FieldKind::Numeric,
        }
    }

    pub fn is_string(self) -> bool {
        matches!(self, FieldKind::String | FieldKind::Object)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldSpecError {
    #[error("expected `name:type:description`")]
    MissingParts,
    #[error("field name is empty")]
    EmptyName,
    #[error("field type is empty")]
    EmptyType,
}

/// A parsed `name:type:description` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Name without sigil or array suffix, as stored.
    pub base: String,
    /// Contents of a trailing `[N]`, kept verbatim.
    pub array_bound: Option<String>,
    pub type_code: String,
    pub kind: FieldKind,
    pub description: String,
}

impl FieldSpec {
    pub fn parse(raw: &str) -> Result<Self, FieldSpecError> {
        let mut parts = raw.splitn(3, ':');
        let (Some(name), Some(type_code), Some(description)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(FieldSpecError::MissingParts);
        };

        let name = name.trim();
        let type_code = type_code.trim();
        if type_code.is_empty() {
            return Err(FieldSpecError::EmptyType);
        }

        let (name, array_bound) = match (name.rfind('['), name.ends_with(']')) {
            (Some(open), true) => (
                &name[..open],
                Some(name[open + 1..name.len() - 1].to_string()),
            ),
            _ => (name, None),
        };
        let base = name.trim_end_matches(['$', '%']);
        if base.is_empty() {
            return Err(FieldSpecError::EmptyName);
        }

        Ok(FieldSpec {
            base: base.to_string(),
            array_bound,
            type_code: type_code.to_string(),
            kind: FieldKind::from_type_code(type_code),
            description: description.trim().to_string(),
        })
    }

    pub fn cased_base(&self, upper: bool) -> String {
        if upper {
            self.base.to_uppercase()
        } else {
            self.base.to_lowercase()
        }
    }

    fn sigil(&self) -> &'static str {
        match self.kind {
            FieldKind::Unsigned => "%",
            FieldKind::String => "$",
            _ => "",
        }
    }

    /// The identifier as it appears after `group.`, e.g. `amt%` or `name$[3]`.
    pub fn render(&self, upper: bool) -> String {
        let mut label = self.cased_base(upper);
        label.push_str(self.sigil());
        if let Some(bound) = &self.array_bound {
            label.push('[');
            label.push_str(bound);
            label.push(']');
        }
        label
    }

    pub fn detail(&self) -> String {
        format!("{} {}", self.description, self.type_code)
    }

    pub fn getter_name(&self) -> &'static str {
        if self.kind.is_string() {
            "getFieldAsString"
        } else {
            "getFieldAsNumber"
        }
    }

    pub fn value_placeholder(&self) -> &'static str {
        match self.kind {
            FieldKind::String | FieldKind::Object => "value$",
            FieldKind::Unsigned | FieldKind::Integer => "value%",
            FieldKind::Numeric => "value",
        }
    }
}

// ---------------------------------------------------------------------------
// Program argument options
// ---------------------------------------------------------------------------

/// One call-signature overload of a program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgOption {
    /// A leading `::label` token, appended to the program name on insertion.
    pub label: Option<String>,
    pub args: Vec<String>,
}

impl ArgOption {
    pub fn parse(raw: &str) -> Self {
        let mut tokens: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        let label = match tokens.first() {
            Some(first) if first.trim_start_matches('"').starts_with("::") => {
                let token = tokens.remove(0);
                Some(
                    token
                        .trim_start_matches('"')
                        .trim_end_matches('"')
                        .to_string(),
                )
            }
            _ => None,
        };

        ArgOption {
            label,
            args: tokens,
        }
    }

    /// Arguments joined the way they are inserted and displayed.
    pub fn normalized(&self) -> String {
        self.args.join(", ")
    }

    /// The quoted program name, with the label folded in.
    pub fn quoted_name(&self, program: &str) -> String {
        format!("\"{program}{}\"", self.label.as_deref().unwrap_or(""))
    }

    /// Text inserted after the `call ` keyword.
    pub fn call_text(&self, program: &str) -> String {
        let mut text = self.quoted_name(program);
        if !self.args.is_empty() {
            text.push_str(", ");
            text.push_str(&self.normalized());
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_unsigned_field() {
        let spec = FieldSpec::parse("AMT%:U:Amount").unwrap();
        assert_eq!(spec.base, "AMT");
        assert_eq!(spec.kind, FieldKind::Unsigned);
        assert_eq!(spec.render(false), "amt%");
        assert_eq!(spec.render(true), "AMT%");
        assert_eq!(spec.detail(), "Amount U");
    }

    #[test]
    fn parse_string_array_field() {
        let spec = FieldSpec::parse("NAME$[3]:C(30):Customer name").unwrap();
        assert_eq!(spec.base, "NAME");
        assert_eq!(spec.array_bound.as_deref(), Some("3"));
        assert_eq!(spec.kind, FieldKind::String);
        assert_eq!(spec.render(false), "name$[3]");
    }

    #[test]
    fn parse_numeric_field_has_no_sigil() {
        let spec = FieldSpec::parse("QTY:N:Quantity").unwrap();
        assert_eq!(spec.render(true), "QTY");
        assert_eq!(spec.getter_name(), "getFieldAsNumber");
        assert_eq!(spec.value_placeholder(), "value");
    }

    #[test]
    fn description_may_contain_colons() {
        let spec = FieldSpec::parse("TS:C:Time hh:mm").unwrap();
        assert_eq!(spec.description, "Time hh:mm");
    }

    #[test]
    fn malformed_field_rows() {
        assert_eq!(FieldSpec::parse("AMT"), Err(FieldSpecError::MissingParts));
        assert_eq!(FieldSpec::parse("AMT:U"), Err(FieldSpecError::MissingParts));
        assert_eq!(FieldSpec::parse(":U:x"), Err(FieldSpecError::EmptyName));
        assert_eq!(FieldSpec::parse("$[2]:C:x"), Err(FieldSpecError::EmptyName));
        assert_eq!(FieldSpec::parse("AMT::x"), Err(FieldSpecError::EmptyType));
    }

    #[test]
    fn object_field_reads_as_string() {
        let spec = FieldSpec::parse("REF:O:Reference").unwrap();
        assert_eq!(spec.getter_name(), "getFieldAsString");
        assert_eq!(spec.value_placeholder(), "value$");
        assert_eq!(spec.render(false), "ref");
    }

    #[test]
    fn arg_option_plain() {
        let opt = ArgOption::parse("a$, b, c%");
        assert_eq!(opt.label, None);
        assert_eq!(opt.args, vec!["a$", "b", "c%"]);
        assert_eq!(opt.call_text("PGM"), "\"PGM\", a$, b, c%");
    }

    #[test]
    fn arg_option_comma_leading_and_empty() {
        assert_eq!(ArgOption::parse(",x,,y").args, vec!["x", "y"]);
        let empty = ArgOption::parse("");
        assert!(empty.args.is_empty());
        assert_eq!(empty.call_text("PGM"), "\"PGM\"");
    }

    #[test]
    fn arg_option_folds_label() {
        let opt = ArgOption::parse("\"::RET\",opt2");
        assert_eq!(opt.label.as_deref(), Some("::RET"));
        assert_eq!(opt.args, vec!["opt2"]);
        assert_eq!(opt.call_text("SHIP"), "\"SHIP::RET\", opt2");

        let stray = ArgOption::parse("::INIT\"");
        assert_eq!(stray.label.as_deref(), Some("::INIT"));
        assert_eq!(stray.call_text("SHIP"), "\"SHIP::INIT\"");
    }

    #[test]
    fn entry_tolerates_missing_and_null_collections() {
        let entry: CompanyEntry = serde_json::from_str(
            r#"{"companyCode":"CD","fieldGroups":null,"programs":[{"name":"X"}]}"#,
        )
        .unwrap();
        assert_eq!(entry.company_code, "CD");
        assert!(entry.field_groups.is_empty());
        assert!(entry.classes.is_empty());
        assert!(entry.programs[0].arg_options.is_empty());
    }

    #[test]
    fn timestamps_and_updates() {
        assert_eq!(format_timestamp(None), "Unknown");
        assert_eq!(
            format_timestamp(Some(1_716_280_914_000)),
            "05/21/2024 08:41 GMT+0"
        );

        let mut entry = CompanyEntry {
            remote_timestamp: Some(2_000),
            local_remote_timestamp: Some(1_000),
            ..Default::default()
        };
        assert!(entry.has_update());
        entry.local_remote_timestamp = Some(2_000);
        assert!(!entry.has_update());
        entry.remote_timestamp = None;
        assert!(!entry.has_update());
    }
}
