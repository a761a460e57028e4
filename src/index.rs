use std::collections::{HashMap, HashSet};
use std::fmt;

use log::warn;

use crate::library::{ArgOption, CompanyEntry, FieldSpec};

/// Read-only merge view over the ordered company entries.
///
/// Built once per store version; every completion request reads a shared
/// snapshot and never mutates it.
#[derive(Debug, Default)]
pub struct MetadataIndex {
    /// Lowercase group name -> first group with that name.
    groups: HashMap<String, IndexedGroup>,
    /// Programs in catalog order, first occurrence of each name.
    programs: Vec<IndexedProgram>,
    /// Lowercase program name -> position in `programs`.
    program_lookup: HashMap<String, usize>,
    classes: Vec<IndexedClass>,
    static_methods: Vec<String>,
    diagnostics: Vec<IngestDiagnostic>,
}

#[derive(Debug, Clone)]
pub struct IndexedGroup {
    pub name: String,
    pub company: String,
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone)]
pub struct IndexedProgram {
    pub name: String,
    pub title: String,
    pub company: String,
    pub options: Vec<ArgOption>,
}

#[derive(Debug, Clone)]
pub struct IndexedClass {
    pub name: String,
    pub company: String,
    pub constructors: Vec<String>,
}

/// A metadata row dropped during ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestDiagnostic {
    pub company: String,
    pub location: String,
    pub message: String,
}

impl fmt::Display for IngestDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.company, self.location, self.message)
    }
}

impl MetadataIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(entries: &[CompanyEntry]) -> Self {
        let mut index = Self::new();
        let mut seen_classes = HashSet::new();
        let mut seen_methods = HashSet::new();

        for entry in entries {
            let company = entry.company_code.as_str();

            for group in &entry.field_groups {
                if group.group_name.trim().is_empty() {
                    index.diagnose(company, "fieldGroups", "group without a name");
                    continue;
                }
                let mut fields = Vec::with_capacity(group.fields.len());
                for (i, raw) in group.fields.iter().enumerate() {
                    match FieldSpec::parse(raw) {
                        Ok(spec) => fields.push(spec),
                        Err(e) => index.diagnose(
                            company,
                            &format!("{}[{i}] `{raw}`", group.group_name),
                            &e.to_string(),
                        ),
                    }
                }
                index
                    .groups
                    .entry(group.group_name.to_ascii_lowercase())
                    .or_insert_with(|| IndexedGroup {
                        name: group.group_name.clone(),
                        company: company.to_string(),
                        fields,
                    });
            }

            for program in &entry.programs {
                if program.name.trim().is_empty() {
                    index.diagnose(company, "programs", "program without a name");
                    continue;
                }
                let key = program.name.to_ascii_lowercase();
                if index.program_lookup.contains_key(&key) {
                    continue;
                }
                index.program_lookup.insert(key, index.programs.len());
                index.programs.push(IndexedProgram {
                    name: program.name.clone(),
                    title: program.title.clone(),
                    company: company.to_string(),
                    options: program
                        .arg_options
                        .iter()
                        .map(|o| ArgOption::parse(o))
                        .collect(),
                });
            }

            for class in &entry.classes {
                if class.class_name.trim().is_empty() {
                    index.diagnose(company, "classes", "class without a name");
                    continue;
                }
                if !seen_classes.insert(class.class_name.clone()) {
                    continue;
                }
                index.classes.push(IndexedClass {
                    name: class.class_name.clone(),
                    company: company.to_string(),
                    constructors: class.constructors.clone(),
                });
            }

            for method in &entry.static_methods {
                if seen_methods.insert(method.clone()) {
                    index.static_methods.push(method.clone());
                }
            }
        }

        index
    }

    fn diagnose(&mut self, company: &str, location: &str, message: &str) {
        let diagnostic = IngestDiagnostic {
            company: company.to_string(),
            location: location.to_string(),
            message: message.to_string(),
        };
        warn!("dropped library metadata: {diagnostic}");
        self.diagnostics.push(diagnostic);
    }

    /// Field group by name, ignoring case. First entry wins.
    pub fn field_group(&self, name: &str) -> Option<&IndexedGroup> {
        self.groups.get(&name.to_ascii_lowercase())
    }

    /// Program by name, ignoring case. First entry wins.
    pub fn program(&self, name: &str) -> Option<&IndexedProgram> {
        self.program_lookup
            .get(&name.to_ascii_lowercase())
            .map(|&i| &self.programs[i])
    }

    pub fn programs(&self) -> &[IndexedProgram] {
        &self.programs
    }

    pub fn classes(&self) -> &[IndexedClass] {
        &self.classes
    }

    /// Constructors of `class_name` (exact case).
    pub fn constructors(&self, class_name: &str) -> Option<&[String]> {
        self.classes
            .iter()
            .find(|c| c.name == class_name)
            .map(|c| c.constructors.as_slice())
    }

    /// Static method signatures owned by `class_name`, matched on the exact
    /// `ClassName.` prefix.
    pub fn static_methods_for(&self, class_name: &str) -> Vec<&str> {
        let prefix = format!("{class_name}.");
        self.static_methods
            .iter()
            .filter(|m| m.starts_with(&prefix))
            .map(|m| m.as_str())
            .collect()
    }

    pub fn diagnostics(&self) -> &[IngestDiagnostic] {
        &self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{ClassDef, FieldGroup, Program};

    fn entry(code: &str) -> CompanyEntry {
        CompanyEntry {
            company_code: code.to_string(),
            ..Default::default()
        }
    }

    fn group(name: &str, fields: &[&str]) -> FieldGroup {
        FieldGroup {
            group_name: name.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    fn class(name: &str, ctors: &[&str]) -> ClassDef {
        ClassDef {
            class_name: name.to_string(),
            constructors: ctors.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn field_group_lookup_ignores_case() {
        let mut cd = entry("CD");
        cd.field_groups.push(group("DDNAME", &["AMT%:U:Amount"]));
        let index = MetadataIndex::build(&[cd]);

        let g = index.field_group("ddname").unwrap();
        assert_eq!(g.name, "DDNAME");
        assert_eq!(g.fields.len(), 1);
        assert!(index.field_group("other").is_none());
    }

    #[test]
    fn first_entry_wins_for_groups_and_programs() {
        let mut a = entry("A");
        a.field_groups.push(group("CUST", &["ID:N:Id"]));
        a.programs.push(Program {
            name: "SHIP".to_string(),
            title: "from A".to_string(),
            arg_options: vec![],
        });
        let mut b = entry("B");
        b.field_groups.push(group("cust", &["X:N:x", "Y:N:y"]));
        b.programs.push(Program {
            name: "ship".to_string(),
            title: "from B".to_string(),
            arg_options: vec![],
        });

        let index = MetadataIndex::build(&[a, b]);
        assert_eq!(index.field_group("CUST").unwrap().company, "A");
        assert_eq!(index.program("Ship").unwrap().title, "from A");
        assert_eq!(index.programs().len(), 1);
    }

    #[test]
    fn classes_dedup_first_occurrence() {
        let mut a = entry("A");
        a.classes.push(class("Foo", &["Foo()"]));
        let mut b = entry("B");
        b.classes.push(class("Foo", &["Foo(String)"]));
        b.classes.push(class("Bar", &[]));

        let index = MetadataIndex::build(&[a, b]);
        let names: Vec<&str> = index.classes().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Foo", "Bar"]);
        assert_eq!(index.classes()[0].company, "A");
        assert_eq!(index.constructors("Foo").unwrap(), ["Foo()".to_string()]);
        assert!(index.constructors("foo").is_none());
    }

    #[test]
    fn static_methods_exact_prefix_and_dedup() {
        let mut a = entry("A");
        a.static_methods = vec![
            "Util.trim(String s)".to_string(),
            "Utility.run()".to_string(),
        ];
        let mut b = entry("B");
        b.static_methods = vec!["Util.trim(String s)".to_string(), "Util.pad(int n)".to_string()];

        let index = MetadataIndex::build(&[a, b]);
        assert_eq!(
            index.static_methods_for("Util"),
            vec!["Util.trim(String s)", "Util.pad(int n)"]
        );
        assert!(index.static_methods_for("util").is_empty());
    }

    #[test]
    fn malformed_rows_are_dropped_with_diagnostics() {
        let mut cd = entry("CD");
        cd.field_groups
            .push(group("DD", &["GOOD:C:ok", "BROKEN", "ALSO:N"]));
        cd.field_groups.push(group("  ", &["X:N:x"]));
        cd.programs.push(Program::default());

        let index = MetadataIndex::build(&[cd]);
        assert_eq!(index.field_group("dd").unwrap().fields.len(), 1);
        assert_eq!(index.diagnostics().len(), 4);
        assert!(index.diagnostics()[0].to_string().starts_with("[CD] DD[1]"));
    }

    #[test]
    fn empty_index() {
        let index = MetadataIndex::build(&[]);
        assert!(index.programs().is_empty());
        assert!(index.classes().is_empty());
        assert!(index.program("x").is_none());
    }
}
