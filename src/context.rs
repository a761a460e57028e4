use std::sync::LazyLock;

use regex::Regex;

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("invalid context pattern")
}

static TEMPLATED_ACCESS: LazyLock<Regex> = LazyLock::new(|| regex(r"\b([A-Za-z_]\w*)!\.$"));
static FIELD_ACCESS: LazyLock<Regex> = LazyLock::new(|| regex(r"\b([A-Za-z_]\w*)\.$"));
static PROGRAM_NAME: LazyLock<Regex> = LazyLock::new(|| regex(r"(?i)\bcall $"));
static PROGRAM_ARGS: LazyLock<Regex> =
    LazyLock::new(|| regex(r#"(?i)\bcall\s+"([^"]+)"(\s*)(,)?\s*$"#));
static SIGNATURE: LazyLock<Regex> = LazyLock::new(|| regex(r#"(?i)\bcall\s+"([^"]+)""#));
static CLASS: LazyLock<Regex> = LazyLock::new(|| regex(r"(?i)\bnew $"));
static CONSTRUCTOR: LazyLock<Regex> =
    LazyLock::new(|| regex(r"(?i)\bnew\s+([A-Za-z_][\w.]*) $"));
static LABEL_TRANSFER: LazyLock<Regex> = LazyLock::new(|| regex(r"(?i)\bgo(?:to|sub)\s"));
static LABEL_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    regex(&format!(
        r"(?i)\b(?:{})=\w*$",
        LABEL_CLAUSES.join("|")
    ))
});

/// Statement options whose value is a line label, e.g. `err=handler`.
pub const LABEL_CLAUSES: &[&str] = &["err", "end", "dom", "bsy", "tbl"];

/// What the text before the cursor asks to complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionContext {
    TemplatedAccess { qualifier: String },
    FieldAccess { qualifier: String },
    StaticMethod { class_name: String },
    ProgramName,
    /// `gap` is the whitespace typed after the closing quote when no comma
    /// follows it.
    ProgramArgs {
        program: String,
        has_trailing_comma: bool,
        gap: String,
    },
    Class,
    Constructor { class_name: String },
    Label,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    TemplatedAccess,
    FieldAccess,
    StaticMethod,
    Constructor,
    Class,
    ProgramName,
    ProgramArgs,
    Label,
}

const DOT: &[Matcher] = &[
    Matcher::TemplatedAccess,
    Matcher::FieldAccess,
    Matcher::StaticMethod,
];
const SPACE: &[Matcher] = &[
    Matcher::Constructor,
    Matcher::Class,
    Matcher::ProgramName,
    Matcher::ProgramArgs,
    Matcher::Label,
];
const COMMA: &[Matcher] = &[Matcher::ProgramArgs, Matcher::Label];
const EQUALS: &[Matcher] = &[Matcher::Label];
const ALL: &[Matcher] = &[
    Matcher::TemplatedAccess,
    Matcher::FieldAccess,
    Matcher::StaticMethod,
    Matcher::Constructor,
    Matcher::Class,
    Matcher::ProgramName,
    Matcher::ProgramArgs,
    Matcher::Label,
];

/// Characters the completion provider registers as triggers.
pub const TRIGGER_CHARACTERS: &[&str] = &[" ", ".", "=", ","];

impl Matcher {
    /// Matchers to try, in order, for a trigger character. Manual invocation
    /// (or an unknown trigger) tries every matcher.
    pub fn priority(trigger: Option<&str>) -> &'static [Matcher] {
        match trigger {
            Some(".") => DOT,
            Some(" ") => SPACE,
            Some(",") => COMMA,
            Some("=") => EQUALS,
            _ => ALL,
        }
    }

    pub fn apply(self, prefix: &str) -> Option<CompletionContext> {
        match self {
            Matcher::TemplatedAccess => match_templated_access(prefix)
                .map(|qualifier| CompletionContext::TemplatedAccess { qualifier }),
            Matcher::FieldAccess => match_field_access(prefix)
                .map(|qualifier| CompletionContext::FieldAccess { qualifier }),
            Matcher::StaticMethod => match_field_access(prefix)
                .map(|class_name| CompletionContext::StaticMethod { class_name }),
            Matcher::Constructor => {
                match_constructor(prefix).map(|class_name| CompletionContext::Constructor { class_name })
            }
            Matcher::Class => match_class(prefix).then_some(CompletionContext::Class),
            Matcher::ProgramName => {
                match_program_name(prefix).then_some(CompletionContext::ProgramName)
            }
            Matcher::ProgramArgs => {
                match_program_args(prefix).map(|m| CompletionContext::ProgramArgs {
                    program: m.program,
                    has_trailing_comma: m.has_trailing_comma,
                    gap: m.gap,
                })
            }
            Matcher::Label => match_label(prefix).then_some(CompletionContext::Label),
        }
    }
}

/// The part of `line` before the cursor. `character` counts chars; a cursor
/// past the end yields the whole line.
pub fn line_prefix(line: &str, character: usize) -> &str {
    match line.char_indices().nth(character) {
        Some((i, _)) => &line[..i],
        None => line,
    }
}

pub fn match_field_access(prefix: &str) -> Option<String> {
    capture(&FIELD_ACCESS, prefix)
}

pub fn match_templated_access(prefix: &str) -> Option<String> {
    capture(&TEMPLATED_ACCESS, prefix)
}

pub fn match_program_name(prefix: &str) -> bool {
    PROGRAM_NAME.is_match(prefix)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramArgsMatch {
    pub program: String,
    pub has_trailing_comma: bool,
    pub gap: String,
}

/// `call "PGM"` at the end of the prefix, optionally followed by a comma.
pub fn match_program_args(prefix: &str) -> Option<ProgramArgsMatch> {
    let caps = PROGRAM_ARGS.captures(prefix)?;
    let program = caps.get(1)?.as_str().to_string();
    let has_trailing_comma = caps.get(3).is_some();
    let gap = match caps.get(2) {
        Some(m) if !has_trailing_comma => m.as_str().to_string(),
        _ => String::new(),
    };
    Some(ProgramArgsMatch {
        program,
        has_trailing_comma,
        gap,
    })
}

pub fn match_class(prefix: &str) -> bool {
    CLASS.is_match(prefix)
}

pub fn match_constructor(prefix: &str) -> Option<String> {
    capture(&CONSTRUCTOR, prefix)
}

pub fn match_label(prefix: &str) -> bool {
    LABEL_TRANSFER.is_match(prefix) || LABEL_CLAUSE.is_match(prefix)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureContext {
    pub program: String,
    /// Everything typed after the closing quote of the program name.
    pub trailing: String,
}

/// The last `call "PGM"` anywhere in the prefix.
pub fn match_signature(prefix: &str) -> Option<SignatureContext> {
    let caps = SIGNATURE.captures_iter(prefix).last()?;
    let whole = caps.get(0)?;
    let program = caps.get(1)?.as_str().to_string();
    Some(SignatureContext {
        program,
        trailing: prefix[whole.end()..].to_string(),
    })
}

fn capture(re: &Regex, prefix: &str) -> Option<String> {
    re.captures(prefix)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
