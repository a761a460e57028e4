use tower_lsp::lsp_types::*;

use crate::backend::DocumentState;
use crate::context::{self, CompletionContext, Matcher};
use crate::index::{IndexedGroup, MetadataIndex};
use crate::labels;

pub fn get_completions(
    doc: &DocumentState,
    position: Position,
    trigger: Option<&str>,
    index: &MetadataIndex,
) -> Option<Vec<CompletionItem>> {
    let lines: Vec<&str> = doc.source.lines().collect();
    complete(&lines, position, trigger, index)
}

/// Walk the matchers registered for `trigger` in priority order; the first
/// one that matches the line prefix and yields candidates wins.
pub fn complete(
    lines: &[&str],
    position: Position,
    trigger: Option<&str>,
    index: &MetadataIndex,
) -> Option<Vec<CompletionItem>> {
    let line = lines.get(position.line as usize).copied().unwrap_or("");
    let prefix = context::line_prefix(line, position.character as usize);

    Matcher::priority(trigger).iter().find_map(|matcher| {
        let ctx = matcher.apply(prefix)?;
        build(&ctx, lines, position, index)
    })
}

fn build(
    ctx: &CompletionContext,
    lines: &[&str],
    position: Position,
    index: &MetadataIndex,
) -> Option<Vec<CompletionItem>> {
    match ctx {
        CompletionContext::TemplatedAccess { qualifier } => {
            templated_completions(qualifier, index)
        }
        CompletionContext::FieldAccess { qualifier } => field_completions(qualifier, index),
        CompletionContext::StaticMethod { class_name } => {
            static_method_completions(class_name, index)
        }
        CompletionContext::ProgramName => program_name_completions(index),
        CompletionContext::ProgramArgs {
            program,
            has_trailing_comma,
            gap,
        } => program_arg_completions(program, *has_trailing_comma, gap, position, index),
        CompletionContext::Class => class_completions(index),
        CompletionContext::Constructor { class_name } => {
            constructor_completions(class_name, position, index)
        }
        CompletionContext::Label => Some(label_completions(lines, position.line as usize)),
    }
}

/// A qualifier typed entirely in upper case asks for upper-case field names.
fn is_upper_case(qualifier: &str) -> bool {
    qualifier.chars().any(char::is_uppercase) && !qualifier.chars().any(char::is_lowercase)
}

fn sort_key(position: usize) -> String {
    format!("{position:06}")
}

fn escape_snippet(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('$', "\\$")
        .replace('}', "\\}")
}

fn group_description(group: &IndexedGroup) -> Option<CompletionItemLabelDetails> {
    label_description(&format!("{} ({})", group.name, group.company))
}

fn label_description(description: &str) -> Option<CompletionItemLabelDetails> {
    Some(CompletionItemLabelDetails {
        detail: None,
        description: Some(description.to_string()),
    })
}

// ---------------------------------------------------------------------------
// Field access: `ddname.`
// ---------------------------------------------------------------------------

fn field_completions(qualifier: &str, index: &MetadataIndex) -> Option<Vec<CompletionItem>> {
    let group = index.field_group(qualifier)?;
    let upper = is_upper_case(qualifier);

    Some(
        group
            .fields
            .iter()
            .enumerate()
            .map(|(i, field)| {
                let label = field.render(upper);
                CompletionItem {
                    label: label.clone(),
                    kind: Some(CompletionItemKind::FIELD),
                    detail: Some(field.detail()),
                    label_details: group_description(group),
                    insert_text: Some(label),
                    sort_text: Some(sort_key(i)),
                    ..Default::default()
                }
            })
            .collect(),
    )
}

// ---------------------------------------------------------------------------
// Templated accessors: `rec!.`
// ---------------------------------------------------------------------------

fn templated_completions(qualifier: &str, index: &MetadataIndex) -> Option<Vec<CompletionItem>> {
    let group = index.field_group(qualifier)?;
    let upper = is_upper_case(qualifier);
    let mut items = Vec::with_capacity(group.fields.len() * 2);

    for field in &group.fields {
        let mut args = format!("\"{}\"", field.cased_base(upper));
        if let Some(bound) = &field.array_bound {
            args.push_str(", ");
            args.push_str(bound);
        }
        let placeholder = field.value_placeholder();

        let getter = format!("{}({args})", field.getter_name());
        items.push(CompletionItem {
            label: getter.clone(),
            kind: Some(CompletionItemKind::METHOD),
            detail: Some(field.detail()),
            label_details: group_description(group),
            insert_text: Some(getter),
            sort_text: Some(sort_key(items.len())),
            ..Default::default()
        });

        items.push(CompletionItem {
            label: format!("setFieldValue({args}, {placeholder})"),
            kind: Some(CompletionItemKind::METHOD),
            detail: Some(field.detail()),
            label_details: group_description(group),
            insert_text: Some(format!(
                "setFieldValue({}, ${{1:{}}})",
                escape_snippet(&args),
                escape_snippet(placeholder)
            )),
            insert_text_format: Some(InsertTextFormat::SNIPPET),
            sort_text: Some(sort_key(items.len())),
            ..Default::default()
        });
    }

    Some(items)
}

// ---------------------------------------------------------------------------
// Static methods: `ClassName.`
// ---------------------------------------------------------------------------

fn static_method_completions(
    class_name: &str,
    index: &MetadataIndex,
) -> Option<Vec<CompletionItem>> {
    let owner_len = class_name.len() + 1;
    let items: Vec<CompletionItem> = index
        .static_methods_for(class_name)
        .into_iter()
        .filter_map(|signature| {
            let rest = signature.get(owner_len..)?;
            let name = rest.split('(').next().unwrap_or(rest).trim();
            if name.is_empty() {
                return None;
            }
            Some(CompletionItem {
                label: name.to_string(),
                kind: Some(CompletionItemKind::METHOD),
                detail: Some(signature.to_string()),
                label_details: label_description(signature),
                insert_text: Some(rest.to_string()),
                ..Default::default()
            })
        })
        .collect();

    (!items.is_empty()).then_some(items)
}

// ---------------------------------------------------------------------------
// Programs: `call ` and `call "PGM",`
// ---------------------------------------------------------------------------

fn program_name_completions(index: &MetadataIndex) -> Option<Vec<CompletionItem>> {
    let mut items = Vec::new();

    for program in index.programs() {
        let detail = (!program.title.is_empty()).then(|| program.title.clone());

        if program.options.is_empty() {
            items.push(CompletionItem {
                label: program.name.clone(),
                kind: Some(CompletionItemKind::FUNCTION),
                detail: detail.clone(),
                label_details: label_description(&program.company),
                insert_text: Some(format!("\"{}\"", program.name)),
                sort_text: Some(sort_key(items.len())),
                ..Default::default()
            });
            continue;
        }

        for option in &program.options {
            let mut label = format!("{}{}", program.name, option.label.as_deref().unwrap_or(""));
            if !option.args.is_empty() {
                label.push_str(", ");
                label.push_str(&option.normalized());
            }
            items.push(CompletionItem {
                label,
                kind: Some(CompletionItemKind::FUNCTION),
                detail: detail.clone(),
                label_details: label_description(&program.company),
                filter_text: Some(program.name.clone()),
                insert_text: Some(option.call_text(&program.name)),
                sort_text: Some(sort_key(items.len())),
                ..Default::default()
            });
        }
    }

    Some(items)
}

fn program_arg_completions(
    program: &str,
    has_trailing_comma: bool,
    gap: &str,
    position: Position,
    index: &MetadataIndex,
) -> Option<Vec<CompletionItem>> {
    let name = program.split("::").next().unwrap_or_default();
    let program = index.program(name)?;
    let several = program.options.len() > 1;

    // Whitespace after the closing quote is replaced so the comma hugs it.
    let gap_range = (!gap.is_empty()).then(|| Range {
        start: Position {
            line: position.line,
            character: position
                .character
                .saturating_sub(gap.encode_utf16().count() as u32),
        },
        end: position,
    });

    let items: Vec<CompletionItem> = program
        .options
        .iter()
        .enumerate()
        .filter(|(_, option)| !option.args.is_empty())
        .map(|(i, option)| {
            let args = option.normalized();
            let new_text = if has_trailing_comma {
                args.clone()
            } else {
                format!(", {args}")
            };
            let label = if several {
                format!("Option {}", i + 1)
            } else {
                "Arguments".to_string()
            };
            let (insert_text, text_edit, filter_text) = match gap_range {
                Some(range) => (
                    None,
                    Some(CompletionTextEdit::Edit(TextEdit {
                        range,
                        new_text,
                    })),
                    Some(format!("{gap}{label}")),
                ),
                None => (Some(new_text), None, None),
            };
            CompletionItem {
                label,
                kind: Some(CompletionItemKind::VALUE),
                detail: (!program.title.is_empty()).then(|| program.title.clone()),
                label_details: label_description(&args),
                insert_text,
                text_edit,
                filter_text,
                sort_text: Some(sort_key(i)),
                ..Default::default()
            }
        })
        .collect();

    (!items.is_empty()).then_some(items)
}

// ---------------------------------------------------------------------------
// Classes and constructors: `new ` and `new Foo `
// ---------------------------------------------------------------------------

fn class_completions(index: &MetadataIndex) -> Option<Vec<CompletionItem>> {
    let items: Vec<CompletionItem> = index
        .classes()
        .iter()
        .map(|class| CompletionItem {
            label: class.name.clone(),
            kind: Some(CompletionItemKind::CLASS),
            label_details: label_description(&class.company),
            ..Default::default()
        })
        .collect();

    (!items.is_empty()).then_some(items)
}

fn constructor_completions(
    class_name: &str,
    position: Position,
    index: &MetadataIndex,
) -> Option<Vec<CompletionItem>> {
    let constructors = index.constructors(class_name)?;

    // Replace the space typed after the class name.
    let range = Range {
        start: Position {
            line: position.line,
            character: position.character.saturating_sub(1),
        },
        end: position,
    };

    let items: Vec<CompletionItem> = constructors
        .iter()
        .map(|ctor| {
            let new_text = ctor
                .strip_prefix(class_name)
                .filter(|rest| rest.starts_with('('))
                .unwrap_or(ctor);
            CompletionItem {
                label: ctor.clone(),
                kind: Some(CompletionItemKind::CONSTRUCTOR),
                detail: Some(class_name.to_string()),
                filter_text: Some(format!(" {ctor}")),
                text_edit: Some(CompletionTextEdit::Edit(TextEdit {
                    range,
                    new_text: new_text.to_string(),
                })),
                ..Default::default()
            }
        })
        .collect();

    (!items.is_empty()).then_some(items)
}

// ---------------------------------------------------------------------------
// Line labels: `goto `, `err=`
// ---------------------------------------------------------------------------

fn label_completions(lines: &[&str], cursor_line: usize) -> Vec<CompletionItem> {
    let symbolic = labels::SYMBOLIC_LABELS
        .iter()
        .enumerate()
        .map(|(i, name)| CompletionItem {
            label: name.to_string(),
            kind: Some(CompletionItemKind::KEYWORD),
            detail: Some("symbolic label".to_string()),
            sort_text: Some(format!("0_{i:02}")),
            ..Default::default()
        });

    let defined = labels::visible_labels(lines, cursor_line)
        .into_iter()
        .map(|def| CompletionItem {
            label: def.name,
            kind: Some(CompletionItemKind::REFERENCE),
            detail: Some(format!("line {}", def.line + 1)),
            sort_text: Some(format!("1_{:08}", def.line)),
            ..Default::default()
        });

    symbolic.chain(defined).collect()
}
