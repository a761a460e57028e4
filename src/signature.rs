use tower_lsp::lsp_types::{
    Documentation, MarkupContent, MarkupKind, ParameterInformation, ParameterLabel,
    SignatureHelp, SignatureInformation,
};

use crate::context;
use crate::index::MetadataIndex;
use crate::library::ArgOption;

/// Zero-based parameter being typed: the first comma after the program
/// name introduces parameter 0.
pub fn active_parameter(trailing: &str) -> u32 {
    let commas = trailing.chars().filter(|&c| c == ',').count() as u32;
    commas.saturating_sub(1)
}

/// Render `call "PGM", arg1, arg2` with the byte offsets of each argument.
pub fn format_call_with_offsets(program: &str, option: &ArgOption) -> (String, Vec<[u32; 2]>) {
    let mut label = format!("call {}", option.quoted_name(program));
    let mut offsets = Vec::with_capacity(option.args.len());
    for arg in &option.args {
        label.push_str(", ");
        let start = label.len() as u32;
        label.push_str(arg);
        offsets.push([start, label.len() as u32]);
    }
    (label, offsets)
}

/// Signature help for the `call "PGM"` before the cursor, one signature per
/// argument option.
pub fn signature_help(prefix: &str, index: &MetadataIndex) -> Option<SignatureHelp> {
    let ctx = context::match_signature(prefix)?;
    let name = ctx.program.split("::").next().unwrap_or_default();
    let program = index.program(name)?;
    if program.options.is_empty() {
        return None;
    }

    let active_parameter = active_parameter(&ctx.trailing);
    let documentation = (!program.title.is_empty()).then(|| {
        Documentation::MarkupContent(MarkupContent {
            kind: MarkupKind::Markdown,
            value: program.title.clone(),
        })
    });

    let signatures: Vec<SignatureInformation> = program
        .options
        .iter()
        .map(|option| {
            let (label, offsets) = format_call_with_offsets(&program.name, option);
            SignatureInformation {
                label,
                documentation: documentation.clone(),
                parameters: Some(
                    offsets
                        .into_iter()
                        .map(|o| ParameterInformation {
                            label: ParameterLabel::LabelOffsets(o),
                            documentation: None,
                        })
                        .collect(),
                ),
                active_parameter: None,
            }
        })
        .collect();

    let active_signature = program
        .options
        .iter()
        .position(|o| o.args.len() as u32 > active_parameter)
        .unwrap_or(0) as u32;

    Some(SignatureHelp {
        signatures,
        active_signature: Some(active_signature),
        active_parameter: Some(active_parameter),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{CompanyEntry, Program};

    fn index_with(programs: Vec<Program>) -> MetadataIndex {
        MetadataIndex::build(&[CompanyEntry {
            company_code: "CD".to_string(),
            programs,
            ..Default::default()
        }])
    }

    fn program(name: &str, options: &[&str]) -> Program {
        Program {
            name: name.to_string(),
            title: format!("{name} program"),
            arg_options: options.iter().map(|o| o.to_string()).collect(),
        }
    }

    #[test]
    fn active_parameter_from_commas() {
        assert_eq!(active_parameter(""), 0);
        assert_eq!(active_parameter(", "), 0);
        assert_eq!(active_parameter(", a, "), 1);
        assert_eq!(active_parameter(", a, b,"), 2);
    }

    #[test]
    fn two_options_first_parameter() {
        let index = index_with(vec![program("SHIP", &["\"opt1\"", "\"::RET\",opt2"])]);
        let help = signature_help("call \"SHIP\", ", &index).unwrap();
        assert_eq!(help.signatures.len(), 2);
        assert_eq!(help.active_parameter, Some(0));
        assert_eq!(help.active_signature, Some(0));
        assert_eq!(help.signatures[0].label, "call \"SHIP\", \"opt1\"");
        assert_eq!(help.signatures[1].label, "call \"SHIP::RET\", opt2");
    }

    #[test]
    fn parameter_offsets_point_at_arguments() {
        let option = ArgOption::parse("cust$, amt");
        let (label, offsets) = format_call_with_offsets("PGM", &option);
        assert_eq!(label, "call \"PGM\", cust$, amt");
        assert_eq!(offsets.len(), 2);
        assert_eq!(&label[offsets[0][0] as usize..offsets[0][1] as usize], "cust$");
        assert_eq!(&label[offsets[1][0] as usize..offsets[1][1] as usize], "amt");
    }

    #[test]
    fn active_signature_skips_short_overloads() {
        let index = index_with(vec![program("P", &["a", "a, b, c"])]);
        let help = signature_help("call \"P\", x, y, ", &index).unwrap();
        assert_eq!(help.active_parameter, Some(2));
        assert_eq!(help.active_signature, Some(1));
    }

    #[test]
    fn label_suffixed_name_and_case_are_resolved() {
        let index = index_with(vec![program("SHIP", &["a"])]);
        assert!(signature_help("call \"ship::RET\", ", &index).is_some());
    }

    #[test]
    fn no_help_without_match() {
        let index = index_with(vec![program("SHIP", &[]), program("P", &["a"])]);
        assert!(signature_help("call \"SHIP\", ", &index).is_none());
        assert!(signature_help("call \"NOPE\", ", &index).is_none());
        assert!(signature_help("print \"P\", ", &index).is_none());
    }
}
