use std::path::{Path, PathBuf};

use anyhow::{bail, Context};

use crate::import;
use crate::library::CompanyEntry;
use crate::store::CompanyStore;

/// Escape a value for CSV output. Wraps in quotes if the value contains
/// commas, quotes, or newlines. Doubles any existing quotes.
fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        let escaped = value.replace('"', "\"\"");
        format!("\"{escaped}\"")
    } else {
        value.to_string()
    }
}

/// Format the collection as CSV with a header row, in search order.
pub fn format_csv(entries: &[CompanyEntry]) -> String {
    let mut out = String::from(
        "code,description,local_time,remote_time,update,field_groups,programs,classes\n",
    );
    for e in entries {
        let row = [
            csv_escape(&e.company_code),
            csv_escape(&e.description),
            csv_escape(&e.local_time()),
            csv_escape(&e.remote_time()),
            e.has_update().to_string(),
            e.field_groups.len().to_string(),
            e.programs.len().to_string(),
            e.classes.len().to_string(),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

fn open_store(path: &str) -> anyhow::Result<CompanyStore> {
    CompanyStore::open(Path::new(path)).with_context(|| format!("cannot open store {path}"))
}

/// `libraries <store>`: refresh update flags and print the collection.
fn libraries(store_path: &str) -> anyhow::Result<()> {
    let mut store = open_store(store_path)?;
    let mut entries = store.entries().to_vec();
    import::check_updates(&mut entries);
    if entries != store.entries() {
        store.replace_all(entries);
        store.save()?;
    }
    print!("{}", format_csv(store.entries()));
    Ok(())
}

/// `import <store> <files-or-dirs>...`: add or replace libraries.
fn import_libraries(store_path: &str, sources: &[String]) -> anyhow::Result<()> {
    let mut store = open_store(store_path)?;
    let paths: Vec<PathBuf> = sources.iter().map(PathBuf::from).collect();
    let mut failures = 0usize;

    for (path, result) in import::import_paths(&paths) {
        match result {
            Ok(entry) => {
                let code = entry.company_code.clone();
                let replaced = store.upsert(entry)?;
                let verb = if replaced { "updated" } else { "added" };
                println!("{verb} {code} from {}", path.display());
            }
            Err(e) => {
                eprintln!("skipped {}: {e}", path.display());
                failures += 1;
            }
        }
    }

    for diagnostic in store.snapshot().diagnostics() {
        eprintln!("warning: {diagnostic}");
    }
    store.save()?;

    if failures > 0 {
        let noun = if failures == 1 { "library" } else { "libraries" };
        bail!("{failures} {noun} could not be imported");
    }
    Ok(())
}

fn remove(store_path: &str, code: &str) -> anyhow::Result<()> {
    let mut store = open_store(store_path)?;
    store.remove(code)?;
    store.save()?;
    println!("removed {code}");
    Ok(())
}

fn move_to(store_path: &str, code: &str, index: &str) -> anyhow::Result<()> {
    let index: usize = index
        .parse()
        .with_context(|| format!("invalid position `{index}`"))?;
    let mut store = open_store(store_path)?;
    store.move_to(code, index)?;
    store.save()?;
    print!("{}", format_csv(store.entries()));
    Ok(())
}

/// Entry point for the library management subcommands. Returns exit code.
pub fn run(command: &str, args: &[String]) -> i32 {
    let result = match (command, args) {
        ("libraries", [store]) => libraries(store),
        ("import", [store, sources @ ..]) if !sources.is_empty() => {
            import_libraries(store, sources)
        }
        ("remove", [store, code]) => remove(store, code),
        ("move", [store, code, index]) => move_to(store, code, index),
        _ => {
            eprintln!("Usage: dt-lsp {command} ...  (see dt-lsp --help)");
            return 2;
        }
    };

    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e:#}");
            1
        }
    }
}
