mod backend;
mod completions;
mod config;
mod context;
mod import;
mod index;
mod labels;
mod library;
mod report;
mod signature;
mod store;

use backend::Backend;
use tower_lsp::{LspService, Server};

fn main() {
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some(cmd @ ("libraries" | "import" | "remove" | "move")) => {
            let code = report::run(cmd, &args[2..]);
            std::process::exit(code);
        }
        Some("--help" | "-h") => {
            print_usage();
        }
        Some("--version" | "-V") => {
            println!("dt-lsp {}", env!("CARGO_PKG_VERSION"));
        }
        Some(other) if other.starts_with('-') => {
            eprintln!("unknown option `{other}`");
            print_usage();
            std::process::exit(2);
        }
        _ => {
            run_lsp();
        }
    }
}

fn print_usage() {
    println!("dt-lsp {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Usage:");
    println!("  dt-lsp                                  Start LSP server (stdin/stdout)");
    println!("  dt-lsp libraries <store>                List company libraries as CSV");
    println!("  dt-lsp import <store> <files-or-dirs>   Add or update company libraries");
    println!("  dt-lsp remove <store> <code>            Remove a company library");
    println!("  dt-lsp move <store> <code> <position>   Change a library's search order");
    println!("  dt-lsp --help                           Show this help");
    println!("  dt-lsp --version                        Show version");
    println!();
    println!("The server reads its store path from initializationOptions.storePath");
    println!("or the {} environment variable.", config::STORE_ENV);
}

#[tokio::main]
async fn run_lsp() {
    env_logger::init();

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::build(Backend::new).finish();

    Server::new(stdin, stdout, socket).serve(service).await;
}
