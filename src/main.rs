//! mdpdf – command-line markdown → PDF converter.
//!
//! Usage:
//!   mdpdf <input.md> [output.pdf] [--format a4] [--landscape] [--margin 10]
//!
//! If `output.pdf` is omitted the PDF is written next to the input file with
//! the same stem (e.g. `notes.md` → `notes.pdf`).

use std::{env, fs, path::PathBuf, process};

use markdown_pdf::document::build_document_element;
use markdown_pdf::markdown::markdown_to_html;
use markdown_pdf::{
    configure_marked, download, normalize_options, DownloadTarget, Options, Page, ParserOverrides,
    Template,
};

#[derive(Default)]
struct Args {
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    format: Option<String>,
    landscape: bool,
    margin: Option<String>,
    css: Option<PathBuf>,
    header: Option<String>,
    footer: Option<String>,
    options: Option<PathBuf>,
    breaks: bool,
    html: bool,
}

fn flag_value(iter: &mut impl Iterator<Item = String>, flag: &str, prog: &str) -> String {
    match iter.next() {
        Some(v) => v,
        None => {
            eprintln!("Missing value for {flag}");
            print_usage(prog);
            process::exit(1);
        }
    }
}

fn parse_args(prog: &str, raw: impl Iterator<Item = String>) -> Args {
    let mut args = Args::default();
    let mut positional = 0usize;

    let mut iter = raw;
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--landscape" | "-l" => args.landscape = true,
            "--breaks" => args.breaks = true,
            "--html" => args.html = true,
            "--format" | "-f" => args.format = Some(flag_value(&mut iter, &arg, prog)),
            "--margin" | "-m" => args.margin = Some(flag_value(&mut iter, &arg, prog)),
            "--css" => args.css = Some(PathBuf::from(flag_value(&mut iter, &arg, prog))),
            "--header" => args.header = Some(flag_value(&mut iter, &arg, prog)),
            "--footer" => args.footer = Some(flag_value(&mut iter, &arg, prog)),
            "--options" | "-o" => {
                args.options = Some(PathBuf::from(flag_value(&mut iter, &arg, prog)))
            }
            "--help" | "-h" => {
                print_usage(prog);
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown flag: {other}");
                print_usage(prog);
                process::exit(1);
            }
            path => {
                if positional == 0 {
                    args.input = Some(PathBuf::from(path));
                } else if positional == 1 {
                    args.output = Some(PathBuf::from(path));
                } else {
                    eprintln!("Unexpected argument: {path}");
                    print_usage(prog);
                    process::exit(1);
                }
                positional += 1;
            }
        }
    }
    args
}

fn read_or_exit(path: &PathBuf) -> String {
    match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading '{}': {e}", path.display());
            process::exit(1);
        }
    }
}

/// JSON options file first, then flags on top.
fn build_options(args: &Args, output: &std::path::Path) -> Options {
    let mut options = match &args.options {
        Some(path) => match Options::from_json(&read_or_exit(path)) {
            Ok(o) => o,
            Err(e) => {
                eprintln!("Error parsing options '{}': {e}", path.display());
                process::exit(1);
            }
        },
        None => Options::default(),
    };

    if let Some(name) = output.file_name().and_then(|n| n.to_str()) {
        options.filename = Some(name.to_string());
    }
    if let Some(format) = &args.format {
        options.format = Some(format.clone());
    }
    if args.landscape {
        options.orientation = Some("landscape".to_string());
    }
    if let Some(margin) = &args.margin {
        options.margin = Some(margin.as_str().into());
    }
    if let Some(css) = &args.css {
        options.css = Some(read_or_exit(css));
    }
    if let Some(header) = &args.header {
        options.header = Some(Template::from(header.as_str()));
    }
    if let Some(footer) = &args.footer {
        options.footer = Some(Template::from(footer.as_str()));
    }
    options
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let mut raw = env::args();
    let prog = raw.next().unwrap_or_else(|| "mdpdf".to_string());
    let args = parse_args(&prog, raw);

    let input = match &args.input {
        Some(p) => p.clone(),
        None => {
            eprintln!("Error: no input file specified.");
            print_usage(&prog);
            process::exit(1);
        }
    };

    // Default output: same directory + same stem as input.
    let output = args.output.clone().unwrap_or_else(|| {
        let mut o = input.clone();
        o.set_extension(if args.html { "html" } else { "pdf" });
        o
    });

    let markdown = read_or_exit(&input);
    let options = build_options(&args, &output);

    if args.breaks {
        configure_marked(&ParserOverrides {
            breaks: Some(true),
            ..ParserOverrides::default()
        });
    }

    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if let Err(e) = fs::create_dir_all(&dir) {
        eprintln!("Error creating output directory: {e}");
        process::exit(1);
    }

    if args.html {
        let normalized = normalize_options(&options);
        let element = build_document_element(&markdown_to_html(Some(&markdown)), &normalized);
        if let Err(e) = fs::write(&output, element.outer_html()) {
            eprintln!("Error writing '{}': {e}", output.display());
            process::exit(1);
        }
        eprintln!("Wrote '{}'", output.display());
        return;
    }

    let page = Page::new(DownloadTarget::Directory(dir));
    match download(&page, Some(&markdown), &options).await {
        Ok(()) => {
            if let Some(saved) = page.last_download() {
                let path = saved.path.unwrap_or_else(|| output.clone());
                eprintln!("Wrote '{}' ({} bytes)", path.display(), saved.bytes.len());
            }
        }
        Err(e) => {
            eprintln!("Error generating PDF: {e}");
            process::exit(1);
        }
    }
}

fn print_usage(prog: &str) {
    eprintln!("mdpdf – markdown to PDF converter (markdown-pdf)");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} <input.md> [output.pdf] [flags]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <input.md>        Markdown file to convert (images must be base64 data URIs; others are skipped)");
    eprintln!("  [output.pdf]      Output path  (default: same stem as input with .pdf)");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --format, -f      Paper format: a0-a6, b4, b5, letter, legal, tabloid, ledger (default: a4)");
    eprintln!("  --landscape, -l   Use landscape page orientation");
    eprintln!("  --margin, -m      Page margin in mm (default: 10)");
    eprintln!("  --css <file>      Extra stylesheet appended to the document");
    eprintln!("  --header <html>   Header HTML; {{{{page}}}} and {{{{total}}}} are substituted");
    eprintln!("  --footer <html>   Footer HTML");
    eprintln!("  --options, -o     JSON options file; flags override its values");
    eprintln!("  --breaks          Turn single newlines into line breaks");
    eprintln!("  --html            Write the rendered document as HTML instead of PDF");
    eprintln!("  --help            Print this message");
}
