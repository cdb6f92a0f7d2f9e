use std::collections::HashMap;
use std::error::Error;
use std::path::Path;

use denta_ai::{DesignRequest, Session};
use denta_case::Case;
use denta_mesh::{read_stl_file, round2, summarize};

type DynError = Box<dyn Error>;
type Flags = HashMap<String, String>;

const API_KEY_ENV: &str = "GEMINI_API_KEY";

fn main() -> Result<(), DynError> {
    env_logger::init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        print_usage();
        return Ok(());
    };
    match command.as_str() {
        "inspect" => run_inspect(&args[1..]),
        "summarize" => run_summarize(&args[1..]),
        "compose" => run_compose(&args[1..]),
        "generate" => run_generate(&args[1..]),
        other => {
            print_usage();
            Err(format!("unknown command '{other}'").into())
        }
    }
}

fn print_usage() {
    eprintln!("denta-cli <command> [flags]");
    eprintln!();
    eprintln!("commands:");
    eprintln!("  inspect    --scan <file.stl>");
    eprintln!("  summarize  --scans <a.stl,b.stl,...>");
    eprintln!("  compose    --instruction <text> --scans <a.stl,...>");
    eprintln!("  generate   --instruction <text> --scans <a.stl,...>");
    eprintln!("             [--api-key <key>] [--model <name>]");
    eprintln!();
    eprintln!("generate reads {API_KEY_ENV} when --api-key is omitted");
}

fn run_inspect(args: &[String]) -> Result<(), DynError> {
    let flags = parse_flags(args)?;
    let path = required_str(&flags, "--scan")?;
    let mesh = read_stl_file(path)?;
    let summary = summarize(scan_name(path), &mesh);
    println!("scan {}", summary.name);
    println!("vertices {}", mesh.vertex_count());
    println!("triangles {}", mesh.triangle_count());
    match summary.bounds {
        Some(bounds) => {
            println!("center {}", triplet(bounds.center));
            println!("size {}", triplet(bounds.size));
        }
        None => println!("empty mesh"),
    }
    Ok(())
}

fn run_summarize(args: &[String]) -> Result<(), DynError> {
    let flags = parse_flags(args)?;
    let case = load_case(&flags)?;
    for summary in case.summaries() {
        println!("{summary}");
    }
    Ok(())
}

fn run_compose(args: &[String]) -> Result<(), DynError> {
    let flags = parse_flags(args)?;
    let instruction = required_str(&flags, "--instruction")?;
    let case = load_case(&flags)?;
    let request = DesignRequest::new(instruction, case.summaries())?;
    println!("{}", request.prompt());
    Ok(())
}

fn run_generate(args: &[String]) -> Result<(), DynError> {
    let flags = parse_flags(args)?;
    let instruction = required_str(&flags, "--instruction")?;
    let case = load_case(&flags)?;
    let request = DesignRequest::new(instruction, case.summaries())?;
    let session = connect_session(&flags)?;

    eprintln!("Sending request to Gemini AI...");
    let plan = session.generate_plan(&request)?;
    println!();
    println!("--- DentaMind AI Response ---");
    println!("{plan}");
    println!("--- End Response ---");
    Ok(())
}

fn connect_session(flags: &Flags) -> Result<Session, DynError> {
    let api_key = match optional_str(flags, "--api-key") {
        Some(key) => key.to_string(),
        None => std::env::var(API_KEY_ENV).unwrap_or_default(),
    };
    if api_key.trim().is_empty() {
        return Err(format!("no API key given; pass --api-key or set {API_KEY_ENV}").into());
    }
    let session = match optional_str(flags, "--model") {
        Some(model) => Session::connect_with_model(&api_key, model)?,
        None => Session::connect(&api_key)?,
    };
    Ok(session)
}

fn load_case(flags: &Flags) -> Result<Case, DynError> {
    let paths = required_str(flags, "--scans")?;
    let mut case = Case::new();
    for path in paths.split(',').map(str::trim).filter(|path| !path.is_empty()) {
        let mesh = read_stl_file(path)?;
        let scan = case.insert_scan(scan_name(path), mesh);
        log::debug!("loaded scan '{}' from {path}", scan.name());
    }
    if case.is_empty() {
        return Err("'--scans' names no files".into());
    }
    Ok(case)
}

fn scan_name(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.to_string())
}

fn triplet(values: [f64; 3]) -> String {
    format!(
        "[{:.2}, {:.2}, {:.2}]",
        round2(values[0]),
        round2(values[1]),
        round2(values[2])
    )
}

fn parse_flags(args: &[String]) -> Result<Flags, DynError> {
    if !args.len().is_multiple_of(2) {
        return Err("flags must come in '--name value' pairs".into());
    }
    let mut flags = Flags::new();
    for pair in args.chunks(2) {
        let name = &pair[0];
        if !name.starts_with("--") {
            return Err(format!("expected a --flag, found '{name}'").into());
        }
        if flags.insert(name.clone(), pair[1].clone()).is_some() {
            return Err(format!("duplicate flag '{name}'").into());
        }
    }
    Ok(flags)
}

fn required_str<'a>(flags: &'a Flags, name: &str) -> Result<&'a str, DynError> {
    flags
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| format!("missing required flag '{name}'").into())
}

fn optional_str<'a>(flags: &'a Flags, name: &str) -> Option<&'a str> {
    flags.get(name).map(String::as_str)
}
