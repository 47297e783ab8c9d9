use std::env;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chroma_contracts::chat::{parse_intent, Intent, CHAT_HELP_COMMANDS, INVALID_NUMBERS_MESSAGE};
use chroma_contracts::color::{format_number, popular_presets, ColorRecord, PaletteStandard};
use chroma_contracts::events::{event_payload, EventWriter};
use chroma_contracts::history::{
    load_history, ColorHistory, HistoryStore, JsonFileHistoryStore, MemoryHistoryStore,
    DEFAULT_HISTORY_CAPACITY,
};
use chroma_contracts::prompts::ValueSpace;
use chroma_engine::{default_provider_registry, ColorEngine, DEFAULT_IMAGE_MAX_DIM};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Debug, Parser)]
#[command(name = "chroma", version, about = "Pantone and RAL color lookup")]
struct Cli {
    #[command(flatten)]
    options: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    #[arg(long, global = true, default_value = "gemini")]
    provider: String,
    #[arg(long, global = true)]
    model: Option<String>,
    /// History file (defaults to $CHROMA_HISTORY or ~/.chroma/history.json).
    #[arg(long, global = true)]
    history: Option<PathBuf>,
    #[arg(long, global = true, conflicts_with = "history")]
    no_history: bool,
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    /// Print records as JSON instead of cards.
    #[arg(long, global = true)]
    json: bool,
    /// Request timeout in seconds (clamped to 5..300).
    #[arg(long, global = true)]
    timeout: Option<f64>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Look up a Pantone or RAL code.
    Code(CodeArgs),
    /// Identify the dominant color of an image file.
    Image(ImageArgs),
    /// Find the closest color to RGB or Lab values.
    Value(ValueArgs),
    /// List or clear the search history.
    History(HistoryArgs),
    /// Show the popular quick picks.
    Popular(PopularArgs),
    /// Interactive lookup session.
    Chat,
}

#[derive(Debug, Parser)]
struct CodeArgs {
    code: String,
}

#[derive(Debug, Parser)]
struct ImageArgs {
    path: PathBuf,
    #[arg(long, default_value_t = DEFAULT_IMAGE_MAX_DIM)]
    max_dim: u32,
}

#[derive(Debug, Parser)]
struct ValueArgs {
    #[arg(long, default_value = "rgb", value_parser = parse_space)]
    space: ValueSpace,
    #[arg(
        num_args = 3,
        required = true,
        allow_negative_numbers = true,
        value_parser = parse_number
    )]
    values: Vec<f64>,
}

#[derive(Debug, Parser)]
struct HistoryArgs {
    #[arg(long)]
    clear: bool,
}

#[derive(Debug, Parser)]
struct PopularArgs {
    #[arg(long, value_parser = parse_standard)]
    standard: Option<PaletteStandard>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("chroma error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    if let Command::Popular(args) = &cli.command {
        print_popular(args.standard, cli.options.json)?;
        return Ok(0);
    }

    let mut session = Session::open(&cli.options)?;
    match cli.command {
        Command::Code(args) => {
            let record = session.engine.search_by_code(&args.code)?;
            session.show(std::slice::from_ref(&record))?;
            session.remember(record)?;
        }
        Command::Image(args) => {
            let records = session
                .engine
                .identify_from_path(&args.path, args.max_dim)?;
            session.show(&records)?;
            if let Some(first) = records.into_iter().next() {
                session.remember(first)?;
            }
        }
        Command::Value(args) => {
            let values = value_triple(&args.values)?;
            let record = session.engine.search_by_values(args.space, values)?;
            session.show(std::slice::from_ref(&record))?;
            session.remember(record)?;
        }
        Command::History(args) => {
            if args.clear {
                session.clear_history()?;
                println!("History cleared.");
            } else {
                session.print_history()?;
            }
        }
        Command::Popular(_) => {}
        Command::Chat => run_chat(&mut session)?,
    }
    Ok(0)
}

struct Session {
    engine: ColorEngine,
    store: Box<dyn HistoryStore>,
    history: ColorHistory,
    json: bool,
}

impl Session {
    fn open(options: &GlobalArgs) -> Result<Self> {
        let mut engine = ColorEngine::new(default_provider_registry(), &options.provider)?;
        engine.set_model(options.model.clone());
        if let Some(seconds) = options.timeout {
            engine.set_request_timeout(seconds);
        }
        if let Some(path) = options.events.as_ref() {
            let session_id = uuid::Uuid::new_v4().to_string();
            engine = engine.with_events(EventWriter::new(path, session_id));
        }

        let store: Box<dyn HistoryStore> = if options.no_history {
            Box::new(MemoryHistoryStore::new())
        } else {
            let path = resolve_history_path(
                options.history.clone(),
                non_empty_env("CHROMA_HISTORY"),
                non_empty_env("HOME"),
            );
            Box::new(JsonFileHistoryStore::new(path))
        };
        let history = load_history(store.as_ref(), DEFAULT_HISTORY_CAPACITY)
            .context("failed loading history")?;

        let session = Self {
            engine,
            store,
            history,
            json: options.json,
        };
        session.emit(
            "session_started",
            json!({
                "provider": session.engine.provider(),
                "model": session.engine.model(),
                "history_entries": session.history.len(),
            }),
        );
        Ok(session)
    }

    fn emit(&self, event_type: &str, payload: Value) {
        if let Some(events) = self.engine.events() {
            events.emit_quiet(event_type, event_payload(payload));
        }
    }

    fn remember(&mut self, record: ColorRecord) -> Result<()> {
        let code = record.code.clone();
        if !self.history.record(record) {
            return Ok(());
        }
        self.store
            .save(self.history.entries())
            .context("failed saving history")?;
        self.emit(
            "history_updated",
            json!({ "code": code, "entries": self.history.len() }),
        );
        Ok(())
    }

    fn clear_history(&mut self) -> Result<()> {
        self.history.clear();
        self.store
            .save(self.history.entries())
            .context("failed saving history")?;
        self.emit("history_cleared", json!({}));
        Ok(())
    }

    fn show(&self, records: &[ColorRecord]) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(records)?);
            return Ok(());
        }
        for (index, record) in records.iter().enumerate() {
            if index > 0 {
                println!();
            }
            println!("{}", swatch_line(record));
            print!("{}", render_card(record));
        }
        Ok(())
    }

    fn print_history(&self) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(self.history.entries())?);
            return Ok(());
        }
        if self.history.is_empty() {
            println!("No history yet.");
            return Ok(());
        }
        for record in self.history.entries() {
            println!("{}", history_line(record));
        }
        Ok(())
    }
}

fn run_chat(session: &mut Session) -> Result<()> {
    let stdin = io::stdin();
    let mut line = String::new();

    println!("Chroma chat started. Type /help for commands.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim_end_matches(['\n', '\r']);
        let intent = parse_intent(input);
        match intent.action.as_str() {
            "noop" => continue,
            "quit" => break,
            _ => {}
        }
        if let Err(err) = handle_intent(session, &intent) {
            println!("Error: {err:#}");
        }
    }
    Ok(())
}

fn handle_intent(session: &mut Session, intent: &Intent) -> Result<()> {
    let arg = |key: &str| value_as_non_empty_string(intent.command_args.get(key));
    match intent.action.as_str() {
        "help" => {
            println!("Commands: {}", CHAT_HELP_COMMANDS.join(" "));
        }
        "code_lookup" => {
            let record = session
                .engine
                .search_by_code(&arg("code").unwrap_or_default())?;
            session.show(std::slice::from_ref(&record))?;
            session.remember(record)?;
        }
        "value_lookup" => {
            let space = arg("space")
                .and_then(|raw| ValueSpace::parse(&raw))
                .unwrap_or(ValueSpace::Rgb);
            let values = intent
                .command_args
                .get("values")
                .and_then(Value::as_array)
                .map(|rows| rows.iter().filter_map(Value::as_f64).collect::<Vec<_>>())
                .unwrap_or_default();
            let record = session
                .engine
                .search_by_values(space, value_triple(&values)?)?;
            session.show(std::slice::from_ref(&record))?;
            session.remember(record)?;
        }
        "invalid_values" => {
            println!(
                "{}",
                arg("message").unwrap_or_else(|| INVALID_NUMBERS_MESSAGE.to_string())
            );
        }
        "image_identify" => {
            let Some(path) = arg("path") else {
                println!("/image requires a path");
                return Ok(());
            };
            let path = PathBuf::from(path);
            if !path.exists() {
                println!("Image not found: {}", path.display());
                return Ok(());
            }
            let records = session
                .engine
                .identify_from_path(&path, DEFAULT_IMAGE_MAX_DIM)?;
            session.show(&records)?;
            if let Some(first) = records.into_iter().next() {
                session.remember(first)?;
            }
        }
        "history" => session.print_history()?,
        "show_history_entry" => {
            let Some(code) = arg("code") else {
                println!("/show requires a code");
                return Ok(());
            };
            match session.history.get(&code).cloned() {
                Some(record) => {
                    session.show(std::slice::from_ref(&record))?;
                    session.remember(record)?;
                }
                None => println!("No history entry for {code}"),
            }
        }
        "clear_history" => {
            session.clear_history()?;
            println!("History cleared.");
        }
        "popular" => print_popular(None, session.json)?,
        "set_provider" => match arg("provider") {
            Some(provider) => {
                session.engine.set_provider(&provider)?;
                println!("Provider set to {provider}");
            }
            None => println!("Provider: {}", session.engine.provider()),
        },
        "set_model" => {
            session.engine.set_model(arg("model"));
            println!(
                "Model: {}",
                session.engine.model().unwrap_or("(mode default)")
            );
        }
        "unknown" => {
            println!(
                "Unknown command /{}. Type /help for commands.",
                arg("command").unwrap_or_default()
            );
        }
        other => println!("Unhandled action: {other}"),
    }
    Ok(())
}

fn print_popular(standard: Option<PaletteStandard>, as_json: bool) -> Result<()> {
    let presets = popular_presets(standard);
    if as_json {
        let rows: Vec<Value> = presets
            .iter()
            .map(|preset| {
                json!({
                    "library": preset.standard.label(),
                    "code": preset.code,
                    "name": preset.name,
                    "hex": preset.hex,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    for preset in presets {
        println!(
            "{:<8} {:<8} {:<14} {}",
            preset.standard.label(),
            preset.code,
            preset.name,
            preset.hex
        );
    }
    Ok(())
}

/// Plain-text card body, one field per line.
fn render_card(record: &ColorRecord) -> String {
    let mut out = String::new();
    match record.library.as_deref() {
        Some(library) => out.push_str(&format!("{}  [{library}]\n", record.code)),
        None => out.push_str(&format!("{}\n", record.code)),
    }
    let names: Vec<&str> = [record.name_en.as_deref(), record.name_zh.as_deref()]
        .into_iter()
        .flatten()
        .collect();
    if !names.is_empty() {
        out.push_str(&format!("  {}\n", names.join(" / ")));
    }
    out.push_str(&format!("  HEX  {}\n", record.swatch_hex()));
    let (r, g, b) = record.display_rgb();
    out.push_str(&format!(
        "  RGB  {}, {}, {}\n",
        format_number(r),
        format_number(g),
        format_number(b)
    ));
    let [l, a, lab_b] = record
        .lab_display()
        .unwrap_or_else(|| ["--".to_string(), "--".to_string(), "--".to_string()]);
    out.push_str(&format!("  Lab  L {l}  a {a}  b {lab_b}\n"));
    if let Some(description) = record.description.as_deref() {
        out.push_str(&format!("  Analysis: {description}\n"));
    }
    out
}

/// Truecolor swatch with a label that stays readable on the background.
fn swatch_line(record: &ColorRecord) -> String {
    let (r, g, b) = hex_channels(&record.swatch_hex()).unwrap_or((255, 255, 255));
    let foreground = if record.is_dark() { "255;255;255" } else { "0;0;0" };
    format!(
        "\x1b[48;2;{r};{g};{b}m\x1b[38;2;{foreground}m  {:<24}\x1b[0m",
        record.code
    )
}

fn history_line(record: &ColorRecord) -> String {
    let mut line = format!("{:<12} {}", record.code, record.swatch_hex());
    if let Some(name) = record.name_en.as_deref().or(record.name_zh.as_deref()) {
        line.push_str(&format!("  {name}"));
    }
    if let Some(library) = record.library.as_deref() {
        line.push_str(&format!("  ({library})"));
    }
    line
}

fn hex_channels(hex: &str) -> Option<(u8, u8, u8)> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(digits.get(range)?, 16).ok();
    Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

fn value_triple(values: &[f64]) -> Result<[f64; 3]> {
    match values {
        [a, b, c] => Ok([*a, *b, *c]),
        _ => anyhow::bail!(INVALID_NUMBERS_MESSAGE),
    }
}

fn resolve_history_path(
    explicit: Option<PathBuf>,
    env_path: Option<String>,
    home: Option<String>,
) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    if let Some(path) = env_path {
        return PathBuf::from(path);
    }
    match home {
        Some(home) => Path::new(&home).join(".chroma").join("history.json"),
        None => PathBuf::from("chroma-history.json"),
    }
}

fn parse_number(raw: &str) -> Result<f64, String> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| INVALID_NUMBERS_MESSAGE.to_string())
}

fn parse_space(raw: &str) -> Result<ValueSpace, String> {
    ValueSpace::parse(raw).ok_or_else(|| format!("unknown color space '{raw}' (use rgb or lab)"))
}

fn parse_standard(raw: &str) -> Result<PaletteStandard, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "pantone" => Ok(PaletteStandard::Pantone),
        "ral" => Ok(PaletteStandard::Ral),
        _ => Err(format!("unknown palette '{raw}' (use pantone or ral)")),
    }
}

fn value_as_non_empty_string(value: Option<&Value>) -> Option<String> {
    let raw = value
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chroma_contracts::color::{ColorRecord, Lab, Rgb};
    use chroma_contracts::prompts::ValueSpace;
    use clap::Parser;
    use serde_json::Value;

    use super::{
        hex_channels, history_line, render_card, resolve_history_path, swatch_line, Cli, Command,
        Session,
    };

    fn sample_record() -> ColorRecord {
        ColorRecord {
            library: Some("RAL Classic".to_string()),
            code: "RAL 3000".to_string(),
            name_en: Some("Flame red".to_string()),
            name_zh: Some("火焰红".to_string()),
            hex: Some("#af2b1e".to_string()),
            rgb: Some(Rgb {
                r: Some(175.0),
                g: Some(43.0),
                b: Some(30.0),
            }),
            lab: Some(Lab {
                l: Some(39.24),
                a: Some(51.0),
                b: None,
            }),
            description: Some("Signal red used on fire equipment.".to_string()),
        }
    }

    #[test]
    fn value_command_accepts_negative_lab_values() {
        let cli = Cli::try_parse_from(["chroma", "value", "--space", "lab", "50", "-20.5", "-3"])
            .expect("parse");
        let Command::Value(args) = cli.command else {
            panic!("expected value command");
        };
        assert_eq!(args.space, ValueSpace::Lab);
        assert_eq!(args.values, vec![50.0, -20.5, -3.0]);
    }

    #[test]
    fn value_command_rejects_non_numbers_and_wrong_arity() {
        let err = Cli::try_parse_from(["chroma", "value", "12", "abc", "3"]).unwrap_err();
        assert!(err.to_string().contains("Please enter valid numbers"));
        assert!(Cli::try_parse_from(["chroma", "value", "1", "2"]).is_err());
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from([
            "chroma",
            "code",
            "7035",
            "--provider",
            "dryrun",
            "--json",
            "--timeout",
            "30",
        ])
        .expect("parse");
        assert_eq!(cli.options.provider, "dryrun");
        assert!(cli.options.json);
        assert_eq!(cli.options.timeout, Some(30.0));
        assert!(matches!(cli.command, Command::Code(ref args) if args.code == "7035"));
        assert!(Cli::try_parse_from(["chroma", "history", "--no-history", "--history", "x"]).is_err());
    }

    #[test]
    fn history_path_precedence() {
        assert_eq!(
            resolve_history_path(
                Some(PathBuf::from("/tmp/h.json")),
                Some("/env.json".to_string()),
                Some("/home/u".to_string())
            ),
            PathBuf::from("/tmp/h.json")
        );
        assert_eq!(
            resolve_history_path(None, Some("/env.json".to_string()), Some("/home/u".to_string())),
            PathBuf::from("/env.json")
        );
        assert_eq!(
            resolve_history_path(None, None, Some("/home/u".to_string())),
            PathBuf::from("/home/u/.chroma/history.json")
        );
        assert_eq!(
            resolve_history_path(None, None, None),
            PathBuf::from("chroma-history.json")
        );
    }

    #[test]
    fn card_shows_fields_and_lab_placeholders() {
        let card = render_card(&sample_record());
        assert!(card.starts_with("RAL 3000  [RAL Classic]\n"));
        assert!(card.contains("  Flame red / 火焰红\n"));
        assert!(card.contains("  HEX  #AF2B1E\n"));
        assert!(card.contains("  RGB  175, 43, 30\n"));
        assert!(card.contains("  Lab  L 39.2  a 51.0  b --\n"));
        assert!(card.contains("  Analysis: Signal red used on fire equipment.\n"));
    }

    #[test]
    fn sparse_card_falls_back_to_white() {
        let record = ColorRecord {
            code: "9010".to_string(),
            ..ColorRecord::default()
        };
        let card = render_card(&record);
        assert_eq!(
            card,
            "9010\n  HEX  #FFFFFF\n  RGB  255, 255, 255\n  Lab  L --  a --  b --\n"
        );
        assert!(swatch_line(&record).contains("\x1b[38;2;0;0;0m"));
        assert!(swatch_line(&sample_record()).contains("\x1b[48;2;175;43;30m\x1b[38;2;255;255;255m"));
    }

    #[test]
    fn history_line_prefers_english_name() {
        assert_eq!(
            history_line(&sample_record()),
            "RAL 3000     #AF2B1E  Flame red  (RAL Classic)"
        );
        assert_eq!(hex_channels("#0F4C81"), Some((15, 76, 129)));
        assert_eq!(hex_channels("#FFF"), None);
    }

    #[test]
    fn dryrun_session_records_history_and_events() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let history_path = temp.path().join("history.json");
        let events_path = temp.path().join("events.jsonl");
        let cli = Cli::try_parse_from([
            "chroma",
            "--provider",
            "dryrun",
            "--history",
            history_path.to_str().unwrap_or_default(),
            "--events",
            events_path.to_str().unwrap_or_default(),
            "chat",
        ])?;

        let mut session = Session::open(&cli.options)?;
        let record = session.engine.search_by_code("7035")?;
        session.remember(record.clone())?;
        session.remember(record.clone())?;
        assert_eq!(session.history.len(), 1);

        let saved: Value = serde_json::from_str(&std::fs::read_to_string(&history_path)?)?;
        assert_eq!(saved["chroma_history"][0]["code"], Value::from(record.code));

        session.clear_history()?;
        let types: Vec<String> = std::fs::read_to_string(&events_path)?
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|event| event["type"].as_str().map(str::to_string))
            .collect();
        assert_eq!(
            types,
            vec![
                "session_started",
                "search_started",
                "search_completed",
                "history_updated",
                "history_updated",
                "history_cleared",
            ]
        );
        Ok(())
    }
}
