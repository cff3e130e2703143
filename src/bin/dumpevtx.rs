use anyhow::{Context, Result, bail};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use dialoguer::Confirm;
use indoc::indoc;
use log::LevelFilter;
use serde_json::Value;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use wevtx::{EvtxParser, MessageResolver, NullResolver, expand_message};

fn cli() -> Command {
    Command::new("dumpevtx")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Parses Windows EVTX files into ordered JSON events")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .action(ArgAction::Count)
                .global(true)
                .help("Log verbosity (-v info, -vv debug, -vvv trace)"),
        )
        .subcommand(
            Command::new("chunks").about("Show the chunks in the file.").arg(
                Arg::new("INPUT")
                    .required(true)
                    .help("EVTX file to inspect"),
            ),
        )
        .subcommand(
            Command::new("parse")
                .about("Parse the events in the file.")
                .arg(Arg::new("INPUT").required(true).help("EVTX file to parse"))
                .arg(
                    Arg::new("start")
                        .long("start")
                        .value_parser(value_parser!(u64))
                        .default_value("0")
                        .help("First record id to dump"),
                )
                .arg(
                    Arg::new("number")
                        .long("number")
                        .value_parser(value_parser!(u64))
                        .default_value("99999999")
                        .help("How many records to print"),
                )
                .arg(
                    Arg::new("event-id")
                        .long("event-id")
                        .value_parser(value_parser!(i64))
                        .help("Only show events with this event id"),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .help("File to write JSON into (stdout otherwise)"),
                )
                .arg(
                    Arg::new("disable-messages")
                        .long("disable-messages")
                        .action(ArgAction::SetTrue)
                        .help("Do not attach a Message field to events"),
                )
                .after_help(indoc! {r#"
                    Events are emitted as pretty-printed JSON, one document
                    per event, in on-disk order. Message templates resolve
                    through the configured resolver; without one, Message is
                    attached empty.
                "#}),
        )
        .subcommand(
            Command::new("watch")
                .about("Watch a file for new events.")
                .arg(Arg::new("INPUT").required(true).help("EVTX file to watch")),
        )
}

fn init_logging(matches: &ArgMatches) {
    let level = match matches.get_count("verbose") {
        0 => return,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    if let Err(err) = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ) {
        eprintln!("Failed to initialize logging: {err:?}");
    }
}

/// `EventID` is either a bare number or `{Qualifiers, Value}`.
fn event_id_of(event: &Value) -> Option<i64> {
    let event_id = &event["System"]["EventID"];
    event_id.as_i64().or_else(|| event_id["Value"].as_i64())
}

fn output_writer(path: Option<&String>) -> Result<Box<dyn Write>> {
    let Some(path) = path else {
        return Ok(Box::new(io::stdout()));
    };

    let path = Path::new(path);
    if path.exists() {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Are you sure you want to override output file {}?",
                path.display()
            ))
            .interact()
            .context("Failed to display confirmation prompt")?;
        if !confirmed {
            bail!("Cannot write output file, it already exists");
        }
    }

    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(Box::new(BufWriter::new(file)))
}

fn do_chunks(matches: &ArgMatches) -> Result<()> {
    let input = PathBuf::from(matches.get_one::<String>("INPUT").expect("required"));
    let mut parser = EvtxParser::from_path(&input)?;

    for chunk in parser.chunks()? {
        println!("{:#?}", chunk.header);
    }
    Ok(())
}

fn do_parse(matches: &ArgMatches) -> Result<()> {
    let input = PathBuf::from(matches.get_one::<String>("INPUT").expect("required"));
    let start: u64 = *matches.get_one("start").expect("has default");
    let number: u64 = *matches.get_one("number").expect("has default");
    let event_id_filter = matches.get_one::<i64>("event-id").copied();
    let resolver: Option<Box<dyn MessageResolver>> = if matches.get_flag("disable-messages") {
        None
    } else {
        Some(Box::new(NullResolver))
    };

    let mut output = output_writer(matches.get_one::<String>("output"))?;
    let mut parser = EvtxParser::from_path(&input)?;

    let mut count = 0_u64;
    for record in parser.records_from(start) {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                log::warn!("skipping broken chunk: {err}");
                continue;
            }
        };

        let Some(event) = record.event.get("Event").filter(|e| e.is_object()) else {
            continue;
        };

        if let Some(filter) = event_id_filter {
            if event_id_of(event) != Some(filter) {
                continue;
            }
        }

        let mut event = event.clone();
        if let Some(resolver) = &resolver {
            let message = expand_message(&event, resolver.as_ref());
            event["Message"] = Value::from(message);
        }

        count += 1;
        if count > number {
            break;
        }

        serde_json::to_writer_pretty(&mut output, &event)
            .context("Failed to serialize event")?;
        writeln!(output)?;
    }

    if let Some(resolver) = resolver {
        resolver.close();
    }
    Ok(())
}

fn do_watch(matches: &ArgMatches) -> Result<()> {
    let input = PathBuf::from(matches.get_one::<String>("INPUT").expect("required"));
    let mut max_record_id = 0_u64;

    loop {
        println!("Will watch events newer than {max_record_id}");
        let mut new_max_record_id = max_record_id;

        let mut parser = EvtxParser::from_path(&input)?;
        let start = if max_record_id == 0 {
            0
        } else {
            max_record_id + 1
        };

        for chunk in parser.chunks()? {
            if chunk.header.last_event_record_id <= max_record_id {
                continue;
            }

            let records = match parser.parse_chunk(&chunk, start) {
                Ok(records) => records,
                Err(err) => {
                    log::warn!("skipping chunk at {:#x}: {err}", chunk.offset);
                    continue;
                }
            };

            for record in records {
                println!("{}", serde_json::to_string_pretty(&record.event)?);
                if record.event_record_id > new_max_record_id {
                    new_max_record_id = record.event_record_id;
                }
            }
        }

        max_record_id = new_max_record_id;
        thread::sleep(Duration::from_secs(10));
    }
}

fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_logging(&matches);

    match matches.subcommand() {
        Some(("chunks", matches)) => do_chunks(matches),
        Some(("parse", matches)) => do_parse(matches),
        Some(("watch", matches)) => do_watch(matches),
        _ => unreachable!("a subcommand is required"),
    }
}
