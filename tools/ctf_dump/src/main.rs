use anyhow::{Context, Result};
use clap::Parser;
use ctf_codec::{MappedFile, StreamInputReader};
use ctf_config::{init_logging, DecoderConfig};
use ctf_types::{EventRecord, StreamDeclaration};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ctf-dump")]
#[command(about = "Decode one CTF stream file and print its events")]
#[command(version)]
struct Cli {
    /// Stream declaration (JSON) describing the packet and event layout
    #[arg(long)]
    schema: PathBuf,

    /// Decoder configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start at the first event with a timestamp at or after this value
    #[arg(long)]
    seek: Option<u64>,

    /// Stop after this many records
    #[arg(long)]
    limit: Option<usize>,

    /// Print the field paths of every declared event instead of decoding
    #[arg(long)]
    paths: bool,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,

    /// Stream file to decode
    #[arg(required_unless_present = "paths")]
    stream_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = DecoderConfig::load(cli.config.as_deref())?;
    init_logging(cli.log_level.as_deref().unwrap_or(&config.log_level))?;

    let stream = load_schema(&cli.schema)?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if cli.paths {
        write_paths(&mut out, &stream)?;
        return out.flush().context("Failed to write output");
    }

    let Some(path) = cli.stream_file.as_deref() else {
        anyhow::bail!("A stream file is required unless --paths is given");
    };
    let source =
        MappedFile::open(path).with_context(|| format!("Failed to open stream file {path:?}"))?;
    let mut reader = StreamInputReader::with_options(source, stream, config.reader_options());

    if let Some(timestamp) = cli.seek {
        if !reader.seek(timestamp)? {
            info!("No event at or after timestamp {}", timestamp);
        }
    }

    let limit = cli.limit.unwrap_or(usize::MAX);
    for record in reader.by_ref().take(limit) {
        let record = record.context("Failed to decode stream")?;
        writeln!(out, "{}", format_record(&record)).context("Failed to write output")?;
    }
    out.flush().context("Failed to write output")?;

    info!(
        "Printed {} events, {} lost, from {} packets",
        reader.events_read(),
        reader.lost_events_total(),
        reader.packets_read()
    );
    Ok(())
}

fn load_schema(path: &Path) -> Result<StreamDeclaration> {
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read schema {path:?}"))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse schema {path:?}"))
}

/// One line per record: `[timestamp] name (id) { fields }`
fn format_record(record: &EventRecord) -> String {
    match record {
        EventRecord::Event(event) => format!(
            "[{}] {} ({}) {}",
            event.timestamp, event.name, event.id, event.fields
        ),
        EventRecord::Lost(lost) => format!(
            "[{}] LOST count={} duration={}",
            lost.timestamp, lost.count, lost.duration
        ),
    }
}

fn write_paths(out: &mut impl Write, stream: &StreamDeclaration) -> Result<()> {
    for event in stream.events.values() {
        writeln!(out, "{} ({})", event.name, event.id)?;
        if let Some(context) = &event.context {
            for path in context.field_paths() {
                writeln!(out, "  context.{path}")?;
            }
        }
        for path in event.fields.field_paths() {
            writeln!(out, "  {path}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use ctf_types::{
        Definition, EventDeclaration, EventDefinition, IntegerDeclaration, IntegerValue, LostEvent,
        StructDeclaration, StructDefinition, Value,
    };

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_stream_file_required_without_paths() {
        assert!(Cli::try_parse_from(["ctf-dump", "--schema", "s.json"]).is_err());
        let cli = Cli::try_parse_from(["ctf-dump", "--schema", "s.json", "--paths"]).unwrap();
        assert!(cli.paths && cli.stream_file.is_none());
    }

    #[test]
    fn test_format_records() {
        let mut fields = StructDefinition::new();
        fields.push(
            "cpu".into(),
            Definition::new(0, Value::Integer(IntegerValue::unsigned(3, 8, Default::default()))),
        );
        let event = EventRecord::Event(EventDefinition {
            id: 4,
            name: "irq".into(),
            timestamp: 1_000,
            stream_id: 0,
            packet_index: 0,
            header: None,
            stream_context: None,
            context: None,
            fields: Definition::new(0, Value::Struct(fields)),
        });
        assert_eq!(format_record(&event), "[1000] irq (4) { cpu = 3 }");

        let lost = EventRecord::Lost(LostEvent {
            count: 5,
            duration: 20,
            timestamp: 900,
            stream_id: 0,
            packet_index: 1,
        });
        assert_eq!(format_record(&lost), "[900] LOST count=5 duration=20");
    }

    #[test]
    fn test_write_paths() {
        let header = StructDeclaration::new(8).with_field("proto", IntegerDeclaration::UINT_8);
        let stream = StreamDeclaration::new(0).with_event(EventDeclaration::new(
            2,
            "net",
            StructDeclaration::new(8)
                .with_field("len", IntegerDeclaration::UINT_8)
                .with_field("hdr", header),
        ));
        let mut out = Vec::new();
        write_paths(&mut out, &stream).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "net (2)\n  len\n  hdr\n  hdr.proto\n"
        );
    }
}
