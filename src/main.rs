use clap::{Parser, Subcommand};
use silkflow::body::BodyReader;
use silkflow::compress::Availability;
use silkflow::record::{RwRec, SENSOR_UNRESOLVED};
use silkflow::stream::{FlowReader, FlowWriter, WriterOptions};
use silkflow::{
    CompressionMethod, Endianness, EngineConfig, HeaderEntry, Ipv6Policy, SiteMap, StreamHeader,
};
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rwflow", about = "Read, rewrite, and inspect SiLK flow streams")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Concatenate flow streams into one output stream
    Cat {
        /// Input streams; `-` reads stdin
        #[arg(required = true, num_args = 1..)]
        input: Vec<String>,
        /// Output stream; `-` writes stdout
        #[arg(short, long, default_value = "-")]
        output: String,
        /// Codec: none, zlib, lzo1x, snappy, best, default
        #[arg(long)]
        compression_method: Option<String>,
        /// Byte order: native, little, big, swap
        #[arg(long, default_value = "native")]
        byte_order: String,
        /// Convert convertible IPv6 records to IPv4 and drop the rest
        #[arg(long)]
        ipv4_output: bool,
        /// Add an annotation entry to the output header
        #[arg(long)]
        note_add: Option<String>,
    },
    /// Show stream headers, and record counts where the body is decodable
    Info {
        #[arg(required = true, num_args = 1..)]
        input: Vec<String>,
    },
    /// Print records as a text table
    Dump {
        input: String,
        /// Stop after this many records
        #[arg(long)]
        num: Option<u64>,
        /// JSON sensor/flowtype dictionary for name resolution
        #[arg(long)]
        site_file: Option<PathBuf>,
    },
    /// Rewrite a stream in another byte order
    Swap {
        input: String,
        #[arg(short, long)]
        output: String,
        /// Byte order: big, little, swap, native
        #[arg(long, default_value = "swap")]
        byte_order: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse().command {
        // ── Cat ──────────────────────────────────────────────────────────────
        Commands::Cat {
            input,
            output,
            compression_method,
            byte_order,
            ipv4_output,
            note_add,
        } => {
            let config = EngineConfig::from_env();
            let byte_order = parse_byte_order(&byte_order)?;
            let compression = compression_method
                .as_deref()
                .map(parse_compression)
                .transpose()?;

            let mut writer: Option<FlowWriter<Box<dyn std::io::Write>>> = None;
            for path in &input {
                let mut reader = FlowReader::open(path).map_err(|e| format!("{path}: {e}"))?;
                if writer.is_none() {
                    // The first input shapes the output header; known
                    // entries are re-encoded, unknown ones ride along.
                    let mut options = WriterOptions::from_header(reader.header());
                    options.byte_order = byte_order;
                    if let Some(method) = compression {
                        options.compression = method;
                    }
                    if ipv4_output {
                        options.policy = Ipv6Policy::AsV4;
                    }
                    if let Some(note) = &note_add {
                        options.entries.push(HeaderEntry::Annotation(note.clone()));
                    }
                    options.invocation = Some(invocation_line());
                    writer = Some(
                        FlowWriter::create(&output, options, &config)
                            .map_err(|e| format!("{output}: {e}"))?,
                    );
                }
                copy_records(&mut reader, writer.as_mut().unwrap(), path, &output)?;
            }
            if let Some(w) = writer.as_mut() {
                w.close().map_err(|e| format!("{output}: {e}"))?;
            }
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            for (i, path) in input.iter().enumerate() {
                if i > 0 {
                    println!();
                }
                print_info(path).map_err(|e| format!("{path}: {e}"))?;
            }
        }

        // ── Dump ─────────────────────────────────────────────────────────────
        Commands::Dump {
            input,
            num,
            site_file,
        } => {
            let site = match &site_file {
                Some(path) => {
                    SiteMap::load(path).map_err(|e| format!("{}: {e}", path.display()))?
                }
                None => SiteMap::default(),
            };

            let mut reader = FlowReader::open(&input).map_err(|e| format!("{input}: {e}"))?;
            println!(
                "{:>15}|{:>15}|{:>5}|{:>5}|{:>3}|{:>10}|{:>10}|{:>8}|{:>23}|{:>9}|{:>8}|{:>10}|",
                "sIP",
                "dIP",
                "sPort",
                "dPort",
                "pro",
                "packets",
                "bytes",
                "flags",
                "sTime",
                "dur",
                "sensor",
                "type"
            );
            let mut shown = 0u64;
            loop {
                if num.map_or(false, |limit| shown >= limit) {
                    break;
                }
                let rec = reader
                    .read_record()
                    .map_err(|e| format!("{input}: record {}: {e}", reader.records_read() + 1))?;
                match rec {
                    Some(rec) => {
                        print_record(&rec, &site);
                        shown += 1;
                    }
                    None => break,
                }
            }
        }

        // ── Swap ─────────────────────────────────────────────────────────────
        Commands::Swap {
            input,
            output,
            byte_order,
        } => {
            let config = EngineConfig::from_env();
            let byte_order = parse_byte_order(&byte_order)?;

            let mut reader = FlowReader::open(&input).map_err(|e| format!("{input}: {e}"))?;
            let mut options = WriterOptions::from_header(reader.header());
            options.byte_order = byte_order;
            options.invocation = Some(invocation_line());
            let mut writer = FlowWriter::create(&output, options, &config)
                .map_err(|e| format!("{output}: {e}"))?;

            copy_records(&mut reader, &mut writer, &input, &output)?;
            writer.close().map_err(|e| format!("{output}: {e}"))?;
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn copy_records<R: Read, W: std::io::Write>(
    reader: &mut FlowReader<R>,
    writer: &mut FlowWriter<W>,
    in_path: &str,
    out_path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        let rec = reader
            .read_record()
            .map_err(|e| format!("{in_path}: record {}: {e}", reader.records_read() + 1))?;
        match rec {
            Some(rec) => writer
                .write_record(&rec)
                .map_err(|e| format!("{out_path}: {e}"))?,
            None => return Ok(()),
        }
    }
}

fn print_info(path: &str) -> silkflow::Result<()> {
    let mut src = open_source(path)?;
    let header = StreamHeader::read(&mut src)?;

    println!("{path}:");
    println!(
        "  format          {} ({:#04x})",
        header.format.name(),
        header.format as u8
    );
    println!("  version         {}", header.record_version);
    println!(
        "  byte order      {}",
        if header.big_endian { "big" } else { "little" }
    );
    println!("  compression     {}", header.compression.name());
    println!("  record length   {}", header.record_length);
    println!("  header length   {}", header.header_length);
    println!("  silk version    {:#06x}", header.silk_version);
    for entry in &header.entries {
        print_entry(entry);
    }

    if header.format.is_flow() && header.compression.availability() == Availability::Available {
        let mut body = BodyReader::new(src, header.compression, header.big_endian);
        let mut records = 0u64;
        while body
            .read_exact(usize::from(header.record_length))?
            .is_some()
        {
            records += 1;
        }
        println!("  records         {records}");
        println!(
            "  body bytes      {} on disk, {} decoded",
            body.bytes_read_compressed(),
            body.bytes_read_uncompressed()
        );
    }
    Ok(())
}

fn print_entry(entry: &HeaderEntry) {
    match entry {
        HeaderEntry::PackedFile {
            start_hour_epoch,
            flowtype_id,
            sensor_id,
        } => {
            let hour = chrono::DateTime::from_timestamp(i64::from(*start_hour_epoch), 0)
                .map(|t| t.format("%Y/%m/%dT%H").to_string())
                .unwrap_or_else(|| start_hour_epoch.to_string());
            println!("  packed-file     hour={hour} flowtype={flowtype_id} sensor={sensor_id}");
        }
        HeaderEntry::Invocation(s) => println!("  invocation      {s}"),
        HeaderEntry::Annotation(s) => println!("  annotation      {s}"),
        HeaderEntry::ProbeName(s) => println!("  probe-name      {s}"),
        HeaderEntry::PrefixMapName(s) => println!("  prefix-map      {s}"),
        HeaderEntry::BagDescriptor {
            key_type,
            key_length,
            counter_type,
            counter_length,
        } => println!(
            "  bag             key type={key_type} len={key_length}, \
             counter type={counter_type} len={counter_length}"
        ),
        HeaderEntry::IpsetDescriptor {
            child_count,
            leaf_count,
            node_count,
            ..
        } => println!(
            "  ipset           children={child_count} leaves={leaf_count} nodes={node_count}"
        ),
        HeaderEntry::Unknown { id, bytes } => {
            println!("  entry {:#06x}    {}", id, hex::encode(bytes));
        }
    }
}

fn print_record(rec: &RwRec, site: &SiteMap) {
    let stime = rec
        .start_time()
        .map(|t| t.format("%Y/%m/%dT%H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| rec.start_ms.to_string());
    let sensor = if rec.sensor == SENSOR_UNRESOLVED {
        "-".to_string()
    } else {
        site.resolve_sensor_name(rec.sensor)
            .map(str::to_string)
            .unwrap_or_else(|| rec.sensor.to_string())
    };
    let flowtype = site
        .resolve_flowtype(rec.flowtype)
        .map(|(class, kind)| format!("{class}/{kind}"))
        .unwrap_or_else(|| rec.flowtype.to_string());
    println!(
        "{:>15}|{:>15}|{:>5}|{:>5}|{:>3}|{:>10}|{:>10}|{:>8}|{:>23}|{:>9}|{:>8}|{:>10}|",
        rec.sip(),
        rec.dip(),
        rec.sport,
        rec.dport,
        rec.proto,
        rec.pkts,
        rec.bytes,
        flags_string(rec.flags_all),
        stime,
        format!("{:.3}", f64::from(rec.dur_ms) / 1000.0),
        sensor,
        flowtype,
    );
}

/// TCP flag letters in SiLK's FSRPAUEC order.
fn flags_string(flags: u8) -> String {
    const NAMES: [(u8, char); 8] = [
        (0x01, 'F'),
        (0x02, 'S'),
        (0x04, 'R'),
        (0x08, 'P'),
        (0x10, 'A'),
        (0x20, 'U'),
        (0x40, 'E'),
        (0x80, 'C'),
    ];
    let mut out = String::new();
    for (bit, ch) in NAMES {
        if flags & bit != 0 {
            out.push(ch);
        }
    }
    out
}

fn open_source(path: &str) -> std::io::Result<Box<dyn Read>> {
    Ok(if path == "-" {
        Box::new(std::io::stdin())
    } else {
        Box::new(std::io::BufReader::new(std::fs::File::open(path)?))
    })
}

fn invocation_line() -> String {
    std::env::args().collect::<Vec<_>>().join(" ")
}

fn parse_compression(name: &str) -> Result<CompressionMethod, String> {
    CompressionMethod::from_name(name)
        .ok_or_else(|| format!("unknown compression method '{name}'"))
}

fn parse_byte_order(name: &str) -> Result<Endianness, String> {
    Endianness::from_name(name).ok_or_else(|| format!("unknown byte order '{name}'"))
}
