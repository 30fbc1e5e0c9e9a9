use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use nlprims_endpoint::Incoming;
use nlprims_frame::flags::type_name;
use nlprims_frame::FlagInfo;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    kind: &'a str,
    sender: u32,
    msg_type: u16,
    type_name: &'a str,
    flags: String,
    seq: u32,
    payload_size: usize,
    payload: String,
    timestamp: String,
}

pub fn print_frame(frame: &Incoming, format: OutputFormat) {
    let header = &frame.header;
    let type_label = type_name(header.msg_type).unwrap_or("USER");
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                kind: "frame-received",
                sender: frame.sender(),
                msg_type: header.msg_type,
                type_name: type_label,
                flags: format!("{:#06x}", header.flags),
                seq: header.seq,
                payload_size: frame.payload.len(),
                payload: payload_preview(frame.payload.as_ref()),
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SENDER", "TYPE", "SEQ", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    frame.sender().to_string(),
                    format!("{} ({type_label})", header.msg_type),
                    header.seq.to_string(),
                    frame.payload.len().to_string(),
                    payload_preview(frame.payload.as_ref()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "sender={} type={} ({}) flags={:#06x} seq={} size={} payload={}",
                frame.sender(),
                header.msg_type,
                type_label,
                header.flags,
                header.seq,
                frame.payload.len(),
                payload_preview(frame.payload.as_ref())
            );
        }
        OutputFormat::Raw => {
            print_raw(frame.payload.as_ref());
        }
    }
}

/// Outcome of one `send` invocation.
#[derive(Debug, Serialize)]
pub struct SendReport {
    pub kind: &'static str,
    pub dest: u32,
    pub variant: &'static str,
    pub local_id: u32,
    pub payload_size: usize,
    pub bytes_sent: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_id: Option<u16>,
}

pub fn print_sent(report: &SendReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["DEST", "VARIANT", "PAYLOAD", "SENT", "FAMILY"])
                .add_row(vec![
                    report.dest.to_string(),
                    report.variant.to_string(),
                    report.payload_size.to_string(),
                    report.bytes_sent.to_string(),
                    report
                        .family_id
                        .map_or_else(|| "-".to_string(), |id| id.to_string()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "sent {} bytes ({} payload) to {} via {}",
                report.bytes_sent, report.payload_size, report.dest, report.variant
            );
        }
        OutputFormat::Raw => println!("{}", report.bytes_sent),
    }
}

/// Outcome of one `resolve` invocation.
#[derive(Debug, Serialize)]
pub struct ResolveReport {
    pub kind: &'static str,
    pub family: String,
    pub family_id: u16,
    pub target: u32,
}

pub fn print_resolved(report: &ResolveReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FAMILY", "ID", "TARGET"])
                .add_row(vec![
                    report.family.clone(),
                    report.family_id.to_string(),
                    report.target.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{} = {}", report.family, report.family_id),
        OutputFormat::Raw => println!("{}", report.family_id),
    }
}

#[derive(Serialize)]
struct FlagOutput<'a> {
    name: &'a str,
    bits: String,
    supported: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

pub fn print_flags(flags: &[FlagInfo], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out: Vec<FlagOutput<'_>> = flags
                .iter()
                .map(|flag| FlagOutput {
                    name: flag.name,
                    bits: format!("{:#06x}", flag.bits),
                    supported: flag.is_supported(),
                    reason: flag.unsupported,
                })
                .collect();
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FLAG", "BITS", "SUPPORTED", "REASON"]);
            for flag in flags {
                table.add_row(vec![
                    flag.name.to_string(),
                    format!("{:#06x}", flag.bits),
                    if flag.is_supported() { "yes" } else { "no" }.to_string(),
                    flag.unsupported.unwrap_or("").to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for flag in flags {
                match flag.unsupported {
                    None => println!("{:<22} {:#06x} supported", flag.name, flag.bits),
                    Some(reason) => {
                        println!("{:<22} {:#06x} unsupported: {reason}", flag.name, flag.bits)
                    }
                }
            }
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_text_and_binary() {
        assert_eq!(payload_preview(b"hello"), "hello");
        assert_eq!(payload_preview(&[0xff, 0xfe]), "<binary 2 bytes>");
    }

    #[test]
    fn send_report_omits_absent_family() {
        let report = SendReport {
            kind: "frame-sent",
            dest: 42,
            variant: "raw",
            local_id: 7,
            payload_size: 5,
            bytes_sent: 24,
            family_id: None,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"bytes_sent\":24"));
        assert!(!json.contains("family_id"));
    }
}
