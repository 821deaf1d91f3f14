use clap::Parser;
use colored::*;
use hyperspace_frame::*;

struct Writer {
    indent: usize,
}

impl Writer {
    fn new(indent: usize) -> Self {
        Self { indent }
    }

    fn increase_indent(&mut self) {
        self.indent += 2;
    }

    fn decrease_indent(&mut self) {
        self.indent -= 2;
    }

    fn writeln(&self, s: String) {
        println!("{}{}", " ".repeat(self.indent), s);
    }
}

/// `cat` for hyperspace mesh frames.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The frame to parse, as a hex string (FCS included).
    #[clap(value_parser(clap::builder::NonEmptyStringValueParser::new()))]
    input: String,

    /// Treat the input as a raw IPv6 packet instead of a MAC frame.
    #[clap(long)]
    ipv6: bool,
}

fn main() {
    let args = Args::parse();
    let data = hex::decode(args.input).expect("input is not valid hex");

    let mut w = Writer::new(0);
    if args.ipv6 {
        print_ipv6(&mut w, &data);
    } else {
        print_frame(&mut w, &data);
    }
}

fn print_frame(w: &mut Writer, data: &[u8]) {
    let (data, fcs_note) = match check_fcs(data) {
        Some(stripped) => (stripped, "ok".green()),
        None => (data, "BAD".red()),
    };

    let frame = Frame::new(data).expect("input is not a valid frame");
    let fc = frame.frame_control();

    w.writeln("Frame Control".underline().bold().to_string());
    w.increase_indent();
    w.writeln(format!("{}: {:?}", "frame type".bold(), fc.frame_type()));
    w.writeln(format!("{}: {}", "ack request".bold(), fc.ack_request() as usize));
    w.writeln(format!(
        "{}: {}",
        "sequence number suppression".bold(),
        fc.sequence_number_suppression() as usize
    ));
    w.writeln(format!(
        "{}: {}",
        "information elements present".bold(),
        fc.information_elements_present() as usize
    ));
    w.writeln(format!("{}: {:?}", "frame version".bold(), fc.frame_version()));
    w.writeln(format!("{}: {}", "fcs".bold(), fcs_note));
    w.decrease_indent();

    if let Some(seq) = frame.sequence_number() {
        w.writeln(format!("{}: {}", "Sequence Number".underline().bold(), seq));
    }

    if frame.addressing().is_some() {
        w.writeln("Addressing".underline().bold().to_string());
        w.increase_indent();
        if let Some(dst) = frame.dst_address() {
            w.writeln(format!("{}: {}", "dst".bold(), dst));
        }
        if let Some(src) = frame.src_address() {
            w.writeln(format!("{}: {}", "src".bold(), src));
        }
        w.decrease_indent();
    }

    if let Some(ies) = frame.information_elements() {
        w.writeln("Information Elements".underline().bold().to_string());
        w.increase_indent();

        for ie in ies.header_information_elements() {
            match HeaderIeRepr::parse(&ie) {
                Some(HeaderIeRepr::Ssid(ssid)) => w.writeln(format!(
                    "{}: {:?}",
                    "SSID".bold(),
                    core::str::from_utf8(&ssid).unwrap_or("<binary>")
                )),
                Some(HeaderIeRepr::TschSync { asn, join_metric }) => w.writeln(format!(
                    "{}: ASN {}, join metric {}",
                    "TSCH Sync".bold(),
                    asn,
                    join_metric
                )),
                Some(HeaderIeRepr::SlotframeDescriptor { handle, length, cells }) => {
                    w.writeln(format!(
                        "{}: handle {}, {} slots",
                        "Slotframe".bold(),
                        handle,
                        length
                    ));
                    w.increase_indent();
                    for (slot, channel, kind) in cells {
                        w.writeln(format!("slot {slot}, channel offset {channel}, kind {kind}"));
                    }
                    w.decrease_indent();
                }
                Some(HeaderIeRepr::TimeCorrection(ticks)) => w.writeln(format!(
                    "{}: {} ticks",
                    "Time Correction".bold(),
                    ticks
                )),
                None => match ie.element_id() {
                    HeaderElementId::HeaderTermination1 | HeaderElementId::HeaderTermination2 => {
                        w.writeln(format!("{:?}", ie.element_id()))
                    }
                    id => w.writeln(format!("{:?}({:0x?})", id, ie.content())),
                },
            }
        }

        for ie in ies.payload_information_elements() {
            match PayloadIeRepr::parse(&ie) {
                Some(PayloadIeRepr::LocBeacon(body)) => print_loc_beacon(w, &body),
                None => w.writeln(format!("{:?}({:0x?})", ie.group_id(), ie.content())),
            }
        }
        w.decrease_indent();
    }

    if let Some(payload) = frame.payload() {
        w.writeln(format!("{}: {}", "Payload".underline().bold(), hex::encode(payload)));
    }
}

fn print_loc_beacon(w: &mut Writer, body: &LocBeaconRepr) {
    w.writeln("LocBeacon".underline().bold().to_string());
    w.increase_indent();
    w.writeln(format!("{}: {}", "class".bold(), body.class));
    w.writeln(format!(
        "{}: direction {}, slot {}, sub-offset {}",
        "schedule".bold(),
        body.direction,
        body.loc_slot,
        body.sub_offset
    ));
    let (x, y, z) = body.position;
    w.writeln(format!("{}: ({x:.3}, {y:.3}, {z:.3}) m", "position".bold()));
    let (r, theta) = body.routing_coord;
    w.writeln(format!("{}: (r {r:.3}, theta {theta:.3})", "routing coord".bold()));
    w.writeln(format!("{}: {:#022b}", "neighborhood".bold(), body.neighborhood));
    for (i, record) in body.records.iter().enumerate() {
        let marker = match record.tstamp {
            TSTAMP_MISSED if record.is_conflict_marker() => " (missed)".red().to_string(),
            _ if record.is_empty() => " (no expectation)".dimmed().to_string(),
            _ => String::new(),
        };
        w.writeln(format!(
            "record {}: {} {} ticks{}",
            i,
            hex::encode(record.addr),
            record.tstamp,
            marker
        ));
    }
    w.decrease_indent();
}

fn print_ipv6(w: &mut Writer, data: &[u8]) {
    let header = Ipv6Header::new(data).expect("input is not an IPv6 packet");

    w.writeln("IPv6".underline().bold().to_string());
    w.increase_indent();
    w.writeln(format!("{}: {}", "payload length".bold(), header.payload_length()));
    w.writeln(format!("{}: {}", "next header".bold(), header.next_header()));
    w.writeln(format!("{}: {}", "hop limit".bold(), header.hop_limit()));
    w.writeln(format!("{}: {}", "src".bold(), hex::encode(header.src())));
    w.writeln(format!("{}: {}", "dst".bold(), hex::encode(header.dst())));
    w.decrease_indent();

    if header.next_header() == NEXT_HEADER_HOP_BY_HOP {
        let hbh = HopByHopHeader::new(&data[Ipv6Header::<&[u8]>::LEN..])
            .expect("truncated hop-by-hop header");
        w.writeln("Hop-by-Hop".underline().bold().to_string());
        w.increase_indent();
        w.writeln(format!("{}: {}", "next header".bold(), hbh.next_header()));
        for (name, option_type) in [("coord", OPTION_COORD), ("redirect", OPTION_REDIRECT)] {
            let Some(content) = hbh.option(option_type) else {
                continue;
            };
            let Ok(option) = CoordOption::new(content) else {
                continue;
            };
            w.writeln(format!("{} option:", name.bold()));
            w.increase_indent();
            w.writeln(format!("packet id: {:#06x}", option.packet_id()));
            let (r, theta) = option.src_coord();
            w.writeln(format!("src: seq {}, (r {r:.3}, theta {theta:.3})", option.src_seq()));
            let (r, theta) = option.dst_coord();
            if option.is_flood() {
                w.writeln(format!("dst: seq {}, flood", option.dst_seq()));
            } else {
                w.writeln(format!("dst: seq {}, (r {r:.3}, theta {theta:.3})", option.dst_seq()));
            }
            w.decrease_indent();
        }
        w.decrease_indent();
    }
}
