use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use mediax::sap::{ALL_SESSIONS, DEFAULT_SAP_ADDRESS, DEFAULT_SAP_PORT};
use mediax::{
    ColourspaceType, RawDepayloader, RawPayloader, RtpFrameData, RtpSapReceive, RtpSapTransmit,
    SapAnnouncer, SapConfig, SapListener, SdpMessage, StreamInformation, TestPattern,
};

#[derive(Parser)]
#[command(
    name = "mediax",
    about = "Raw video over RTP with SAP/SDP discovery"
)]
struct Args {
    /// SAP group (or unicast peer) for announcements
    #[arg(long, global = true, default_value_t = DEFAULT_SAP_ADDRESS)]
    sap_address: Ipv4Addr,

    #[arg(long, global = true, default_value_t = DEFAULT_SAP_PORT)]
    sap_port: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List non-loopback IPv4 interfaces usable as the SAP source
    Interfaces,
    /// Print SAP announcements seen on the network
    Listen {
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },
    /// Announce a stream and send a test pattern
    Transmit {
        #[arg(long, default_value = "mediax")]
        session_name: String,
        /// Destination address, unicast or multicast
        #[arg(long, default_value = "239.192.1.1")]
        address: String,
        #[arg(long, default_value_t = 5004)]
        port: u16,
        #[arg(long, default_value_t = 480)]
        height: u32,
        #[arg(long, default_value_t = 640)]
        width: u32,
        #[arg(long, default_value_t = 25)]
        framerate: u32,
        #[arg(long, default_value = "YUV422")]
        encoding: ColourspaceType,
        /// ebu, bars, grey, checkered, noise, ball, a colour name or #rrggbb
        #[arg(long, default_value = "ebu")]
        pattern: TestPattern,
        /// Frames to send; 0 sends until interrupted
        #[arg(long, default_value_t = 0)]
        frames: u64,
        /// Index into `mediax interfaces` for the SAP source address
        #[arg(long)]
        interface: Option<usize>,
    },
    /// Wait for an announced stream and receive frames from it
    Receive {
        #[arg(long, default_value = "mediax")]
        session_name: String,
        #[arg(long, default_value_t = 100)]
        frames: u64,
        #[arg(long, default_value_t = 1000)]
        timeout_ms: u64,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let sap = SapConfig {
        address: args.sap_address,
        port: args.sap_port,
        ..SapConfig::default()
    };

    let result = match args.command {
        Command::Interfaces => interfaces(),
        Command::Listen { seconds } => listen(sap, Duration::from_secs(seconds)),
        Command::Transmit {
            session_name,
            address,
            port,
            height,
            width,
            framerate,
            encoding,
            pattern,
            frames,
            interface,
        } => {
            let info = StreamInformation {
                session_name,
                hostname: address,
                port,
                height,
                width,
                framerate,
                encoding,
                deleted: false,
            };
            transmit(sap, info, pattern, frames, interface)
        }
        Command::Receive {
            session_name,
            frames,
            timeout_ms,
        } => receive(sap, &session_name, frames, Duration::from_millis(timeout_ms)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn interfaces() -> mediax::Result<()> {
    for (index, interface) in SapAnnouncer::list_interfaces()?.iter().enumerate() {
        println!("{index}: {} {}", interface.name, interface.address);
    }
    Ok(())
}

fn print_announcement(msg: &SdpMessage) {
    let state = if msg.deleted { "deleted" } else { "active" };
    println!(
        "{} [{state}] {}:{} {}x{} {} @{} fps from {}",
        msg.session_name,
        msg.ip_address,
        msg.port,
        msg.width,
        msg.height,
        msg.encoding(),
        msg.framerate,
        msg.source_address
    );
}

fn listen(sap: SapConfig, duration: Duration) -> mediax::Result<()> {
    let listener = SapListener::new(sap)?;
    // Live sessions by (name, origin); deletions remove their entry.
    let sessions: Arc<Mutex<BTreeMap<(String, Ipv4Addr), SdpMessage>>> = Arc::default();
    let table = sessions.clone();
    listener.register_sap_listener(
        ALL_SESSIONS,
        Arc::new(move |msg: &SdpMessage| {
            print_announcement(msg);
            let key = (msg.session_name.clone(), msg.source_address);
            let mut table = table.lock();
            if msg.deleted {
                table.remove(&key);
            } else {
                table.insert(key, msg.clone());
            }
        }),
    );
    listener.start();
    thread::sleep(duration);
    listener.stop();

    let sessions = sessions.lock();
    println!("{} active session(s)", sessions.len());
    for msg in sessions.values() {
        println!("  {} {}:{}", msg.session_name, msg.ip_address, msg.port);
    }
    Ok(())
}

fn transmit(
    sap: SapConfig,
    info: StreamInformation,
    pattern: TestPattern,
    frames: u64,
    interface: Option<usize>,
) -> mediax::Result<()> {
    let announcer = Arc::new(SapAnnouncer::new(sap)?);
    if let Some(index) = interface {
        if !announcer.set_source_interface(index) {
            tracing::warn!(
                index,
                source = %announcer.source_address(),
                "interface not found, keeping current source"
            );
        }
    }

    let mut session = RtpSapTransmit::new(announcer, Box::new(RawPayloader::new()), info)?;
    let started = Instant::now();
    let mut sent = 0u64;
    while frames == 0 || sent < frames {
        if sent == 0 || pattern.is_animated() {
            session.test_pattern(pattern)?;
        }
        session.transmit_buffer(true)?;
        sent += 1;
    }

    let elapsed = started.elapsed().as_secs_f64();
    println!("sent {sent} frames in {elapsed:.1}s ({:.1} fps)", sent as f64 / elapsed);
    Ok(())
}

fn receive(sap: SapConfig, session_name: &str, frames: u64, timeout: Duration) -> mediax::Result<()> {
    let listener = Arc::new(SapListener::new(sap)?);
    let session = RtpSapReceive::new(listener, Box::new(RawDepayloader::new()), session_name);

    let mut frame = RtpFrameData::default();
    let mut received = 0u64;
    let mut incomplete = 0u64;
    while received < frames {
        if !session.receive(&mut frame, timeout) {
            if session.is_configured() {
                println!("timeout");
            } else {
                println!("waiting for {session_name}");
            }
            continue;
        }
        received += 1;
        if !frame.complete {
            incomplete += 1;
        }
        println!(
            "frame {received}: ts={} {}x{} {} bytes{}",
            frame.timestamp,
            frame.resolution.width,
            frame.resolution.height,
            frame.data.len(),
            if frame.complete { "" } else { " (incomplete)" }
        );
    }

    println!("received {received} frames, {incomplete} incomplete");
    Ok(())
}
