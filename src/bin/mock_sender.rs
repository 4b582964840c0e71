//! Mock UDP sender for integration testing
//!
//! Reads the same config file format as a real sender and transmits each
//! `[Connection]` on its own thread every `sending_period` milliseconds,
//! starting one period after launch. A datagram is `payload_length` bytes
//! when that is set (the payload cut or zero-padded to fit, or a
//! `0, 1, 2, ...` byte pattern), otherwise the payload text. Runs until
//! killed.
//!
//! Setting `MOCK_SENDER_SEND_AT_START` makes the first send happen at
//! launch instead.

use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::thread;
use std::time::{Duration, Instant};

use udp_harness::sut::{parse_connections, ParsedConnection};

struct Sender {
    payload: Vec<u8>,
    destination: SocketAddrV4,
    period: Duration,
    send_at_start: bool,
}

fn main() {
    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: mock_sender <config.ini>");
        std::process::exit(2);
    };

    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Failed to read {}: {}", path, e);
            std::process::exit(1);
        }
    };

    let parsed = parse_connections(&text);
    for warning in &parsed.warnings {
        eprintln!("{}", warning);
    }

    let senders: Vec<Sender> = parsed
        .connections
        .iter()
        .filter_map(|conn| match sender_from(conn) {
            Ok(sender) => Some(sender),
            Err(reason) => {
                eprintln!("Skipping connection: {}", reason);
                None
            }
        })
        .collect();

    if senders.is_empty() {
        eprintln!("Error on loading configuration!");
        std::process::exit(1);
    }

    let handles: Vec<_> = senders
        .into_iter()
        .map(|sender| thread::spawn(move || run(sender)))
        .collect();
    for handle in handles {
        if handle.join().is_err() {
            eprintln!("Sender thread panicked");
        }
    }
}

fn sender_from(conn: &ParsedConnection) -> Result<Sender, String> {
    let payload_length: usize = parse_field(&conn.payload_length, "payload_length")?.unwrap_or(0);
    let payload = match (conn.payload.as_deref().filter(|p| !p.is_empty()), payload_length) {
        (Some(text), 0) => text.as_bytes().to_vec(),
        (Some(text), len) => {
            let mut bytes = text.as_bytes().to_vec();
            bytes.resize(len, 0);
            bytes
        }
        (None, len) if len > 0 => (0..len).map(|i| (i & 0xff) as u8).collect(),
        (None, _) => return Err("Invalid payload or payload_length Config!".to_string()),
    };

    let period_ms: u64 = parse_field(&conn.sending_period, "sending_period")?.unwrap_or(0);
    if period_ms == 0 {
        return Err("Invalid Rate Config!".to_string());
    }

    let ip: Ipv4Addr = parse_field(&conn.destination_ip, "destination_ip")?
        .ok_or("destination_ip missing")?;
    let port: u16 = parse_field(&conn.destination_port, "destination_port")?
        .ok_or("destination_port missing")?;

    Ok(Sender {
        payload,
        destination: SocketAddrV4::new(ip, port),
        period: Duration::from_millis(period_ms),
        send_at_start: std::env::var_os("MOCK_SENDER_SEND_AT_START").is_some(),
    })
}

fn parse_field<T: std::str::FromStr>(
    value: &Option<String>,
    name: &str,
) -> Result<Option<T>, String> {
    value
        .as_deref()
        .map(|v| v.parse::<T>().map_err(|_| format!("invalid {}: '{}'", name, v)))
        .transpose()
}

fn run(sender: Sender) {
    let socket = match UdpSocket::bind("0.0.0.0:0") {
        Ok(socket) => socket,
        Err(e) => {
            eprintln!("Failed to create a socket: {}", e);
            return;
        }
    };
    if sender.destination.ip().is_multicast() {
        if let Err(e) = socket.set_multicast_loop_v4(true) {
            eprintln!("Failed to enable multicast loopback: {}", e);
        }
        if let Err(e) = socket.set_multicast_ttl_v4(1) {
            eprintln!("Failed to set multicast TTL: {}", e);
        }
    }

    // Fixed-rate schedule: deadlines advance by exactly one period so
    // scheduling delays don't accumulate
    let mut next = Instant::now();
    if !sender.send_at_start {
        next += sender.period;
    }
    loop {
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        }
        next += sender.period;

        if let Err(e) = socket.send_to(&sender.payload, sender.destination) {
            eprintln!("send to {} failed: {}", sender.destination, e);
        }
    }
}
