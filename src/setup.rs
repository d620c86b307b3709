use std::io;
use std::net::IpAddr;
use std::ops::Deref;
use std::panic;
use std::process::Command;
use std::time::Duration;

use fern::colors::{Color, ColoredLevelConfig};
use log::{error, info, warn};
use mio::net::UdpSocket;
use mio::{Events, Poll};
use pnet::datalink;

use crate::config::{ControllerConfig, NetworkAuth};
use crate::error::{Error, Result};
use crate::packets::{ConfigPacket, StartupMessage, StripConfigPacket};
use crate::ring::SharedRing;
use crate::UDP_MAX_PACKET_SIZE;

const LOG_FILE: &str = "/var/log/ledgend.log";

/// How long one announce pass waits for the show server before giving the
/// main loop back.
const ANNOUNCE_WAIT: Duration = Duration::from_secs(5);

pub fn setup_logging(level: log::LevelFilter) -> std::result::Result<(), fern::InitError> {
    let colors = ColoredLevelConfig::new()
        .trace(Color::Cyan)
        .debug(Color::Blue)
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red);
    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{}]{}[{}] {}",
                colors.color(record.level()),
                chrono::Utc::now().format("[%Y-%m-%d][%H:%M:%S%.3f]"),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .chain(fern::log_file(LOG_FILE)?)
        .apply()?;

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line()))
            .unwrap_or(("<unknown>", 0));

        let cause = panic_info
            .payload()
            .downcast_ref::<String>()
            .map(String::deref);

        let cause = cause.unwrap_or_else(|| {
            panic_info
                .payload()
                .downcast_ref::<&str>()
                .map(|s| *s)
                .unwrap_or("<cause unknown>")
        });

        error!("A panic occurred at {}:{}: {}", filename, line, cause);
    }));
    Ok(())
}

/// Associates the host with the lighting network. The credential pair is
/// opaque text handed straight to the network manager.
pub fn join_network(auth: &NetworkAuth) -> Result<()> {
    let mut command = Command::new("nmcli");
    command.args(&["device", "wifi", "connect", &auth.name]);
    if !auth.key().is_empty() {
        command.args(&["password", auth.key()]);
    }
    let output = command
        .output()
        .map_err(|e| Error::Net(format!("failed to run nmcli: {}", e)))?;
    if output.status.success() {
        info!("joined network '{}'", auth.name);
        Ok(())
    } else {
        Err(Error::Net(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ))
    }
}

/// Picks the local IPv4 address sitting on the lighting subnet. An all-zero
/// subnet and netmask match the first non-loopback interface address.
pub fn find_matching_ip(subnet: [u8; 4], netmask: [u8; 4]) -> Result<[u8; 4]> {
    let matches = datalink::interfaces()
        .iter()
        .flat_map(|iface| iface.ips.iter())
        .filter_map(|network| match network.ip() {
            IpAddr::V4(addr) => Some(addr.octets()),
            IpAddr::V6(_) => None,
        })
        .filter(|octets| octets[0] != 127)
        .filter(|octets| ip_in_subnet(*octets, subnet, netmask))
        .collect::<Vec<_>>();
    matches.first().copied().ok_or_else(|| {
        Error::Net(format!(
            "no interface address on subnet {}.{}.{}.{}",
            subnet[0], subnet[1], subnet[2], subnet[3]
        ))
    })
}

fn ip_in_subnet(addr: [u8; 4], subnet: [u8; 4], netmask: [u8; 4]) -> bool {
    addr.iter()
        .zip(netmask.iter())
        .map(|(a, m)| a & m)
        .eq(subnet.iter().zip(netmask.iter()).map(|(s, m)| s & m))
}

/// One discovery pass: wait (bounded) for a show server's broadcast
/// `StartupMessage` on the data socket, then reply with our strip map to
/// the sender's setup port. Data frames arriving in the meantime are fed
/// into the ring rather than discarded. Returns whether a server answered.
pub fn announce(
    poll: &Poll,
    socket: &UdpSocket,
    config: &ControllerConfig,
    ring: &SharedRing,
) -> Result<bool> {
    let ip = find_matching_ip(config.subnet, config.netmask)?;
    let ip_string = format!("{}.{}.{}.{}", ip[0], ip[1], ip[2], ip[3]);

    let reply = ConfigPacket {
        name: config.name.clone(),
        ip: ip_string.clone(),
        port: config.port as i64,
        mac: "none".to_string(),
        num_strips: config.strips.len() as i64,
        num_addrs: config.num_addrs() as i64,
        strips: config
            .strips
            .iter()
            .map(|s| StripConfigPacket {
                name: s.name.clone(),
                start_addr: s.start_addr as i64,
                end_addr: s.end_addr as i64,
                channel: s.channel as i64,
            })
            .collect(),
    };
    let payload = serde_json::to_vec(&reply)?;

    info!("announcing '{}' from {}", config.name, ip_string);

    let mut buf = [0u8; UDP_MAX_PACKET_SIZE];
    let mut events = Events::with_capacity(128);
    let slice = Duration::from_millis(50);
    let mut waited = Duration::from_millis(0);

    while waited < ANNOUNCE_WAIT {
        poll.poll(&mut events, Some(slice))?;
        for _event in events.iter() {
            loop {
                match socket.recv_from(&mut buf) {
                    Ok((received, mut src)) => {
                        if received == 0 {
                            continue;
                        }
                        match serde_json::from_slice::<StartupMessage>(&buf[..received]) {
                            Ok(msg) => {
                                info!(
                                    "show server at {} ({}, reports ip {} mac {})",
                                    src, msg.msg_type, msg.ip, msg.mac
                                );
                                src.set_port(config.setup_port);
                                socket.send_to(&payload, &src)?;
                                return Ok(true);
                            }
                            // not a handshake, treat it as frame data
                            Err(_) => {
                                ring.push(&buf[..received]);
                            }
                        }
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) => {
                        warn!("recv during announce failed: {}", e);
                        break;
                    }
                }
            }
        }
        waited += slice;
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subnet_match_masks_both_sides() {
        let netmask = [255, 255, 255, 0];
        assert!(ip_in_subnet([192, 168, 1, 42], [192, 168, 1, 0], netmask));
        assert!(ip_in_subnet([192, 168, 1, 42], [192, 168, 1, 99], netmask));
        assert!(!ip_in_subnet([192, 168, 2, 42], [192, 168, 1, 0], netmask));
    }

    #[test]
    fn all_zero_mask_matches_any_address() {
        assert!(ip_in_subnet([10, 1, 2, 3], [0, 0, 0, 0], [0, 0, 0, 0]));
        assert!(ip_in_subnet([172, 16, 0, 1], [0, 0, 0, 0], [0, 0, 0, 0]));
    }

    #[test]
    fn host_bits_in_the_subnet_field_are_ignored() {
        // a sloppy config like 192.168.1.17/24 still matches the /24
        assert!(ip_in_subnet(
            [192, 168, 1, 200],
            [192, 168, 1, 17],
            [255, 255, 255, 0]
        ));
    }
}
