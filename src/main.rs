extern crate serde;
extern crate serde_json;
#[macro_use]
extern crate serde_derive;

mod config;
mod error;
mod packets;
mod render;
mod ring;
mod setup;

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use std::{env, thread};

use log::{debug, error, info, warn};
use mio::net::UdpSocket;
use mio::{Events, Poll, PollOpt, Ready, Token};

use crate::config::{ControllerConfig, NetworkAuth};
use crate::error::Result;
use crate::ring::SharedRing;

pub const UDP_MAX_PACKET_SIZE: usize = 65507;

const MAIN_SOCKET: Token = Token(0);
const POLL_RATE: Duration = Duration::from_millis(5);
const SERVER_TIMEOUT: Duration = Duration::from_secs(30);

fn main() {
    let level = env::var("LEDGEND_LOG")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(log::LevelFilter::Info);

    if let Err(e) = run(level) {
        error!("fatal: {}", e);
        // logging may not have come up at all
        eprintln!("ledgend: {}", e);
        process::exit(1);
    }
}

fn run(level: log::LevelFilter) -> Result<()> {
    setup::setup_logging(level)?;
    info!("Starting ledgend...");

    let config_path = env::args()
        .nth(1)
        .or_else(|| env::var("LEDGEND_CONFIG").ok())
        .unwrap_or_else(|| config::DEFAULT_CONFIG_PATH.to_string());
    let config = ControllerConfig::load(&config_path)?;
    debug!("config from {}: {:?}", config_path, config);

    match NetworkAuth::from_env() {
        Some(auth) => {
            debug!("joining with {:?}", auth);
            if let Err(e) = setup::join_network(&auth) {
                warn!("could not join network '{}': {}", auth.name, e);
            }
        }
        None => info!("no network credentials in environment, assuming the link is up"),
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl-C handler");

    let mut controller = config::build_controller(&config)?;
    render::startup_test(&mut controller);

    let addr = Ipv4Addr::new(0, 0, 0, 0);
    let bind_addr = SocketAddr::from((addr, config.port));
    let main_socket = UdpSocket::bind(&bind_addr)?;
    main_socket.set_broadcast(true)?;

    let poll = Poll::new()?;
    poll.register(&main_socket, MAIN_SOCKET, Ready::readable(), PollOpt::edge())?;
    let mut events = Events::with_capacity(128);

    info!("listening for frames on {}", bind_addr);

    let ring = SharedRing::new(config.buffer_depth, UDP_MAX_PACKET_SIZE);

    // allow_interrupts picks where rendering happens: 0 renders inline so a
    // pass finishes before the socket is drained again, 1 hands the driver
    // to a worker so intake never stalls behind a render.
    let mut render_thread = None;
    let mut inline_controller = None;
    if config.interrupts_allowed() {
        let worker_ring = ring.clone();
        let worker_running = running.clone();
        render_thread = Some(thread::spawn(move || {
            render::render_worker(worker_ring, controller, worker_running)
        }));
        info!("render worker started, intake will not block on renders");
    } else {
        inline_controller = Some(controller);
    }

    try_announce(&poll, &main_socket, &config, &ring);

    let mut buf = [0u8; UDP_MAX_PACKET_SIZE];
    let mut scratch = vec![0u8; UDP_MAX_PACKET_SIZE];
    let mut silent = Duration::from_millis(0);
    let mut frames_in: u64 = 0;

    while running.load(Ordering::SeqCst) {
        poll.poll(&mut events, Some(POLL_RATE))?;
        let mut got_data = false;
        for event in events.iter() {
            if event.token() != MAIN_SOCKET {
                continue;
            }
            // edge-triggered, so drain the socket dry
            loop {
                match main_socket.recv_from(&mut buf) {
                    Ok((received, _src)) => {
                        if received == 0 {
                            continue;
                        }
                        got_data = true;
                        frames_in += 1;
                        if !ring.push(&buf[..received]) {
                            debug!("frame ring full, dropped a frame");
                        }
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) => {
                        warn!("recv failed: {}", e);
                        break;
                    }
                }
            }
        }

        if let Some(controller) = inline_controller.as_mut() {
            while let Some(len) = ring.pop_into(&mut scratch) {
                render::apply_frame(controller, &scratch[..len]);
                controller.render().expect("Render failed...");
            }
        }

        if got_data {
            silent = Duration::from_millis(0);
        } else {
            silent = silent.checked_add(POLL_RATE).unwrap_or(SERVER_TIMEOUT);
            if silent > SERVER_TIMEOUT {
                try_announce(&poll, &main_socket, &config, &ring);
                silent = Duration::from_millis(0);
            }
        }
    }

    info!(
        "shutting down: {} frames received, {} dropped",
        frames_in,
        ring.dropped()
    );

    if let Some(controller) = inline_controller.as_mut() {
        render::blank(controller);
    }
    if let Some(handle) = render_thread {
        // the worker blanks the strips itself on exit
        if handle.join().is_err() {
            error!("render worker panicked");
        }
    }
    Ok(())
}

fn try_announce(poll: &Poll, socket: &UdpSocket, config: &ControllerConfig, ring: &SharedRing) {
    match setup::announce(poll, socket, config, ring) {
        Ok(true) => {}
        Ok(false) => warn!(
            "no show server answered, retrying after {}s of silence",
            SERVER_TIMEOUT.as_secs()
        ),
        Err(e) => warn!("announce failed: {}", e),
    }
}
